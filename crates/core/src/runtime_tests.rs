// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    python = { "python", RuntimeKind::Python },
    cpp    = { "cpp", RuntimeKind::Cpp },
    nodejs = { "nodejs", RuntimeKind::Nodejs },
    go     = { "go", RuntimeKind::Go },
)]
fn parse_known_runtimes(name: &str, expected: RuntimeKind) {
    assert_eq!(RuntimeKind::parse(name), Some(expected));
    assert_eq!(expected.to_string(), name);
}

#[yare::parameterized(
    empty   = { "" },
    rust    = { "rust" },
    casing  = { "Python" },
)]
fn parse_rejects_unknown(name: &str) {
    assert_eq!(RuntimeKind::parse(name), None);
}

#[test]
fn serde_uses_lowercase_names() {
    let json = serde_json::to_string(&RuntimeKind::Nodejs).unwrap();
    assert_eq!(json, "\"nodejs\"");
    let parsed: RuntimeKind = serde_json::from_str("\"cpp\"").unwrap();
    assert_eq!(parsed, RuntimeKind::Cpp);
}

#[yare::parameterized(
    python = { RuntimeKind::Python, "main.py", false },
    cpp    = { RuntimeKind::Cpp, "main.cpp", true },
    nodejs = { RuntimeKind::Nodejs, "index.js", false },
    go     = { RuntimeKind::Go, "main.go", true },
)]
fn descriptor_table_entries(kind: RuntimeKind, entrypoint: &str, requires_build: bool) {
    let desc = kind.descriptor();
    assert_eq!(desc.kind, kind);
    assert_eq!(desc.entrypoint_file, entrypoint);
    assert_eq!(desc.requires_build, requires_build);
    assert!(!desc.launch_command.is_empty());
    assert!(desc.default_wall_clock_ms > 0);
}

#[test]
fn build_runtimes_launch_via_run_script() {
    for kind in [RuntimeKind::Cpp, RuntimeKind::Go] {
        assert_eq!(kind.descriptor().launch_command, ["bash", "run.sh"]);
    }
}

#[test]
fn detect_finds_runtime_by_entrypoint() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.py"), "print('hi')").unwrap();
    assert_eq!(RuntimeKind::detect(dir.path()), Some(RuntimeKind::Python));
}

#[test]
fn detect_returns_none_for_empty_bundle() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(RuntimeKind::detect(dir.path()), None);
}
