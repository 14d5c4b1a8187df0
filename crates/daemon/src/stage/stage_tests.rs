// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fx_adapters::{DaemonCall, FakeDaemon, FakeStore};
use std::io::Write;

fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::SimpleFileOptions::default();
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

struct Fixture {
    stager: Stager,
    store: FakeStore,
    daemon: FakeDaemon,
    _tmp: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let config = Arc::new(AgentConfig::for_tests(tmp.path().to_path_buf()));
    let store = FakeStore::new();
    let daemon = FakeDaemon::new();
    let stager = Stager::new(Arc::new(store.clone()), Arc::new(daemon.clone()), config);
    Fixture { stager, store, daemon, _tmp: tmp }
}

fn python_request(key: &str) -> JobRequest {
    JobRequest::builder().request_id("r1").s3_key(key).build()
}

#[tokio::test]
async fn prepare_downloads_extracts_and_detects() {
    let fx = fixture();
    fx.store.seed("code-bucket", "k.zip", &zip_bytes(&[("main.py", b"print('hello')")]));

    let prepared = fx.stager.prepare(&python_request("k.zip")).await.unwrap();
    assert_eq!(prepared.runtime, RuntimeKind::Python);
    assert!(prepared.bundle_dir.join("main.py").is_file());
}

#[tokio::test]
async fn prepare_missing_bundle_is_code_missing() {
    let fx = fixture();
    let err = fx.stager.prepare(&python_request("absent.zip")).await.unwrap_err();
    assert!(matches!(err, StageError::CodeMissing(_)));
}

#[tokio::test]
async fn prepare_oversized_bundle_is_code_oversized() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = AgentConfig::for_tests(tmp.path().to_path_buf());
    config.stage.max_archive_bytes = 16;
    let store = FakeStore::new();
    let daemon = FakeDaemon::new();
    let stager = Stager::new(Arc::new(store.clone()), Arc::new(daemon), Arc::new(config));
    store.seed("code-bucket", "big.zip", &zip_bytes(&[("main.py", b"print('hello world')")]));

    let err = stager.prepare(&python_request("big.zip")).await.unwrap_err();
    assert!(matches!(err, StageError::CodeOversized(_)));
}

#[tokio::test]
async fn prepare_runtime_mismatch_is_rejected() {
    let fx = fixture();
    fx.store.seed("code-bucket", "k.zip", &zip_bytes(&[("index.js", b"console.log(1)")]));

    let err = fx.stager.prepare(&python_request("k.zip")).await.unwrap_err();
    assert!(matches!(
        err,
        StageError::RuntimeMismatch { declared: RuntimeKind::Python, .. }
    ));
}

#[tokio::test]
async fn prepare_bundle_without_entrypoint_is_rejected() {
    let fx = fixture();
    fx.store.seed("code-bucket", "k.zip", &zip_bytes(&[("README.md", b"no code here")]));

    let err = fx.stager.prepare(&python_request("k.zip")).await.unwrap_err();
    assert!(matches!(err, StageError::RuntimeMismatch { .. }));
}

#[tokio::test]
async fn scratch_is_removed_when_prepared_bundle_drops() {
    let fx = fixture();
    fx.store.seed("code-bucket", "k.zip", &zip_bytes(&[("main.py", b"print(1)")]));

    let prepared = fx.stager.prepare(&python_request("k.zip")).await.unwrap();
    let scratch_path = prepared.scratch.path().to_path_buf();
    assert!(scratch_path.is_dir());
    drop(prepared);
    assert!(!scratch_path.exists());
}

#[tokio::test]
async fn inject_copies_bundle_and_creates_output_dir() {
    let fx = fixture();
    fx.store.seed("code-bucket", "k.zip", &zip_bytes(&[("main.py", b"print(1)")]));
    let request = python_request("k.zip");
    let prepared = fx.stager.prepare(&request).await.unwrap();

    let container = fx.daemon.create("img", "c").await.unwrap();
    fx.daemon.start(&container).await.unwrap();
    let staged = fx.stager.inject(&request, &prepared, &container).await.unwrap();

    assert_eq!(staged.workspace, "/workspace-root/r1");
    assert_eq!(staged.argv, vec!["python3".to_string(), "main.py".to_string()]);
    assert!(fx
        .daemon
        .files_of(&container)
        .contains(&"/workspace-root/r1/main.py".to_string()));

    // mkdir workspace, copy_in, mkdir output
    let calls = fx.daemon.calls();
    let mkdirs: Vec<&DaemonCall> = calls
        .iter()
        .filter(|c| matches!(c, DaemonCall::Exec { argv, .. } if argv[0] == "mkdir"))
        .collect();
    assert_eq!(mkdirs.len(), 2);
    assert!(matches!(
        mkdirs[1],
        DaemonCall::Exec { argv, .. } if argv[2] == "/workspace-root/r1/output"
    ));
}

#[tokio::test]
async fn inject_requires_known_container() {
    let fx = fixture();
    fx.store.seed("code-bucket", "k.zip", &zip_bytes(&[("main.py", b"print(1)")]));
    let request = python_request("k.zip");
    let prepared = fx.stager.prepare(&request).await.unwrap();

    let err = fx.stager.inject(&request, &prepared, "ctr-missing").await.unwrap_err();
    assert!(matches!(err, StageError::Container(_)));
    assert!(!err.is_daemon_fatal());
}

#[tokio::test]
async fn concurrent_deliveries_of_one_request_get_distinct_scratch() {
    let fx = fixture();
    fx.store.seed("code-bucket", "k.zip", &zip_bytes(&[("main.py", b"print(1)")]));
    let request = python_request("k.zip");

    let a = fx.stager.prepare(&request).await.unwrap();
    let b = fx.stager.prepare(&request).await.unwrap();
    assert_ne!(a.scratch.path(), b.scratch.path());
    assert!(a.bundle_dir.join("main.py").is_file());
    assert!(b.bundle_dir.join("main.py").is_file());
}
