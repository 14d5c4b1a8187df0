// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime descriptor table.
//!
//! Single source of truth for per-runtime dispatch: image, entrypoint
//! detection file, launch argv, default wall-clock budget. Adding a runtime
//! is strictly a table entry plus an image.

use serde::{Deserialize, Serialize};

/// Supported language runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Python,
    Cpp,
    Nodejs,
    Go,
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Python => "python",
            Self::Cpp => "cpp",
            Self::Nodejs => "nodejs",
            Self::Go => "go",
        })
    }
}

impl RuntimeKind {
    pub const ALL: [RuntimeKind; 4] =
        [RuntimeKind::Python, RuntimeKind::Cpp, RuntimeKind::Nodejs, RuntimeKind::Go];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "python" => Some(Self::Python),
            "cpp" => Some(Self::Cpp),
            "nodejs" => Some(Self::Nodejs),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Static descriptor for this runtime.
    pub fn descriptor(self) -> &'static RuntimeDescriptor {
        match self {
            Self::Python => &PYTHON,
            Self::Cpp => &CPP,
            Self::Nodejs => &NODEJS,
            Self::Go => &GO,
        }
    }

    /// Detect the runtime of an extracted bundle by entrypoint presence.
    ///
    /// Checks every descriptor's `entrypoint_file` against the bundle root
    /// and returns the first match in `ALL` order.
    pub fn detect(bundle_root: &std::path::Path) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| bundle_root.join(r.descriptor().entrypoint_file).is_file())
    }
}

/// Static per-runtime execution knobs.
#[derive(Debug, Clone)]
pub struct RuntimeDescriptor {
    pub kind: RuntimeKind,
    /// Image tag used when the config does not override it.
    pub default_image: &'static str,
    /// File whose presence identifies the runtime (`main.py`, `index.js`, ...).
    pub entrypoint_file: &'static str,
    /// Argv executed inside the container, relative to the workspace.
    pub launch_command: &'static [&'static str],
    /// Wall-clock budget applied when the request carries none.
    pub default_wall_clock_ms: u64,
    /// Build-step runtimes compile inside the job budget via `run.sh`.
    pub requires_build: bool,
}

static PYTHON: RuntimeDescriptor = RuntimeDescriptor {
    kind: RuntimeKind::Python,
    default_image: "fx-runtime-python:latest",
    entrypoint_file: "main.py",
    launch_command: &["python3", "main.py"],
    default_wall_clock_ms: 30_000,
    requires_build: false,
};

static CPP: RuntimeDescriptor = RuntimeDescriptor {
    kind: RuntimeKind::Cpp,
    default_image: "fx-runtime-cpp:latest",
    entrypoint_file: "main.cpp",
    launch_command: &["bash", "run.sh"],
    default_wall_clock_ms: 60_000,
    requires_build: true,
};

static NODEJS: RuntimeDescriptor = RuntimeDescriptor {
    kind: RuntimeKind::Nodejs,
    default_image: "fx-runtime-nodejs:latest",
    entrypoint_file: "index.js",
    launch_command: &["node", "index.js"],
    default_wall_clock_ms: 30_000,
    requires_build: false,
};

static GO: RuntimeDescriptor = RuntimeDescriptor {
    kind: RuntimeKind::Go,
    default_image: "fx-runtime-go:latest",
    entrypoint_file: "main.go",
    launch_command: &["bash", "run.sh"],
    default_wall_clock_ms: 60_000,
    requires_build: true,
};

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
