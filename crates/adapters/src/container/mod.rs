// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container daemon adapter.
//!
//! [`ContainerDaemon`] is the thin contract over the container runtime:
//! create, start, exec-in, copy-in/out, stats, kill, remove. Containers are
//! launched with auto-remove off, the default network, and a sleep-forever
//! entrypoint so they stay alive between executions; code runs via `exec`.
//!
//! The memory cap is applied per job (`set_memory`), not at create, so idle
//! pooled containers reserve no RAM.

mod docker;
mod tail;

pub use docker::DockerCli;
pub use tail::TailBuffer;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{DaemonCall, FakeDaemon};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors from container daemon operations.
///
/// `DaemonUnavailable` is fatal for the agent: the dispatcher stops intake
/// and exits. Everything else is scoped to one container or operation.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container daemon unavailable: {0}")]
    DaemonUnavailable(String),
    #[error("image missing: {0}")]
    ImageMissing(String),
    #[error("resources exhausted: {0}")]
    ResourceExhausted(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Failed(String),
}

impl ContainerError {
    /// Whether this error means the daemon itself is gone (agent-fatal).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DaemonUnavailable(_))
    }
}

/// Signal delivered to the job's process tree inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

impl Signal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Term => "TERM",
            Self::Kill => "KILL",
        }
    }
}

/// One in-container command execution.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub argv: Vec<String>,
    pub workdir: Option<String>,
    pub env: Vec<(String, String)>,
    /// Safety-net cap on the exec call itself. The job deadline is enforced
    /// by the executor via `kill`; this bound only prevents a leak when the
    /// kill path itself fails.
    pub hard_timeout: Duration,
}

impl ExecSpec {
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            workdir: None,
            env: Vec::new(),
            hard_timeout: Duration::from_secs(120),
        }
    }

    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn hard_timeout(mut self, timeout: Duration) -> Self {
        self.hard_timeout = timeout;
        self
    }
}

/// Result of an in-container execution. Streams are tail-capped with an
/// elision marker when the process wrote more than the per-stream cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// `None` when the process could not be reaped (kill path raced).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Point-in-time resource usage of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContainerStats {
    pub rss_bytes: u64,
}

/// Thin contract over the container daemon.
#[async_trait]
pub trait ContainerDaemon: Send + Sync {
    /// Daemon liveness probe (startup preflight, fatal-error detection).
    async fn ping(&self) -> Result<(), ContainerError>;

    /// Create a stopped container from `image` named `name`.
    /// Returns the daemon's container id.
    async fn create(&self, image: &str, name: &str) -> Result<String, ContainerError>;

    async fn start(&self, container_id: &str) -> Result<(), ContainerError>;

    /// Apply the job's memory cap to a running container.
    async fn set_memory(&self, container_id: &str, memory_mb: u64) -> Result<(), ContainerError>;

    async fn exec(&self, container_id: &str, spec: ExecSpec) -> Result<ExecResult, ContainerError>;

    /// Copy the contents of host directory `src` into container directory
    /// `dst` (created if absent).
    async fn copy_in(
        &self,
        container_id: &str,
        src: &Path,
        dst: &str,
    ) -> Result<(), ContainerError>;

    /// Copy the contents of container directory `src` into host directory
    /// `dst` (which must exist).
    async fn copy_out(
        &self,
        container_id: &str,
        src: &str,
        dst: &Path,
    ) -> Result<(), ContainerError>;

    async fn stats(&self, container_id: &str) -> Result<ContainerStats, ContainerError>;

    /// Signal the job's process tree inside the container. The container
    /// itself (and its sleep-forever entrypoint) stays up.
    async fn kill(&self, container_id: &str, signal: Signal) -> Result<(), ContainerError>;

    async fn remove(&self, container_id: &str) -> Result<(), ContainerError>;
}
