// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace staging: bundle download, sanitized extraction, runtime
//! detection, and injection into a rented container.
//!
//! Preparation (download + extract + detect) is host-side and runs before
//! any container is acquired, so a slow object store never burns pool
//! capacity. Injection copies the prepared tree into the container and
//! creates the job's `output/` directory.

mod archive;

use crate::config::AgentConfig;
use fx_adapters::{ContainerDaemon, ContainerError, ExecSpec, ObjectStore, StoreError};
use fx_core::{JobRequest, RuntimeKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const WORKSPACE_OP_TIMEOUT: Duration = Duration::from_secs(10);

/// Disambiguates host scratch dirs when the queue delivers the same
/// request twice concurrently. In-container workspaces stay keyed by
/// request id alone (one delivery per container).
static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Terminal staging failures. Every variant maps to a published
/// `stage_error` envelope; none of them are retried.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("code bundle missing: {0}")]
    CodeMissing(String),
    #[error("code bundle oversized: {0}")]
    CodeOversized(String),
    #[error("bundle transport failed: {0}")]
    Transport(String),
    #[error("archive entry escapes workspace: {0}")]
    Traversal(String),
    #[error("archive expansion exceeds cap: {0}")]
    ZipBomb(String),
    #[error("unreadable archive: {0}")]
    BadArchive(String),
    #[error("runtime mismatch: request says {declared}, bundle looks like {detected}")]
    RuntimeMismatch { declared: RuntimeKind, detected: String },
    #[error("workspace setup failed: {0}")]
    Workspace(String),
    #[error("staging io: {0}")]
    Io(String),
    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl StageError {
    /// True when the underlying failure means the container daemon is gone
    /// (infrastructure problem, not a property of this job).
    pub fn is_daemon_fatal(&self) -> bool {
        matches!(self, Self::Container(e) if e.is_fatal())
    }
}

/// Host-side scratch directory for one request; removed on drop.
#[derive(Debug)]
pub struct Scratch {
    path: PathBuf,
}

impl Scratch {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "scratch cleanup failed");
            }
        }
    }
}

/// A downloaded, extracted, runtime-checked bundle awaiting injection.
#[derive(Debug)]
pub struct PreparedBundle {
    pub bundle_dir: PathBuf,
    pub runtime: RuntimeKind,
    /// Owns the scratch directory for the lifetime of the job.
    pub scratch: Scratch,
}

/// What the executor needs to run the staged job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedJob {
    pub argv: Vec<String>,
    /// In-container working directory (`/workspace-root/<request_id>`).
    pub workspace: String,
}

pub struct Stager {
    store: Arc<dyn ObjectStore>,
    daemon: Arc<dyn ContainerDaemon>,
    config: Arc<AgentConfig>,
}

impl Stager {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        daemon: Arc<dyn ContainerDaemon>,
        config: Arc<AgentConfig>,
    ) -> Self {
        Self { store, daemon, config }
    }

    /// Download, extract, and validate the request's bundle on the host.
    pub async fn prepare(&self, request: &JobRequest) -> Result<PreparedBundle, StageError> {
        let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
        let scratch_root =
            self.config.task_base_dir.join(format!("{}.{}", request.request_id, seq));
        tokio::fs::create_dir_all(&scratch_root)
            .await
            .map_err(|e| StageError::Io(format!("create {}: {}", scratch_root.display(), e)))?;
        let scratch = Scratch::new(scratch_root);

        let bundle = request.bundle();
        let archive_path = scratch.path().join("bundle.zip");
        self.store
            .get(&bundle.bucket, &bundle.key, &archive_path, self.config.stage.max_archive_bytes)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { bucket, key } => {
                    StageError::CodeMissing(format!("s3://{}/{}", bucket, key))
                }
                StoreError::TooLarge { size, cap, .. } => {
                    StageError::CodeOversized(format!("{} bytes (cap {})", size, cap))
                }
                StoreError::Transport(message) => StageError::Transport(message),
            })?;

        let bundle_dir = scratch.path().join("bundle");
        tokio::fs::create_dir_all(&bundle_dir)
            .await
            .map_err(|e| StageError::Io(format!("create {}: {}", bundle_dir.display(), e)))?;

        let max_unpacked = self.config.stage.max_unpacked_bytes;
        let extract_archive = archive_path.clone();
        let extract_dest = bundle_dir.clone();
        tokio::task::spawn_blocking(move || {
            archive::extract_sanitized(&extract_archive, &extract_dest, max_unpacked)
        })
        .await
        .map_err(|e| StageError::Io(format!("extract task: {}", e)))??;

        let detected = RuntimeKind::detect(&bundle_dir).ok_or(StageError::RuntimeMismatch {
            declared: request.runtime,
            detected: "no known entrypoint".to_string(),
        })?;
        if detected != request.runtime {
            return Err(StageError::RuntimeMismatch {
                declared: request.runtime,
                detected: detected.to_string(),
            });
        }

        tracing::debug!(
            request_id = %request.request_id,
            runtime = %detected,
            "bundle prepared"
        );
        Ok(PreparedBundle { bundle_dir, runtime: detected, scratch })
    }

    /// Copy a prepared bundle into the container and create `output/`.
    /// Returns the argv and workspace the executor should use.
    pub async fn inject(
        &self,
        request: &JobRequest,
        prepared: &PreparedBundle,
        container_id: &str,
    ) -> Result<StagedJob, StageError> {
        let workspace = self.config.workspace_path(request.request_id.as_str());
        let output_dir = format!("{}/{}", workspace, self.config.docker.output_mount_path);

        self.exec_ok(container_id, ["mkdir", "-p", workspace.as_str()]).await?;
        self.daemon.copy_in(container_id, &prepared.bundle_dir, &workspace).await?;
        self.exec_ok(container_id, ["mkdir", "-p", output_dir.as_str()]).await?;

        let argv: Vec<String> =
            prepared.runtime.descriptor().launch_command.iter().map(|s| s.to_string()).collect();
        Ok(StagedJob { argv, workspace })
    }

    async fn exec_ok(
        &self,
        container_id: &str,
        argv: [&str; 3],
    ) -> Result<(), StageError> {
        let spec = ExecSpec::new(argv).hard_timeout(WORKSPACE_OP_TIMEOUT);
        let result = self.daemon.exec(container_id, spec).await?;
        if result.exit_code != Some(0) {
            return Err(StageError::Workspace(format!(
                "{:?} exited {:?}: {}",
                argv, result.exit_code, result.stderr
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
