// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output binding: harvest produced files and upload them.
//!
//! Binding is best-effort. A file that fails to upload is logged and
//! skipped; the manifest records whichever artifacts made it. Binder
//! failures never demote the execution outcome.

use crate::config::AgentConfig;
use fx_adapters::{ContainerDaemon, ObjectStore};
use fx_core::{JobRequest, OutputEntry};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct OutputBinder {
    store: Arc<dyn ObjectStore>,
    daemon: Arc<dyn ContainerDaemon>,
    config: Arc<AgentConfig>,
}

impl OutputBinder {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        daemon: Arc<dyn ContainerDaemon>,
        config: Arc<AgentConfig>,
    ) -> Self {
        Self { store, daemon, config }
    }

    /// Copy the job's `output/` directory out of the container and upload
    /// each file under `<s3_prefix>/<request_id>/<relative_path>`.
    pub async fn bind(
        &self,
        request: &JobRequest,
        container_id: &str,
        scratch: &Path,
    ) -> Vec<OutputEntry> {
        if !self.config.output.enabled {
            return Vec::new();
        }

        let workspace = self.config.workspace_path(request.request_id.as_str());
        let output_dir = format!("{}/{}", workspace, self.config.docker.output_mount_path);
        let harvest_dir = match self.config.output.base_dir {
            Some(ref base) => base.join(request.request_id.as_str()),
            None => scratch.join("harvest"),
        };

        if let Err(e) = tokio::fs::create_dir_all(&harvest_dir).await {
            tracing::warn!(request_id = %request.request_id, error = %e, "harvest dir create failed");
            return Vec::new();
        }
        if let Err(e) = self.daemon.copy_out(container_id, &output_dir, &harvest_dir).await {
            // Missing output dir is the common empty case, not an error.
            tracing::debug!(request_id = %request.request_id, error = %e, "no outputs harvested");
            return Vec::new();
        }

        let mut files = Vec::new();
        collect_files(&harvest_dir, &harvest_dir, &mut files);
        files.sort();

        let mut manifest = Vec::new();
        for rel in files {
            let host_path = harvest_dir.join(&rel);
            let size = match tokio::fs::metadata(&host_path).await {
                Ok(meta) => meta.len(),
                Err(e) => {
                    tracing::warn!(path = %host_path.display(), error = %e, "skipping unreadable output");
                    continue;
                }
            };
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            let key = format!(
                "{}/{}/{}",
                self.config.output.s3_prefix.trim_end_matches('/'),
                request.request_id,
                rel_str
            );
            match self.store.put(&self.config.s3.user_data_bucket, &key, &host_path).await {
                Ok(()) => manifest.push(OutputEntry { path: rel_str, size, locator: key }),
                Err(e) => {
                    tracing::warn!(
                        request_id = %request.request_id,
                        key,
                        error = %e,
                        "output upload failed, continuing"
                    );
                }
            }
        }
        tracing::debug!(
            request_id = %request.request_id,
            uploaded = manifest.len(),
            "outputs bound"
        );
        manifest
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_path_buf());
        }
    }
}

#[cfg(test)]
#[path = "bind_tests.rs"]
mod tests;
