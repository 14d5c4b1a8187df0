// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker CLI implementation of [`ContainerDaemon`].
//!
//! Container lifecycle goes through the `docker` binary with every
//! invocation bounded by a per-operation timeout. Pooled containers run
//! `sleep infinity` as PID 1; job code runs via `docker exec`, and signals
//! are delivered to the exec'd process tree (`kill -- -1` inside the
//! container) so the container itself survives.

use super::{ContainerDaemon, ContainerError, ContainerStats, ExecResult, ExecSpec, Signal};
use super::tail::TailBuffer;
use crate::subprocess::{run_with_timeout, SubprocessError};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Docker CLI driver.
#[derive(Clone)]
pub struct DockerCli {
    binary: String,
    /// Bound on each non-exec CLI call (create, cp, stats, rm, ...).
    op_timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self { binary: "docker".to_string(), op_timeout: Duration::from_secs(30) }
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Run a docker CLI command and return trimmed stdout on success.
    async fn run(&self, args: &[&str], label: &'static str) -> Result<String, ContainerError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        let output = run_with_timeout(cmd, self.op_timeout, label).await.map_err(|e| match e {
            SubprocessError::TimedOut { .. } => ContainerError::Timeout(label.to_string()),
            SubprocessError::Spawn { source, .. } => {
                ContainerError::DaemonUnavailable(format!("cannot exec docker: {}", source))
            }
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(classify_cli_error(stderr.trim()))
        }
    }
}

/// Map docker CLI stderr to the adapter error taxonomy.
fn classify_cli_error(stderr: &str) -> ContainerError {
    let lower = stderr.to_lowercase();
    if lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
    {
        ContainerError::DaemonUnavailable(stderr.to_string())
    } else if lower.contains("no such image")
        || lower.contains("unable to find image")
        || lower.contains("pull access denied")
    {
        ContainerError::ImageMissing(stderr.to_string())
    } else if lower.contains("no such container") || lower.contains("is not running") {
        ContainerError::NotFound(stderr.to_string())
    } else if lower.contains("no space left")
        || lower.contains("cannot allocate memory")
        || lower.contains("too many")
    {
        ContainerError::ResourceExhausted(stderr.to_string())
    } else {
        ContainerError::Failed(stderr.to_string())
    }
}

/// Parse the memory half of `docker stats --format {{.MemUsage}}`
/// (e.g. `"13.42MiB / 128MiB"`) into bytes.
fn parse_mem_usage(raw: &str) -> Option<u64> {
    let used = raw.split('/').next()?.trim();
    let split = used.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    let (num, unit) = used.split_at(split);
    let value: f64 = num.parse().ok()?;
    let scale: f64 = match unit.trim() {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "kB" => 1000.0,
        "MB" => 1_000_000.0,
        "GB" => 1_000_000_000.0,
        _ => return None,
    };
    Some((value * scale) as u64)
}

#[async_trait]
impl ContainerDaemon for DockerCli {
    async fn ping(&self) -> Result<(), ContainerError> {
        self.run(&["version", "--format", "{{.Server.Version}}"], "docker version").await?;
        Ok(())
    }

    async fn create(&self, image: &str, name: &str) -> Result<String, ContainerError> {
        // auto-remove stays off: the pool owns removal. The sleep-forever
        // entrypoint keeps the container alive between execs.
        let id = self
            .run(
                &["create", "--name", name, "--network", "default", image, "sleep", "infinity"],
                "docker create",
            )
            .await?;
        tracing::debug!(container = %id, %image, "created container");
        Ok(id)
    }

    async fn start(&self, container_id: &str) -> Result<(), ContainerError> {
        self.run(&["start", container_id], "docker start").await?;
        Ok(())
    }

    async fn set_memory(&self, container_id: &str, memory_mb: u64) -> Result<(), ContainerError> {
        let limit = format!("{}m", memory_mb);
        self.run(
            &["update", "--memory", &limit, "--memory-swap", &limit, container_id],
            "docker update",
        )
        .await?;
        Ok(())
    }

    async fn exec(&self, container_id: &str, spec: ExecSpec) -> Result<ExecResult, ContainerError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("exec");
        if let Some(ref dir) = spec.workdir {
            cmd.args(["-w", dir]);
        }
        for (key, val) in &spec.env {
            cmd.args(["-e", &format!("{}={}", key, val)]);
        }
        cmd.arg(container_id);
        cmd.args(&spec.argv);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            ContainerError::DaemonUnavailable(format!("cannot exec docker: {}", e))
        })?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let read_tail = |pipe: Option<tokio::process::ChildStdout>| async move {
            let mut buf = TailBuffer::stream();
            if let Some(mut pipe) = pipe {
                let mut chunk = [0u8; 8192];
                while let Ok(n) = pipe.read(&mut chunk).await {
                    if n == 0 {
                        break;
                    }
                    buf.push(&chunk[..n]);
                }
            }
            buf
        };
        // Same loop, different pipe type.
        let read_tail_err = |pipe: Option<tokio::process::ChildStderr>| async move {
            let mut buf = TailBuffer::stream();
            if let Some(mut pipe) = pipe {
                let mut chunk = [0u8; 8192];
                while let Ok(n) = pipe.read(&mut chunk).await {
                    if n == 0 {
                        break;
                    }
                    buf.push(&chunk[..n]);
                }
            }
            buf
        };

        let wait = async {
            let (stdout, stderr) = tokio::join!(read_tail(stdout_pipe), read_tail_err(stderr_pipe));
            let status = child.wait().await;
            (stdout, stderr, status)
        };

        let (stdout, stderr, status) = match tokio::time::timeout(spec.hard_timeout, wait).await {
            Ok(parts) => parts,
            Err(_) => {
                // Kill path failed upstream; reap the client so it can't leak.
                return Err(ContainerError::Timeout(format!(
                    "exec exceeded hard timeout {:?}",
                    spec.hard_timeout
                )));
            }
        };

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!(container = container_id, error = %e, "exec wait failed");
                None
            }
        };

        Ok(ExecResult {
            exit_code,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            duration: start.elapsed(),
        })
    }

    async fn copy_in(
        &self,
        container_id: &str,
        src: &Path,
        dst: &str,
    ) -> Result<(), ContainerError> {
        // Trailing `/.` gives docker-cp contents-of-directory semantics,
        // matching the trait contract.
        let src = format!("{}/.", src.display());
        let target = format!("{}:{}", container_id, dst);
        self.run(&["cp", &src, &target], "docker cp in").await?;
        Ok(())
    }

    async fn copy_out(
        &self,
        container_id: &str,
        src: &str,
        dst: &Path,
    ) -> Result<(), ContainerError> {
        let source = format!("{}:{}/.", container_id, src);
        let dst = dst.display().to_string();
        self.run(&["cp", &source, &dst], "docker cp out").await?;
        Ok(())
    }

    async fn stats(&self, container_id: &str) -> Result<ContainerStats, ContainerError> {
        let raw = self
            .run(
                &["stats", "--no-stream", "--format", "{{.MemUsage}}", container_id],
                "docker stats",
            )
            .await?;
        let rss_bytes = parse_mem_usage(&raw)
            .ok_or_else(|| ContainerError::Failed(format!("unparseable stats: {:?}", raw)))?;
        Ok(ContainerStats { rss_bytes })
    }

    async fn kill(&self, container_id: &str, signal: Signal) -> Result<(), ContainerError> {
        // Signal every process in the container's PID namespace except the
        // sleep-forever entrypoint, which the kernel shields as init.
        let cmd = format!("kill -s {} -- -1", signal.as_str());
        self.run(&["exec", container_id, "sh", "-c", &cmd], "docker kill-tree").await?;
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> Result<(), ContainerError> {
        self.run(&["rm", "-f", container_id], "docker rm").await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "docker_tests.rs"]
mod tests;
