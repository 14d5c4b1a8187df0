// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory container daemon for tests.
//!
//! Records every call, scripts exec results, and models container files so
//! copy-in/copy-out round-trip without a real daemon. An in-flight delayed
//! exec completes early when `kill` is issued, mirroring how a real exec
//! client returns once its process dies.

use super::tail::TailBuffer;
use super::{ContainerDaemon, ContainerError, ContainerStats, ExecResult, ExecSpec, Signal};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// One recorded daemon invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCall {
    Ping,
    Create { image: String, name: String },
    Start { id: String },
    SetMemory { id: String, memory_mb: u64 },
    Exec { id: String, argv: Vec<String> },
    CopyIn { id: String, dst: String },
    CopyOut { id: String, src: String },
    Stats { id: String },
    Kill { id: String, signal: Signal },
    Remove { id: String },
}

/// A scripted exec response.
struct ScriptedExec {
    /// When set, only an exec whose `argv[0]` matches consumes this entry;
    /// housekeeping execs (mkdir, rm, probes) pass through unscripted.
    first_arg: Option<String>,
    result: ExecResult,
    /// How long the "process" runs before exiting on its own.
    delay: Duration,
}

#[derive(Default)]
struct Inner {
    calls: Vec<DaemonCall>,
    next_id: u64,
    /// container id -> running?
    containers: HashMap<String, bool>,
    /// container id -> in-container path -> bytes
    files: HashMap<String, HashMap<String, Vec<u8>>>,
    exec_queue: VecDeque<ScriptedExec>,
    stats_rss: u64,
    ping_ok: bool,
    fail_create: bool,
    last_kill_signal: Option<Signal>,
}

/// Deterministic [`ContainerDaemon`] double.
#[derive(Clone)]
pub struct FakeDaemon {
    inner: Arc<Mutex<Inner>>,
    killed: Arc<Notify>,
}

impl Default for FakeDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDaemon {
    pub fn new() -> Self {
        let inner = Inner { ping_ok: true, ..Inner::default() };
        Self { inner: Arc::new(Mutex::new(inner)), killed: Arc::new(Notify::new()) }
    }

    /// Script the next exec to return `result` immediately.
    pub fn queue_exec(&self, result: ExecResult) {
        self.queue_exec_delayed(result, Duration::ZERO);
    }

    /// Script the next exec to return `result` after `delay` (or earlier if
    /// the process is killed).
    pub fn queue_exec_delayed(&self, result: ExecResult, delay: Duration) {
        self.inner.lock().exec_queue.push_back(ScriptedExec { first_arg: None, result, delay });
    }

    /// Script the next exec whose `argv[0]` equals `first_arg`; other execs
    /// pass through unscripted.
    pub fn queue_exec_matching(&self, first_arg: &str, result: ExecResult) {
        self.queue_exec_matching_delayed(first_arg, result, Duration::ZERO);
    }

    /// Matching variant of [`Self::queue_exec_delayed`].
    pub fn queue_exec_matching_delayed(&self, first_arg: &str, result: ExecResult, delay: Duration) {
        self.inner.lock().exec_queue.push_back(ScriptedExec {
            first_arg: Some(first_arg.to_string()),
            result,
            delay,
        });
    }

    pub fn set_stats_rss(&self, bytes: u64) {
        self.inner.lock().stats_rss = bytes;
    }

    pub fn set_ping_ok(&self, ok: bool) {
        self.inner.lock().ping_ok = ok;
    }

    pub fn fail_next_create(&self) {
        self.inner.lock().fail_create = true;
    }

    /// Place a file inside a container (e.g. a produced output artifact).
    pub fn seed_file(&self, container_id: &str, path: &str, bytes: &[u8]) {
        self.inner
            .lock()
            .files
            .entry(container_id.to_string())
            .or_default()
            .insert(path.to_string(), bytes.to_vec());
    }

    pub fn calls(&self) -> Vec<DaemonCall> {
        self.inner.lock().calls.clone()
    }

    pub fn container_count(&self) -> usize {
        self.inner.lock().containers.len()
    }

    pub fn is_running(&self, container_id: &str) -> bool {
        self.inner.lock().containers.get(container_id).copied().unwrap_or(false)
    }

    /// Files currently inside a container, sorted by path.
    pub fn files_of(&self, container_id: &str) -> Vec<String> {
        let inner = self.inner.lock();
        let mut paths: Vec<String> =
            inner.files.get(container_id).map(|m| m.keys().cloned().collect()).unwrap_or_default();
        paths.sort();
        paths
    }

    fn record(&self, call: DaemonCall) {
        self.inner.lock().calls.push(call);
    }

    fn known(&self, container_id: &str) -> Result<(), ContainerError> {
        if self.inner.lock().containers.contains_key(container_id) {
            Ok(())
        } else {
            Err(ContainerError::NotFound(container_id.to_string()))
        }
    }
}

#[async_trait]
impl ContainerDaemon for FakeDaemon {
    async fn ping(&self) -> Result<(), ContainerError> {
        self.record(DaemonCall::Ping);
        if self.inner.lock().ping_ok {
            Ok(())
        } else {
            Err(ContainerError::DaemonUnavailable("fake daemon down".into()))
        }
    }

    async fn create(&self, image: &str, name: &str) -> Result<String, ContainerError> {
        self.record(DaemonCall::Create { image: image.to_string(), name: name.to_string() });
        let mut inner = self.inner.lock();
        if inner.fail_create {
            inner.fail_create = false;
            return Err(ContainerError::ImageMissing(image.to_string()));
        }
        inner.next_id += 1;
        let id = format!("ctr-{:04}", inner.next_id);
        inner.containers.insert(id.clone(), false);
        Ok(id)
    }

    async fn start(&self, container_id: &str) -> Result<(), ContainerError> {
        self.record(DaemonCall::Start { id: container_id.to_string() });
        self.known(container_id)?;
        self.inner.lock().containers.insert(container_id.to_string(), true);
        Ok(())
    }

    async fn set_memory(&self, container_id: &str, memory_mb: u64) -> Result<(), ContainerError> {
        self.record(DaemonCall::SetMemory { id: container_id.to_string(), memory_mb });
        self.known(container_id)
    }

    async fn exec(&self, container_id: &str, spec: ExecSpec) -> Result<ExecResult, ContainerError> {
        self.record(DaemonCall::Exec { id: container_id.to_string(), argv: spec.argv.clone() });
        self.known(container_id)?;

        // Model workspace scrubbing so reuse invariants are observable.
        if spec.argv.first().map(String::as_str) == Some("rm") {
            if let Some(target) = spec.argv.last() {
                let prefix = format!("{}/", target.trim_end_matches('/'));
                let mut inner = self.inner.lock();
                if let Some(files) = inner.files.get_mut(container_id) {
                    files.retain(|path, _| path != target && !path.starts_with(&prefix));
                }
            }
            return Ok(ExecResult {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
                duration: Duration::ZERO,
            });
        }

        let scripted = {
            let mut inner = self.inner.lock();
            let matches = inner.exec_queue.front().is_some_and(|s| {
                match s.first_arg.as_deref() {
                    None => true,
                    Some(arg) => spec.argv.first().map(String::as_str) == Some(arg),
                }
            });
            if matches {
                inner.exec_queue.pop_front()
            } else {
                None
            }
        };
        let Some(scripted) = scripted else {
            // Unscripted execs (workspace mkdir/cleanup, liveness probes)
            // succeed silently.
            return Ok(ExecResult {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
                duration: Duration::ZERO,
            });
        };

        // Streams pass through the same tail cap a real exec applies.
        let ExecResult { exit_code, stdout, stderr, duration } = scripted.result;
        let result = ExecResult {
            exit_code,
            stdout: cap_stream(stdout),
            stderr: cap_stream(stderr),
            duration,
        };

        if scripted.delay.is_zero() {
            return Ok(result);
        }

        tokio::select! {
            _ = tokio::time::sleep(scripted.delay) => Ok(result),
            _ = self.killed.notified() => {
                let signal = self.inner.lock().last_kill_signal.unwrap_or(Signal::Kill);
                let exit = match signal {
                    Signal::Term => 143,
                    Signal::Kill => 137,
                };
                Ok(ExecResult { exit_code: Some(exit), duration: Duration::ZERO, ..result })
            }
        }
    }

    async fn copy_in(
        &self,
        container_id: &str,
        src: &Path,
        dst: &str,
    ) -> Result<(), ContainerError> {
        self.record(DaemonCall::CopyIn { id: container_id.to_string(), dst: dst.to_string() });
        self.known(container_id)?;
        let mut staged = Vec::new();
        collect_host_files(src, src, &mut staged)
            .map_err(|e| ContainerError::Failed(format!("copy_in walk: {}", e)))?;
        let mut inner = self.inner.lock();
        let files = inner.files.entry(container_id.to_string()).or_default();
        for (rel, bytes) in staged {
            files.insert(format!("{}/{}", dst.trim_end_matches('/'), rel), bytes);
        }
        Ok(())
    }

    async fn copy_out(
        &self,
        container_id: &str,
        src: &str,
        dst: &Path,
    ) -> Result<(), ContainerError> {
        self.record(DaemonCall::CopyOut { id: container_id.to_string(), src: src.to_string() });
        self.known(container_id)?;
        let prefix = format!("{}/", src.trim_end_matches('/'));
        let to_write: Vec<(String, Vec<u8>)> = {
            let inner = self.inner.lock();
            inner
                .files
                .get(container_id)
                .map(|files| {
                    files
                        .iter()
                        .filter(|(path, _)| path.starts_with(&prefix))
                        .map(|(path, bytes)| (path[prefix.len()..].to_string(), bytes.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        for (rel, bytes) in to_write {
            let target = dst.join(&rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ContainerError::Failed(format!("copy_out mkdir: {}", e)))?;
            }
            std::fs::write(&target, bytes)
                .map_err(|e| ContainerError::Failed(format!("copy_out write: {}", e)))?;
        }
        Ok(())
    }

    async fn stats(&self, container_id: &str) -> Result<ContainerStats, ContainerError> {
        self.record(DaemonCall::Stats { id: container_id.to_string() });
        self.known(container_id)?;
        Ok(ContainerStats { rss_bytes: self.inner.lock().stats_rss })
    }

    async fn kill(&self, container_id: &str, signal: Signal) -> Result<(), ContainerError> {
        self.record(DaemonCall::Kill { id: container_id.to_string(), signal });
        self.known(container_id)?;
        self.inner.lock().last_kill_signal = Some(signal);
        self.killed.notify_waiters();
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> Result<(), ContainerError> {
        self.record(DaemonCall::Remove { id: container_id.to_string() });
        let mut inner = self.inner.lock();
        inner.containers.remove(container_id);
        inner.files.remove(container_id);
        Ok(())
    }
}

fn cap_stream(s: String) -> String {
    let mut buf = TailBuffer::stream();
    buf.push(s.as_bytes());
    buf.into_string()
}

/// Walk `dir` collecting (relative path, bytes) pairs.
fn collect_host_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, Vec<u8>)>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_host_files(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .map_err(|e| std::io::Error::other(e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            out.push((rel, std::fs::read(&path)?));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
