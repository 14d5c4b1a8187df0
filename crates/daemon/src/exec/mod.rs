// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job execution under wall-clock and memory budgets.
//!
//! One exec per job: the staged argv runs in the rented container while
//! this module arms the deadline timer and samples container memory. On
//! deadline it escalates TERM → (500ms) → KILL against the job's process
//! tree; the slot is reported dirty because a killed process may have left
//! the container in an unknown state.
//!
//! The cgroup limit is the hard memory ceiling; an OOM kill surfaces as
//! exit 137 and is classified `memory_exceeded`. Sampling only feeds the
//! published `peak_memory_bytes`.

use crate::stage::StagedJob;
use fx_adapters::{ContainerDaemon, ContainerError, ExecResult, ExecSpec, Signal};
use fx_core::ExecStatus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Exit code the kernel reports for a SIGKILLed (OOM-killed) process.
const OOM_EXIT_CODE: i32 = 137;

const TERM_GRACE: Duration = Duration::from_millis(500);
const STATS_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);
/// How long to wait for the exec client to return after KILL.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);
/// Slack added to the exec hard timeout beyond the job deadline.
const HARD_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ExecError {
    /// Agent shutdown interrupted the job; nothing is published and the
    /// message is left to redeliver.
    #[error("execution cancelled by shutdown")]
    Cancelled,
    #[error(transparent)]
    Container(#[from] ContainerError),
}

impl ExecError {
    pub fn is_daemon_fatal(&self) -> bool {
        matches!(self, Self::Container(e) if e.is_fatal())
    }
}

/// What one execution produced, before output binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecVerdict {
    pub status: ExecStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub peak_memory_bytes: u64,
    /// Slot must not be reused (timeout kill or unreaped process).
    pub dirty: bool,
}

pub struct Executor {
    daemon: Arc<dyn ContainerDaemon>,
    grace: Duration,
    sample_interval: Duration,
}

impl Executor {
    pub fn new(daemon: Arc<dyn ContainerDaemon>) -> Self {
        Self { daemon, grace: TERM_GRACE, sample_interval: STATS_SAMPLE_INTERVAL }
    }

    /// Run the staged job in `container_id` under its budgets.
    pub async fn run(
        &self,
        container_id: &str,
        staged: &StagedJob,
        timeout_ms: u64,
        memory_mb: u64,
        cancel: &CancellationToken,
    ) -> Result<ExecVerdict, ExecError> {
        // The cgroup ceiling comes from the job, not the pool; idle
        // containers carry no reservation.
        self.daemon.set_memory(container_id, memory_mb).await?;

        let deadline = Duration::from_millis(timeout_ms);
        let spec = ExecSpec::new(staged.argv.clone())
            .workdir(staged.workspace.clone())
            .hard_timeout(deadline + self.grace + REAP_TIMEOUT + HARD_TIMEOUT_MARGIN);

        let start = tokio::time::Instant::now();
        let mut exec_fut = Box::pin(self.daemon.exec(container_id, spec));
        let deadline_sleep = tokio::time::sleep(deadline);
        tokio::pin!(deadline_sleep);
        let mut sampler = tokio::time::interval(self.sample_interval);
        sampler.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut peak_memory_bytes: u64 = 0;

        enum Ended {
            Finished(Result<ExecResult, ContainerError>),
            Deadline,
            Cancelled,
        }

        let ended = loop {
            tokio::select! {
                result = &mut exec_fut => break Ended::Finished(result),
                _ = &mut deadline_sleep => break Ended::Deadline,
                _ = cancel.cancelled() => break Ended::Cancelled,
                _ = sampler.tick() => {
                    if let Ok(stats) = self.daemon.stats(container_id).await {
                        peak_memory_bytes = peak_memory_bytes.max(stats.rss_bytes);
                    }
                }
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match ended {
            Ended::Finished(Err(e)) => Err(e.into()),
            Ended::Finished(Ok(result)) => {
                let status = match result.exit_code {
                    Some(0) => ExecStatus::Succeeded,
                    Some(OOM_EXIT_CODE) => ExecStatus::MemoryExceeded,
                    Some(_) => ExecStatus::FailedNonZeroExit,
                    // Unreaped status: treat the run and the slot as suspect.
                    None => ExecStatus::InternalError,
                };
                Ok(ExecVerdict {
                    status,
                    exit_code: result.exit_code,
                    stdout: result.stdout,
                    stderr: result.stderr,
                    duration_ms,
                    peak_memory_bytes,
                    dirty: result.exit_code.is_none(),
                })
            }
            Ended::Deadline => {
                tracing::warn!(container = container_id, timeout_ms, "job hit wall-clock budget");
                self.kill(container_id, Signal::Term).await;
                let reaped = match tokio::time::timeout(self.grace, &mut exec_fut).await {
                    Ok(result) => result.ok(),
                    Err(_) => {
                        self.kill(container_id, Signal::Kill).await;
                        match tokio::time::timeout(REAP_TIMEOUT, &mut exec_fut).await {
                            Ok(result) => result.ok(),
                            Err(_) => {
                                tracing::error!(
                                    container = container_id,
                                    "exec did not return after KILL"
                                );
                                None
                            }
                        }
                    }
                };
                // The reaped exit is not trusted once the killer fired; even
                // an exit 0 here is reported as timed out.
                let (stdout, stderr) = match reaped {
                    Some(result) => (result.stdout, result.stderr),
                    None => (String::new(), String::new()),
                };
                Ok(ExecVerdict {
                    status: ExecStatus::TimedOut,
                    exit_code: None,
                    stdout,
                    stderr,
                    duration_ms: start.elapsed().as_millis() as u64,
                    peak_memory_bytes,
                    dirty: true,
                })
            }
            Ended::Cancelled => {
                self.kill(container_id, Signal::Kill).await;
                Err(ExecError::Cancelled)
            }
        }
    }

    async fn kill(&self, container_id: &str, signal: Signal) {
        if let Err(e) = self.daemon.kill(container_id, signal).await {
            tracing::warn!(container = container_id, ?signal, error = %e, "kill failed");
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
