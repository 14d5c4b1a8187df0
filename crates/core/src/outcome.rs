// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution outcome and the result envelope published on the bus.

use crate::request::{FunctionId, JobRequest, RequestId};
use serde::{Deserialize, Serialize};

/// Cap on captured bytes per output stream (stdout, stderr).
pub const STREAM_CAP_BYTES: usize = 64 * 1024;

/// Prepended to a captured stream when earlier bytes were dropped.
pub const ELISION_MARKER: &str = "[...truncated...]";

/// Terminal classification of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Succeeded,
    FailedNonZeroExit,
    TimedOut,
    MemoryExceeded,
    StageError,
    InternalError,
}

impl std::fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Matches the serde rename so logs and envelopes agree.
        f.write_str(match self {
            Self::Succeeded => "succeeded",
            Self::FailedNonZeroExit => "failed_non_zero_exit",
            Self::TimedOut => "timed_out",
            Self::MemoryExceeded => "memory_exceeded",
            Self::StageError => "stage_error",
            Self::InternalError => "internal_error",
        })
    }
}

/// One harvested output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    /// Path relative to the job's `output/` directory.
    pub path: String,
    pub size: u64,
    /// Final object-store locator (`<prefix>/<request_id>/<path>`).
    pub locator: String,
}

/// Everything known about a finished job, before enveloping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub status: ExecStatus,
    /// Present when the process actually ran and was reaped.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub peak_memory_bytes: u64,
    pub outputs: Vec<OutputEntry>,
}

impl ExecOutcome {
    /// Outcome for a job that never reached execution (stage/internal error).
    ///
    /// `stderr` carries the human-readable reason so the caller sees why.
    pub fn failed_before_exec(status: ExecStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            exit_code: None,
            stdout: String::new(),
            stderr: reason.into(),
            duration_ms: 0,
            peak_memory_bytes: 0,
            outputs: Vec::new(),
        }
    }
}

/// The JSON document published on `<result_prefix><request_id>`.
///
/// Exactly one envelope is published per received message before that
/// message is deleted from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub request_id: RequestId,
    pub function_id: FunctionId,
    pub status: ExecStatus,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub peak_memory_bytes: u64,
    pub outputs: Vec<OutputEntry>,
}

impl ResultEnvelope {
    pub fn new(request: &JobRequest, outcome: ExecOutcome) -> Self {
        Self {
            request_id: request.request_id.clone(),
            function_id: request.function_id.clone(),
            status: outcome.status,
            exit_code: outcome.exit_code,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            duration_ms: outcome.duration_ms,
            peak_memory_bytes: outcome.peak_memory_bytes,
            outputs: outcome.outputs,
        }
    }

    /// Channel this envelope publishes on.
    pub fn channel(&self, result_prefix: &str) -> String {
        format!("{}{}", result_prefix, self.request_id)
    }
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
