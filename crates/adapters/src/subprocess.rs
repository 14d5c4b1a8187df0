// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded subprocess invocation.
//!
//! Every CLI call the agent makes goes through [`run_with_timeout`] so a
//! wedged daemon or network mount cannot stall the caller indefinitely.

use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{label}: failed to spawn: {source}")]
    Spawn {
        label: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{label}: timed out after {timeout:?}")]
    TimedOut { label: &'static str, timeout: Duration },
}

/// Run a command to completion, killing it if `timeout` elapses first.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &'static str,
) -> Result<Output, SubprocessError> {
    cmd.kill_on_drop(true);
    let fut = cmd.output();
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|source| SubprocessError::Spawn { label, source }),
        Err(_) => {
            tracing::warn!(label, ?timeout, "subprocess timed out");
            Err(SubprocessError::TimedOut { label, timeout })
        }
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
