// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result publication.
//!
//! Exactly one envelope per message, on `<result_prefix><request_id>`,
//! retried with exponential backoff. A publish that ultimately fails is
//! critical: the caller must NOT delete the queue message, so the job is
//! redelivered and republished (consumers are idempotent on `request_id`).

use crate::config::AgentConfig;
use fx_adapters::{MetricsSink, PublishError, ResultBus};
use fx_core::{JobRequest, ResultEnvelope};
use std::sync::Arc;
use std::time::Duration;

const PUBLISH_ATTEMPTS: u32 = 3;
const PUBLISH_BACKOFF_START: Duration = Duration::from_millis(100);
const PUBLISH_BACKOFF_FACTOR: u32 = 2;

pub struct ResultPublisher {
    bus: Arc<dyn ResultBus>,
    metrics: Arc<dyn MetricsSink>,
    config: Arc<AgentConfig>,
}

impl ResultPublisher {
    pub fn new(
        bus: Arc<dyn ResultBus>,
        metrics: Arc<dyn MetricsSink>,
        config: Arc<AgentConfig>,
    ) -> Self {
        Self { bus, metrics, config }
    }

    /// Publish the envelope, retrying transient failures.
    pub async fn publish(&self, envelope: &ResultEnvelope) -> Result<(), PublishError> {
        let channel = envelope.channel(&self.config.redis.result_prefix);
        let payload = serde_json::to_vec(envelope)
            .map_err(|e| PublishError::Transport(format!("envelope encode: {}", e)))?;

        let mut backoff = PUBLISH_BACKOFF_START;
        let mut last_err = None;
        for attempt in 1..=PUBLISH_ATTEMPTS {
            match self.bus.publish(&channel, &payload).await {
                Ok(()) => {
                    tracing::info!(
                        request_id = %envelope.request_id,
                        status = %envelope.status,
                        %channel,
                        attempt,
                        "result published"
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %envelope.request_id,
                        %channel,
                        attempt,
                        error = %e,
                        "publish attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < PUBLISH_ATTEMPTS {
                        tokio::time::sleep(backoff).await;
                        backoff *= PUBLISH_BACKOFF_FACTOR;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| PublishError::Transport("no attempts made".into())))
    }

    /// Report the job's metrics. Failures are swallowed by the sink.
    pub fn report(&self, request: &JobRequest, envelope: &ResultEnvelope) {
        let runtime = request.runtime.to_string();
        let status = envelope.status.to_string();
        self.metrics.gauge(
            "function_peak_memory_bytes",
            envelope.peak_memory_bytes as f64,
            &[("function_id", request.function_id.as_str()), ("runtime", runtime.as_str())],
        );
        self.metrics.counter("function_exit", &[("status", status.as_str())]);
    }
}

#[cfg(test)]
#[path = "publish_tests.rs"]
mod tests;
