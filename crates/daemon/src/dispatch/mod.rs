// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatcher: long-poll intake, bounded concurrency, and the per-job
//! state machine.
//!
//! Intake is single-threaded and acquires a semaphore permit before each
//! received message; jobs run as spawned tasks holding their permit. A
//! background heartbeat extends message visibility while the job runs.
//! The message is deleted only after its envelope was published; every
//! infra failure (pool exhausted, bus down, shutdown, daemon loss) leaves
//! the message for redelivery instead.

use crate::bind::OutputBinder;
use crate::config::AgentConfig;
use crate::context::AgentContext;
use crate::exec::{ExecError, Executor};
use crate::pool::{Disposition, PoolError, WarmPool};
use crate::publish::ResultPublisher;
use crate::stage::Stager;
use fx_adapters::{QueueClient, QueueMessage};
use fx_core::{
    Clock, ExecOutcome, ExecStatus, FunctionId, JobRequest, RequestId, ResultEnvelope,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);
/// Pause after cancelling stragglers so slot releases settle before drain.
const CANCEL_SETTLE: Duration = Duration::from_millis(100);

/// Unrecoverable agent failure; maps to process exit code 2.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FatalError {
    #[error("container daemon lost")]
    DaemonLost,
}

/// How one job ended, from the queue's point of view.
enum JobEnd {
    /// Publish this outcome; delete the message once published.
    Terminal(ExecOutcome),
    /// Leave the message alone; the visibility timeout will redeliver it.
    Redeliver,
}

pub struct Dispatcher<C: Clock> {
    ctx: AgentContext<C>,
    pool: Arc<WarmPool<C>>,
    stager: Arc<Stager>,
    executor: Arc<Executor>,
    binder: Arc<OutputBinder>,
    publisher: Arc<ResultPublisher>,
    semaphore: Arc<Semaphore>,
    /// Stops intake (signal handler cancels this).
    shutdown: CancellationToken,
    /// Cancels in-flight jobs once the drain grace expires.
    job_cancel: CancellationToken,
    /// Set when the container daemon is observed gone.
    fatal: CancellationToken,
}

impl<C: Clock> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            pool: self.pool.clone(),
            stager: self.stager.clone(),
            executor: self.executor.clone(),
            binder: self.binder.clone(),
            publisher: self.publisher.clone(),
            semaphore: self.semaphore.clone(),
            shutdown: self.shutdown.clone(),
            job_cancel: self.job_cancel.clone(),
            fatal: self.fatal.clone(),
        }
    }
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(
        ctx: AgentContext<C>,
        pool: Arc<WarmPool<C>>,
        shutdown: CancellationToken,
    ) -> Self {
        let stager =
            Arc::new(Stager::new(ctx.store.clone(), ctx.daemon.clone(), ctx.config.clone()));
        let executor = Arc::new(Executor::new(ctx.daemon.clone()));
        let binder =
            Arc::new(OutputBinder::new(ctx.store.clone(), ctx.daemon.clone(), ctx.config.clone()));
        let publisher = Arc::new(ResultPublisher::new(
            ctx.bus.clone(),
            ctx.metrics.clone(),
            ctx.config.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(ctx.config.max_in_flight()));
        Self {
            ctx,
            pool,
            stager,
            executor,
            binder,
            publisher,
            semaphore,
            shutdown,
            job_cancel: CancellationToken::new(),
            fatal: CancellationToken::new(),
        }
    }

    fn config(&self) -> &AgentConfig {
        &self.ctx.config
    }

    /// Intake loop. Returns after a drain on shutdown, or with
    /// [`FatalError`] when the container daemon was lost.
    pub async fn run(&self) -> Result<(), FatalError> {
        tracing::info!(
            max_in_flight = self.config().max_in_flight(),
            queue = %self.config().sqs.queue_url,
            "dispatcher started"
        );
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.fatal.cancelled() => break,
                permit = self.semaphore.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };
                    self.intake(permit).await;
                }
            }
        }
        self.drain().await;
        if self.fatal.is_cancelled() {
            return Err(FatalError::DaemonLost);
        }
        Ok(())
    }

    /// One receive round. `first_permit` backs the first message; further
    /// messages in the batch each acquire their own permit.
    async fn intake(&self, first_permit: tokio::sync::OwnedSemaphorePermit) {
        let spare = self.semaphore.available_permits() as u32;
        let max = self.config().sqs.max_number_of_messages.min(spare + 1).max(1);
        let wait = Duration::from_secs(self.config().sqs.wait_time_seconds);

        let batch = tokio::select! {
            result = self.ctx.queue.receive(max, wait) => match result {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(error = %e, "queue receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                    return;
                }
            },
            _ = self.shutdown.cancelled() => return,
        };

        let mut first_permit = Some(first_permit);
        for message in batch {
            let permit = match first_permit.take() {
                Some(permit) => permit,
                None => {
                    let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                        return;
                    };
                    permit
                }
            };
            let dispatcher = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                dispatcher.process_message(message).await;
            });
        }
    }

    /// Per-message state machine:
    /// parse → stage → acquire → inject → execute → bind → publish → delete.
    async fn process_message(&self, message: QueueMessage) {
        let span = tracing::info_span!("job.process", message_id = %message.message_id);
        async {
            let request: JobRequest = match serde_json::from_str(&message.body) {
                Ok(request) => request,
                Err(e) => {
                    self.reject_invalid(&message, &format!("unparseable body: {}", e)).await;
                    return;
                }
            };
            if let Err(e) = request.validate() {
                self.reject_invalid(&message, &e.to_string()).await;
                return;
            }

            tracing::info!(
                request_id = %request.request_id,
                function_id = %request.function_id,
                runtime = %request.runtime,
                timeout_ms = request.timeout_ms,
                memory_mb = request.memory_mb,
                "job received"
            );

            let heartbeat_stop = CancellationToken::new();
            let heartbeat = tokio::spawn(run_heartbeat(
                self.ctx.queue.clone(),
                message.receipt_handle.clone(),
                Duration::from_secs(self.config().sqs.visibility_timeout_seconds),
                heartbeat_stop.clone(),
            ));

            let end = self.run_job(&request).await;
            heartbeat_stop.cancel();
            let _ = heartbeat.await;

            match end {
                JobEnd::Terminal(outcome) => {
                    let envelope = ResultEnvelope::new(&request, outcome);
                    self.publish_and_delete(&request, &envelope, &message).await;
                }
                JobEnd::Redeliver => {
                    tracing::info!(
                        request_id = %request.request_id,
                        "message left for redelivery"
                    );
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Stage → acquire → inject → execute → bind, owning the slot and
    /// scratch lifetimes on every exit path.
    async fn run_job(&self, request: &JobRequest) -> JobEnd {
        // Staging starts before acquisition: a stuck download must not
        // burn a container.
        let prepared = match self.stager.prepare(request).await {
            Ok(prepared) => prepared,
            Err(e) if e.is_daemon_fatal() => {
                self.fatal.cancel();
                return JobEnd::Redeliver;
            }
            Err(e) => {
                return JobEnd::Terminal(ExecOutcome::failed_before_exec(
                    ExecStatus::StageError,
                    e.to_string(),
                ));
            }
        };

        let rent_deadline =
            Duration::from_secs((self.config().sqs.visibility_timeout_seconds / 2).max(1));
        let mut rented = match self.pool.rent(request.runtime, rent_deadline).await {
            Ok(rented) => rented,
            Err(e) if e.is_retryable() => {
                tracing::info!(
                    request_id = %request.request_id,
                    runtime = %request.runtime,
                    "no slot available, scheduling retry via redelivery"
                );
                return JobEnd::Redeliver;
            }
            Err(PoolError::Provision(ce)) if ce.is_fatal() => {
                self.fatal.cancel();
                return JobEnd::Redeliver;
            }
            Err(e) => {
                return JobEnd::Terminal(ExecOutcome::failed_before_exec(
                    ExecStatus::InternalError,
                    e.to_string(),
                ));
            }
        };

        let staged = match self.stager.inject(request, &prepared, &rented.container_id).await {
            Ok(staged) => staged,
            Err(e) => {
                let fatal = e.is_daemon_fatal();
                self.pool.release(rented, Disposition::Dirty).await;
                if fatal {
                    self.fatal.cancel();
                    return JobEnd::Redeliver;
                }
                return JobEnd::Terminal(ExecOutcome::failed_before_exec(
                    ExecStatus::StageError,
                    e.to_string(),
                ));
            }
        };
        rented.set_workspace(staged.workspace.clone());

        let verdict = match self
            .executor
            .run(
                &rented.container_id,
                &staged,
                request.timeout_ms,
                request.memory_mb,
                &self.job_cancel,
            )
            .await
        {
            Ok(verdict) => verdict,
            Err(ExecError::Cancelled) => {
                self.pool.release(rented, Disposition::Dirty).await;
                return JobEnd::Redeliver;
            }
            Err(e) => {
                let fatal = e.is_daemon_fatal();
                self.pool.release(rented, Disposition::Dirty).await;
                if fatal {
                    self.fatal.cancel();
                    return JobEnd::Redeliver;
                }
                return JobEnd::Terminal(ExecOutcome::failed_before_exec(
                    ExecStatus::InternalError,
                    e.to_string(),
                ));
            }
        };

        // Outputs are harvested even on failure or timeout; the caller
        // decides whether they mean anything.
        let outputs =
            self.binder.bind(request, &rented.container_id, prepared.scratch.path()).await;

        let disposition = if verdict.dirty { Disposition::Dirty } else { Disposition::Clean };
        self.pool.release(rented, disposition).await;

        JobEnd::Terminal(ExecOutcome {
            status: verdict.status,
            exit_code: verdict.exit_code,
            stdout: verdict.stdout,
            stderr: verdict.stderr,
            duration_ms: verdict.duration_ms,
            peak_memory_bytes: verdict.peak_memory_bytes,
            outputs,
        })
    }

    /// Publish the envelope; delete the message only on publish success.
    async fn publish_and_delete(
        &self,
        request: &JobRequest,
        envelope: &ResultEnvelope,
        message: &QueueMessage,
    ) {
        match self.publisher.publish(envelope).await {
            Ok(()) => {
                self.publisher.report(request, envelope);
                if let Err(e) = self.ctx.queue.delete(&message.receipt_handle).await {
                    // Envelope is out; redelivery will republish and the
                    // consumer dedupes on request_id.
                    tracing::warn!(
                        request_id = %envelope.request_id,
                        error = %e,
                        "message delete failed after publish"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    request_id = %envelope.request_id,
                    error = %e,
                    "publish failed after retries, leaving message for redelivery"
                );
                self.ctx.metrics.counter("publish_failure", &[]);
            }
        }
    }

    /// Invalid intake: publish an `internal_error` envelope when the body
    /// still names a request, then delete; bodies that cannot name
    /// themselves are deleted and counted.
    async fn reject_invalid(&self, message: &QueueMessage, reason: &str) {
        tracing::warn!(message_id = %message.message_id, reason, "invalid message");
        self.ctx.metrics.counter("invalid_message", &[]);

        let identity: Option<(String, String)> = serde_json::from_str::<serde_json::Value>(
            &message.body,
        )
        .ok()
        .and_then(|value| {
            let request_id = value.get("requestId")?.as_str()?.to_string();
            let function_id =
                value.get("functionId").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            Some((request_id, function_id))
        });

        if let Some((request_id, function_id)) = identity {
            let envelope = ResultEnvelope {
                request_id: RequestId::new(request_id),
                function_id: FunctionId::new(function_id),
                status: ExecStatus::InternalError,
                exit_code: None,
                stdout: String::new(),
                stderr: format!("invalid request: {}", reason),
                duration_ms: 0,
                peak_memory_bytes: 0,
                outputs: Vec::new(),
            };
            if self.publisher.publish(&envelope).await.is_err() {
                // Bus down: keep the message; redelivery retries everything.
                return;
            }
        }
        if let Err(e) = self.ctx.queue.delete(&message.receipt_handle).await {
            tracing::warn!(message_id = %message.message_id, error = %e, "invalid message delete failed");
        }
    }

    /// Wait out in-flight jobs (grace = the largest configured budget),
    /// cancel stragglers, and drain the pool.
    async fn drain(&self) {
        let grace = Duration::from_millis(self.config().largest_timeout_ms());
        let total = self.config().max_in_flight() as u32;
        tracing::info!(grace_ms = grace.as_millis() as u64, "draining in-flight jobs");
        if total > 0 {
            let all_idle = self.semaphore.acquire_many(total);
            if tokio::time::timeout(grace, all_idle).await.is_err() {
                tracing::warn!("drain grace expired, cancelling in-flight jobs");
                self.job_cancel.cancel();
                tokio::time::sleep(CANCEL_SETTLE).await;
            }
        }
        self.pool.shutdown().await;
        tracing::info!("dispatcher drained");
    }
}

/// Extend message visibility every `visibility / 3` until stopped.
async fn run_heartbeat(
    queue: Arc<dyn QueueClient>,
    receipt_handle: String,
    visibility: Duration,
    stop: CancellationToken,
) {
    let interval = (visibility / 3).max(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = tokio::time::sleep(interval) => {
                if let Err(e) = queue.extend_visibility(&receipt_handle, visibility).await {
                    tracing::warn!(error = %e, "visibility extension failed");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
