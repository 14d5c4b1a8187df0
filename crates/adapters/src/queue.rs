// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job queue adapter.
//!
//! Long-poll receive plus the two acknowledgement verbs the dispatcher
//! needs: delete (terminal) and visibility extension (heartbeat). The
//! production implementation binds AWS SQS.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(String),
}

/// One received message. `receipt_handle` is the ownership token used to
/// delete or extend; it is only valid until the visibility timeout lapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-poll for up to `max` messages, waiting at most `wait`.
    async fn receive(&self, max: u32, wait: Duration) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge a message terminally. Must only be called after the
    /// job's envelope was published.
    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError>;

    /// Push the message's visibility window out by `timeout`.
    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), QueueError>;
}

/// AWS SQS binding.
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self { client, queue_url: queue_url.into() }
    }
}

#[async_trait]
impl QueueClient for SqsQueue {
    async fn receive(&self, max: u32, wait: Duration) -> Result<Vec<QueueMessage>, QueueError> {
        let out = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max.min(10) as i32)
            .wait_time_seconds(wait.as_secs().min(20) as i32)
            .send()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;

        Ok(out
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                let message_id = m.message_id?;
                let receipt_handle = m.receipt_handle?;
                let body = m.body?;
                Some(QueueMessage { message_id, receipt_handle, body })
            })
            .collect())
    }

    async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt_handle: &str,
        timeout: Duration,
    ) -> Result<(), QueueError> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(timeout.as_secs() as i32)
            .send()
            .await
            .map_err(|e| QueueError::Transport(e.to_string()))?;
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeQueue;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Default)]
    struct Inner {
        pending: VecDeque<QueueMessage>,
        deleted: Vec<String>,
        extensions: Vec<(String, Duration)>,
        next_id: u64,
    }

    /// In-memory queue double. Messages are scripted with [`FakeQueue::push`];
    /// deletes and visibility extensions are recorded for assertions.
    #[derive(Clone, Default)]
    pub struct FakeQueue {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakeQueue {
        pub fn new() -> Self {
            Self::default()
        }

        /// Enqueue a message body; the receipt handle is derived from the
        /// generated message id.
        pub fn push(&self, body: impl Into<String>) -> QueueMessage {
            let mut inner = self.inner.lock();
            inner.next_id += 1;
            let message = QueueMessage {
                message_id: format!("msg-{:04}", inner.next_id),
                receipt_handle: format!("rcpt-{:04}", inner.next_id),
                body: body.into(),
            };
            inner.pending.push_back(message.clone());
            message
        }

        pub fn deleted(&self) -> Vec<String> {
            self.inner.lock().deleted.clone()
        }

        pub fn extensions(&self) -> Vec<(String, Duration)> {
            self.inner.lock().extensions.clone()
        }

        pub fn pending_len(&self) -> usize {
            self.inner.lock().pending.len()
        }
    }

    #[async_trait]
    impl QueueClient for FakeQueue {
        async fn receive(&self, max: u32, _wait: Duration) -> Result<Vec<QueueMessage>, QueueError> {
            let batch: Vec<QueueMessage> = {
                let mut inner = self.inner.lock();
                let take = (max as usize).min(inner.pending.len());
                inner.pending.drain(..take).collect()
            };
            if batch.is_empty() {
                // Keep pollers from spinning; real long-poll would block.
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(batch)
        }

        async fn delete(&self, receipt_handle: &str) -> Result<(), QueueError> {
            self.inner.lock().deleted.push(receipt_handle.to_string());
            Ok(())
        }

        async fn extend_visibility(
            &self,
            receipt_handle: &str,
            timeout: Duration,
        ) -> Result<(), QueueError> {
            self.inner.lock().extensions.push((receipt_handle.to_string(), timeout));
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
