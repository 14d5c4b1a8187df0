// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result bus adapter: envelope fanout over Redis pub/sub.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("bus connect error: {0}")]
    Connect(String),
    #[error("bus publish error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait ResultBus: Send + Sync {
    /// Publish `payload` on `channel`. One attempt; retry policy belongs to
    /// the caller.
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PublishError>;
}

/// Redis pub/sub binding using a shared connection manager, which
/// re-establishes the connection after transient drops.
#[derive(Clone)]
pub struct RedisBus {
    manager: redis::aio::ConnectionManager,
}

impl RedisBus {
    pub async fn connect(
        host: &str,
        port: u16,
        password: Option<&str>,
    ) -> Result<Self, PublishError> {
        let url = match password {
            Some(password) => format!("redis://:{}@{}:{}/", password, host, port),
            None => format!("redis://{}:{}/", host, port),
        };
        let client =
            redis::Client::open(url).map_err(|e| PublishError::Connect(e.to_string()))?;
        let manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| PublishError::Connect(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl ResultBus for RedisBus {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PublishError> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(())
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeBus;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Inner {
        published: Vec<(String, Vec<u8>)>,
        fail_next: u32,
    }

    /// Recording bus double with scriptable transient failures.
    #[derive(Clone, Default)]
    pub struct FakeBus {
        inner: Arc<Mutex<Inner>>,
    }

    impl FakeBus {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next `n` publish attempts with a transport error.
        pub fn fail_next(&self, n: u32) {
            self.inner.lock().fail_next = n;
        }

        pub fn published(&self) -> Vec<(String, Vec<u8>)> {
            self.inner.lock().published.clone()
        }

        /// Channels published to, in order.
        pub fn channels(&self) -> Vec<String> {
            self.inner.lock().published.iter().map(|(c, _)| c.clone()).collect()
        }
    }

    #[async_trait]
    impl ResultBus for FakeBus {
        async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), PublishError> {
            let mut inner = self.inner.lock();
            if inner.fail_next > 0 {
                inner.fail_next -= 1;
                return Err(PublishError::Transport("scripted failure".into()));
            }
            inner.published.push((channel.to_string(), payload.to_vec()));
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
