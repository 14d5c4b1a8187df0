// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent lifecycle: startup preflight, adapter wiring, shutdown plumbing.
//!
//! Startup failures are fatal (exit 1): a missing daemon or unreachable
//! bus means this host cannot take work, and the fleet is better off
//! without a half-alive agent.

use crate::config::AgentConfig;
use crate::context::AgentContext;
use crate::dispatch::Dispatcher;
use crate::pool::WarmPool;
use fx_adapters::{
    ContainerDaemon, ContainerError, DockerCli, PublishError, RedisBus, S3Store, SqsQueue,
    TracingSink,
};
use fx_core::WallClock;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("container daemon preflight failed: {0}")]
    Daemon(#[source] ContainerError),
    #[error("result bus unreachable: {0}")]
    Bus(#[source] PublishError),
}

/// A fully wired agent, ready to run.
pub struct Agent {
    pub dispatcher: Dispatcher<WallClock>,
    pub pool: Arc<WarmPool<WallClock>>,
    /// Cancel to request a graceful stop (stops intake, then drains).
    pub shutdown: CancellationToken,
    /// Cancels pool background actors once the dispatcher has drained.
    pub actor_token: CancellationToken,
    pub actor_handles: Vec<tokio::task::JoinHandle<()>>,
}

/// Verify the container daemon is reachable before accepting work.
pub async fn preflight(daemon: &dyn ContainerDaemon) -> Result<(), StartupError> {
    daemon.ping().await.map_err(StartupError::Daemon)
}

/// Construct AWS/Redis/Docker clients, run preflight, and wire the
/// dispatcher and warm pool.
pub async fn startup(config: AgentConfig) -> Result<Agent, StartupError> {
    let config = Arc::new(config);

    let mut loader = aws_config::from_env();
    if let Some(region) = config.aws.region.clone() {
        loader = loader.region(aws_config::Region::new(region));
    }
    let aws = loader.load().await;
    let queue =
        Arc::new(SqsQueue::new(aws_sdk_sqs::Client::new(&aws), config.sqs.queue_url.clone()));
    let store = Arc::new(S3Store::new(aws_sdk_s3::Client::new(&aws)));

    let bus = Arc::new(
        RedisBus::connect(&config.redis.host, config.redis.port, config.redis.password.as_deref())
            .await
            .map_err(StartupError::Bus)?,
    );

    let daemon: Arc<dyn ContainerDaemon> = Arc::new(DockerCli::new());
    preflight(daemon.as_ref()).await?;

    let ctx = AgentContext {
        config: config.clone(),
        queue,
        store,
        bus,
        daemon,
        metrics: Arc::new(TracingSink::new()),
        clock: WallClock,
    };

    let pool = WarmPool::new(ctx.daemon.clone(), config, WallClock);
    let actor_token = CancellationToken::new();
    let actor_handles = pool.spawn_actors(&actor_token);

    let shutdown = CancellationToken::new();
    let dispatcher = Dispatcher::new(ctx, pool.clone(), shutdown.clone());

    tracing::info!("agent startup complete");
    Ok(Agent { dispatcher, pool, shutdown, actor_token, actor_handles })
}

impl Agent {
    /// Stop background actors after the dispatcher has drained.
    pub async fn stop_actors(self) {
        self.actor_token.cancel();
        for handle in self.actor_handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
