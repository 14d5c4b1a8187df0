// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-wide capability bundle.
//!
//! Constructed once at startup and threaded explicitly; every component
//! depends on the narrow trait it needs, so tests swap in fakes without
//! touching global state.

use crate::config::AgentConfig;
use fx_adapters::{ContainerDaemon, MetricsSink, ObjectStore, QueueClient, ResultBus};
use fx_core::Clock;
use std::sync::Arc;

/// Shared handles for one agent process.
pub struct AgentContext<C: Clock> {
    pub config: Arc<AgentConfig>,
    pub queue: Arc<dyn QueueClient>,
    pub store: Arc<dyn ObjectStore>,
    pub bus: Arc<dyn ResultBus>,
    pub daemon: Arc<dyn ContainerDaemon>,
    pub metrics: Arc<dyn MetricsSink>,
    pub clock: C,
}

impl<C: Clock> Clone for AgentContext<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            queue: self.queue.clone(),
            store: self.store.clone(),
            bus: self.bus.clone(),
            daemon: self.daemon.clone(),
            metrics: self.metrics.clone(),
            clock: self.clock.clone(),
        }
    }
}
