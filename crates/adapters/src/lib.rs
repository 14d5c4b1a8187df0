// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fx-adapters: capability interfaces over the agent's external surfaces.
//!
//! Each adapter is a narrow trait plus a production implementation and a
//! deterministic fake (behind `test-support`): the container daemon, the
//! job queue, the object store, the result bus, and the metrics sink.

pub mod bus;
pub mod container;
pub mod metrics;
pub mod queue;
pub mod store;
pub mod subprocess;

pub use bus::{PublishError, RedisBus, ResultBus};
pub use container::{
    ContainerDaemon, ContainerError, ContainerStats, DockerCli, ExecResult, ExecSpec, Signal,
};
pub use metrics::{MetricsSink, TracingSink};
pub use queue::{QueueClient, QueueError, QueueMessage, SqsQueue};
pub use store::{ObjectStore, S3Store, StoreError};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use bus::FakeBus;
#[cfg(any(test, feature = "test-support"))]
pub use container::{DaemonCall, FakeDaemon};
#[cfg(any(test, feature = "test-support"))]
pub use metrics::{FakeSink, MetricCall};
#[cfg(any(test, feature = "test-support"))]
pub use queue::FakeQueue;
#[cfg(any(test, feature = "test-support"))]
pub use store::FakeStore;
