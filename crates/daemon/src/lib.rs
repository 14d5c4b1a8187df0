// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fx-daemon: the function execution agent.
//!
//! One agent consumes job requests from the queue, runs each bundle inside
//! a pooled container under its budgets, harvests produced outputs, and
//! publishes exactly one result envelope per message before deleting it.

pub mod bind;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod exec;
pub mod lifecycle;
pub mod pool;
pub mod publish;
pub mod stage;

pub use config::{AgentConfig, ConfigError};
pub use context::AgentContext;
pub use dispatch::Dispatcher;
pub use lifecycle::{startup, StartupError};
pub use pool::{Disposition, PoolError, RentedSlot, WarmPool};
