// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wall-clock source for slot bookkeeping.
//!
//! Slots are stamped (creation, last health check) and retired by age in
//! epoch milliseconds. That is the only time the agent reads through an
//! abstraction: execution deadlines run on the async runtime's own timer,
//! so this trait is a single method, and the test clock is just a counter
//! that steps slot ages forward without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Epoch-millisecond source.
pub trait Clock: Clone + Send + Sync + 'static {
    fn epoch_ms(&self) -> u64;
}

/// System wall clock.
#[derive(Clone, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually stepped clock for tests. Clones share the same counter.
#[derive(Clone)]
pub struct TestClock {
    ms: Arc<AtomicU64>,
}

impl TestClock {
    /// Starts at a fixed arbitrary epoch so slot ages begin at zero.
    pub fn new() -> Self {
        Self::at(1_700_000_000_000)
    }

    pub fn at(epoch_ms: u64) -> Self {
        Self { ms: Arc::new(AtomicU64::new(epoch_ms)) }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs * 1000);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn epoch_ms(&self) -> u64 {
        self.ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
