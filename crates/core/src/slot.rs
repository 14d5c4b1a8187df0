// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container slot identity and state machine.
//!
//! A slot tracks one pooled container from creation to destruction. Its
//! runtime is fixed for its lifetime; the generation counter is bumped on
//! every rent so a stale return can be detected and refused.

use crate::runtime::RuntimeKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a pooled container slot: `slt-` plus 19 random chars.
///
/// The suffix doubles as the unique part of the daemon-visible container
/// name (`fx-<runtime>-<suffix>`), so one id ties the pool's bookkeeping
/// to what `docker ps` shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    const PREFIX: &'static str = "slt-";

    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(19)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Random part without the type prefix, used in container names.
    pub fn suffix(&self) -> &str {
        self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a container slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// Container is being created/started; not yet rentable.
    Provisioning,
    /// Started, healthy, waiting for a job.
    Idle,
    /// Exclusively held by one job.
    Rented,
    /// Possibly corrupted by the previous job; must not be reused.
    Dirty,
    /// Being torn down (dirty return, wear limit, or pool shutdown).
    Draining,
    /// Container removed; terminal.
    Destroyed,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Provisioning => "provisioning",
            Self::Idle => "idle",
            Self::Rented => "rented",
            Self::Dirty => "dirty",
            Self::Draining => "draining",
            Self::Destroyed => "destroyed",
        })
    }
}

impl SlotState {
    /// States counted against the pool's population bound.
    pub fn counts_toward_population(self) -> bool {
        matches!(self, Self::Provisioning | Self::Idle | Self::Rented)
    }
}

/// One pooled container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSlot {
    pub id: SlotId,
    /// Identifier the container daemon knows the container by.
    pub container_id: String,
    pub runtime: RuntimeKind,
    pub state: SlotState,
    /// Bumped on every rent; stale returns are refused and destroyed.
    pub generation: u64,
    pub created_at_ms: u64,
    pub last_health_check_ms: u64,
    /// Number of jobs this slot has served.
    pub use_count: u32,
}

impl ContainerSlot {
    pub fn new(runtime: RuntimeKind, container_id: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: SlotId::generate(),
            container_id: container_id.into(),
            runtime,
            state: SlotState::Provisioning,
            generation: 0,
            created_at_ms: now_ms,
            last_health_check_ms: now_ms,
            use_count: 0,
        }
    }

    /// Age of the slot at `now_ms`.
    pub fn age_secs(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms) / 1000
    }

    /// Whether wear limits retire this slot instead of returning it Idle.
    ///
    /// A limit of 0 disables that check.
    pub fn worn_out(&self, now_ms: u64, max_uses: u32, max_age_secs: u64) -> bool {
        (max_uses > 0 && self.use_count >= max_uses)
            || (max_age_secs > 0 && self.age_secs(now_ms) >= max_age_secs)
    }
}

#[cfg(test)]
#[path = "slot_tests.rs"]
mod tests;
