// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Warm container pool.
//!
//! Per-runtime bounded sets of pre-started containers, rented exclusively
//! by one job at a time. The slot set lives under a `parking_lot` mutex
//! that is never held across I/O; renters park on a notify primitive until
//! a slot comes back or their deadline lapses. One background refill actor
//! per runtime keeps the population topped up off the hot path, and a
//! periodic sweep re-validates idle slots.
//!
//! Population invariant: `idle + rented + provisioning <= capacity` per
//! runtime, enforced by reserving a Provisioning placeholder under the lock
//! before any container is created.

use crate::config::AgentConfig;
use fx_adapters::{ContainerDaemon, ContainerError, ExecSpec};
use fx_core::{Clock, ContainerSlot, RuntimeKind, SlotId, SlotState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// How a job hands its slot back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Normal completion; the slot may be reused after cleanup.
    Clean,
    /// The job was killed or left the container suspect; destroy it.
    Dirty,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no {runtime} slot available within deadline")]
    Exhausted { runtime: RuntimeKind },
    #[error("pool is draining")]
    Draining,
    #[error("slot provisioning failed: {0}")]
    Provision(#[source] ContainerError),
}

impl PoolError {
    /// Retryable errors leave the message on the queue for redelivery.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::Draining)
    }
}

/// Exclusive handle to a rented slot.
///
/// Carries the generation observed at rent time; a release with a stale
/// generation destroys the slot instead of corrupting the pool.
#[derive(Debug, Clone)]
pub struct RentedSlot {
    pub slot_id: SlotId,
    pub container_id: String,
    pub runtime: RuntimeKind,
    pub generation: u64,
    workspace_path: Option<String>,
}

impl RentedSlot {
    /// Record the job's in-container workspace so release can clean it.
    pub fn set_workspace(&mut self, path: impl Into<String>) {
        self.workspace_path = Some(path.into());
    }

    pub fn workspace(&self) -> Option<&str> {
        self.workspace_path.as_deref()
    }
}

/// Observable per-runtime population, for tests and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolCounts {
    pub idle: usize,
    pub rented: usize,
    pub provisioning: usize,
}

impl PoolCounts {
    pub fn population(&self) -> usize {
        self.idle + self.rented + self.provisioning
    }
}

#[derive(Default)]
struct PoolState {
    slots: Vec<ContainerSlot>,
    draining: bool,
}

/// Per-runtime bounded pool of warm containers.
pub struct WarmPool<C: Clock> {
    daemon: Arc<dyn ContainerDaemon>,
    config: Arc<AgentConfig>,
    clock: C,
    state: Mutex<PoolState>,
    /// Signalled when a slot becomes idle (wakes one parked renter).
    returned: Notify,
    /// Signalled when the population drops (wakes refill actors).
    refill_kick: Notify,
}

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const PROVISION_RETRY_BACKOFF: Duration = Duration::from_millis(500);

impl<C: Clock> WarmPool<C> {
    pub fn new(daemon: Arc<dyn ContainerDaemon>, config: Arc<AgentConfig>, clock: C) -> Arc<Self> {
        Arc::new(Self {
            daemon,
            config,
            clock,
            state: Mutex::new(PoolState::default()),
            returned: Notify::new(),
            refill_kick: Notify::new(),
        })
    }

    /// Spawn the refill actor for each pooled runtime plus the idle sweep.
    pub fn spawn_actors(
        self: &Arc<Self>,
        token: &CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        if !self.config.warm_pool.enabled {
            return handles;
        }
        for runtime in RuntimeKind::ALL {
            if self.config.pool_size(runtime) == 0 {
                continue;
            }
            let pool = self.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move { pool.run_refill(runtime, token).await }));
        }
        let pool = self.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move { pool.run_sweep(token).await }));
        handles
    }

    fn capacity(&self, runtime: RuntimeKind) -> usize {
        if self.config.warm_pool.enabled {
            self.config.pool_size(runtime)
        } else {
            // Pooling disabled: every job gets a fresh container, bounded
            // only by the dispatcher's in-flight cap.
            usize::MAX
        }
    }

    /// Rent a slot, provisioning fresh when below capacity, otherwise
    /// waiting until one is returned or `deadline` elapses.
    pub async fn rent(
        &self,
        runtime: RuntimeKind,
        deadline: Duration,
    ) -> Result<RentedSlot, PoolError> {
        let start = tokio::time::Instant::now();
        loop {
            enum Plan {
                Taken(RentedSlot),
                Provision(SlotId),
                Wait,
            }

            let plan = {
                let mut state = self.state.lock();
                if state.draining {
                    return Err(PoolError::Draining);
                }
                if let Some(slot) = state
                    .slots
                    .iter_mut()
                    .find(|s| s.runtime == runtime && s.state == SlotState::Idle)
                {
                    Plan::Taken(mark_rented(slot))
                } else if population(&state.slots, runtime) < self.capacity(runtime) {
                    let slot = ContainerSlot::new(runtime, "", self.clock.epoch_ms());
                    let id = slot.id.clone();
                    state.slots.push(slot);
                    Plan::Provision(id)
                } else {
                    Plan::Wait
                }
            };

            match plan {
                Plan::Taken(rented) => {
                    tracing::debug!(slot = %rented.slot_id, %runtime, "rented warm slot");
                    return Ok(rented);
                }
                Plan::Provision(slot_id) => return self.provision_rented(runtime, &slot_id).await,
                Plan::Wait => {
                    let Some(remaining) = deadline.checked_sub(start.elapsed()) else {
                        return Err(PoolError::Exhausted { runtime });
                    };
                    if tokio::time::timeout(remaining, self.returned.notified()).await.is_err() {
                        return Err(PoolError::Exhausted { runtime });
                    }
                }
            }
        }
    }

    /// Hand a slot back. Stale generations and dirty/worn slots are
    /// destroyed; clean returns are scrubbed and probed before going Idle.
    pub async fn release(&self, rented: RentedSlot, disposition: Disposition) {
        let now_ms = self.clock.epoch_ms();
        enum Next {
            Destroy,
            Scrub,
            Ignore,
        }

        let next = {
            let mut state = self.state.lock();
            match state.slots.iter_mut().find(|s| s.id == rented.slot_id) {
                None => {
                    tracing::warn!(slot = %rented.slot_id, "release of unknown slot ignored");
                    Next::Ignore
                }
                Some(slot) => {
                    if slot.generation != rented.generation || slot.state != SlotState::Rented {
                        tracing::warn!(
                            slot = %rented.slot_id,
                            held_generation = rented.generation,
                            slot_generation = slot.generation,
                            state = %slot.state,
                            "stale slot return, destroying"
                        );
                        slot.state = SlotState::Draining;
                        Next::Destroy
                    } else if disposition == Disposition::Dirty
                        || !self.config.warm_pool.enabled
                        || slot.worn_out(
                            now_ms,
                            self.config.warm_pool.max_uses,
                            self.config.warm_pool.max_age_secs,
                        )
                    {
                        slot.state = SlotState::Draining;
                        Next::Destroy
                    } else {
                        // Slot stays Rented while we scrub: still exclusively ours.
                        Next::Scrub
                    }
                }
            }
        };

        match next {
            Next::Ignore => {}
            Next::Destroy => {
                self.destroy(&rented.slot_id, &rented.container_id).await;
                self.refill_kick.notify_one();
            }
            Next::Scrub => {
                if self.scrub_and_probe(&rented).await {
                    {
                        let mut state = self.state.lock();
                        if let Some(slot) =
                            state.slots.iter_mut().find(|s| s.id == rented.slot_id)
                        {
                            slot.state = SlotState::Idle;
                            slot.last_health_check_ms = now_ms;
                        }
                    }
                    self.returned.notify_one();
                } else {
                    tracing::warn!(slot = %rented.slot_id, "cleanup failed, destroying slot");
                    {
                        let mut state = self.state.lock();
                        if let Some(slot) =
                            state.slots.iter_mut().find(|s| s.id == rented.slot_id)
                        {
                            slot.state = SlotState::Draining;
                        }
                    }
                    self.destroy(&rented.slot_id, &rented.container_id).await;
                    self.refill_kick.notify_one();
                }
            }
        }
    }

    /// Move to draining: renters fail fast, all slots are destroyed.
    pub async fn shutdown(&self) {
        let slots: Vec<(SlotId, String)> = {
            let mut state = self.state.lock();
            state.draining = true;
            for slot in state.slots.iter_mut() {
                slot.state = SlotState::Draining;
            }
            state.slots.iter().map(|s| (s.id.clone(), s.container_id.clone())).collect()
        };
        self.returned.notify_waiters();
        for (slot_id, container_id) in slots {
            self.destroy(&slot_id, &container_id).await;
        }
        tracing::info!("warm pool drained");
    }

    pub fn counts(&self, runtime: RuntimeKind) -> PoolCounts {
        let state = self.state.lock();
        let mut counts = PoolCounts::default();
        for slot in state.slots.iter().filter(|s| s.runtime == runtime) {
            match slot.state {
                SlotState::Idle => counts.idle += 1,
                SlotState::Rented => counts.rented += 1,
                SlotState::Provisioning => counts.provisioning += 1,
                _ => {}
            }
        }
        counts
    }

    /// Provision the reserved placeholder and hand it straight to the renter.
    async fn provision_rented(
        &self,
        runtime: RuntimeKind,
        slot_id: &SlotId,
    ) -> Result<RentedSlot, PoolError> {
        match self.provision(runtime, slot_id).await {
            Ok(()) => {
                let mut state = self.state.lock();
                match state.slots.iter_mut().find(|s| s.id == *slot_id) {
                    // Shutdown raced the provision; the drain already owns teardown.
                    None => Err(PoolError::Draining),
                    Some(slot) if slot.state != SlotState::Provisioning => Err(PoolError::Draining),
                    Some(slot) => Ok(mark_rented(slot)),
                }
            }
            Err(e) => {
                self.discard_placeholder(slot_id).await;
                self.refill_kick.notify_one();
                Err(PoolError::Provision(e))
            }
        }
    }

    /// Create and start the container for a reserved Provisioning slot.
    async fn provision(&self, runtime: RuntimeKind, slot_id: &SlotId) -> Result<(), ContainerError> {
        let image = self.config.image_for(runtime);
        let name = format!("fx-{}-{}", runtime, slot_id.suffix());
        let container_id = self.daemon.create(&image, &name).await?;
        let registered = {
            let mut state = self.state.lock();
            match state.slots.iter_mut().find(|s| s.id == *slot_id) {
                Some(slot) => {
                    slot.container_id = container_id.clone();
                    true
                }
                None => false,
            }
        };
        if !registered {
            // Shutdown discarded the placeholder mid-create; don't leak
            // the container.
            let _ = self.daemon.remove(&container_id).await;
            return Err(ContainerError::Failed("slot discarded during provisioning".into()));
        }
        self.daemon.start(&container_id).await?;
        tracing::info!(slot = %slot_id, container = %container_id, %runtime, "provisioned container");
        Ok(())
    }

    /// Drop a placeholder whose provisioning failed, removing any container
    /// that was created before the failure.
    async fn discard_placeholder(&self, slot_id: &SlotId) {
        let container_id = {
            let state = self.state.lock();
            state.slots.iter().find(|s| s.id == *slot_id).map(|s| s.container_id.clone())
        };
        if let Some(container_id) = container_id {
            self.destroy(slot_id, &container_id).await;
        }
    }

    /// Remove the container (best effort) and forget the slot.
    async fn destroy(&self, slot_id: &SlotId, container_id: &str) {
        if !container_id.is_empty() {
            if let Err(e) = self.daemon.remove(container_id).await {
                tracing::warn!(container = container_id, error = %e, "container remove failed");
            }
        }
        let mut state = self.state.lock();
        state.slots.retain(|s| s.id != *slot_id);
    }

    /// Delete the job's workspace and probe liveness before reuse.
    async fn scrub_and_probe(&self, rented: &RentedSlot) -> bool {
        if let Some(workspace) = rented.workspace() {
            let spec = ExecSpec::new(["rm", "-rf", workspace]).hard_timeout(CLEANUP_TIMEOUT);
            match self.daemon.exec(&rented.container_id, spec).await {
                Ok(result) if result.exit_code == Some(0) => {}
                Ok(result) => {
                    tracing::warn!(
                        container = %rented.container_id,
                        exit = ?result.exit_code,
                        "workspace cleanup exited non-zero"
                    );
                    return false;
                }
                Err(e) => {
                    tracing::warn!(container = %rented.container_id, error = %e, "workspace cleanup failed");
                    return false;
                }
            }
        }
        self.probe(&rented.container_id).await
    }

    /// Fast liveness check: a trivial exec must succeed promptly.
    async fn probe(&self, container_id: &str) -> bool {
        let spec = ExecSpec::new(["sh", "-c", "true"]).hard_timeout(PROBE_TIMEOUT);
        matches!(self.daemon.exec(container_id, spec).await, Ok(r) if r.exit_code == Some(0))
    }

    /// Background actor: keep `runtime`'s population at capacity.
    async fn run_refill(self: Arc<Self>, runtime: RuntimeKind, token: CancellationToken) {
        loop {
            while !token.is_cancelled() {
                let slot_id = {
                    let mut state = self.state.lock();
                    if state.draining {
                        return;
                    }
                    if population(&state.slots, runtime) >= self.capacity(runtime) {
                        break;
                    }
                    let slot = ContainerSlot::new(runtime, "", self.clock.epoch_ms());
                    let id = slot.id.clone();
                    state.slots.push(slot);
                    id
                };

                match self.provision(runtime, &slot_id).await {
                    Ok(()) => {
                        let now_ms = self.clock.epoch_ms();
                        let mut ready = false;
                        {
                            let mut state = self.state.lock();
                            if let Some(slot) = state.slots.iter_mut().find(|s| s.id == slot_id) {
                                if slot.state == SlotState::Provisioning {
                                    slot.state = SlotState::Idle;
                                    slot.last_health_check_ms = now_ms;
                                    ready = true;
                                }
                            }
                        }
                        if ready {
                            self.returned.notify_one();
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%runtime, error = %e, "pool refill provisioning failed");
                        self.discard_placeholder(&slot_id).await;
                        tokio::time::sleep(PROVISION_RETRY_BACKOFF).await;
                    }
                }
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = self.refill_kick.notified() => {}
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
        }
    }

    /// Background actor: periodically re-validate idle slots.
    async fn run_sweep(self: Arc<Self>, token: CancellationToken) {
        let interval = Duration::from_secs(self.config.warm_pool.health_check_secs.max(1));
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }

            let idle: Vec<(SlotId, String)> = {
                let state = self.state.lock();
                if state.draining {
                    return;
                }
                state
                    .slots
                    .iter()
                    .filter(|s| s.state == SlotState::Idle)
                    .map(|s| (s.id.clone(), s.container_id.clone()))
                    .collect()
            };

            let now_ms = self.clock.epoch_ms();
            for (slot_id, container_id) in idle {
                let worn = {
                    let state = self.state.lock();
                    state.slots.iter().find(|s| s.id == slot_id).is_some_and(|s| {
                        s.state == SlotState::Idle
                            && s.worn_out(
                                now_ms,
                                self.config.warm_pool.max_uses,
                                self.config.warm_pool.max_age_secs,
                            )
                    })
                };
                let healthy = !worn && self.probe(&container_id).await;

                let mut destroy = false;
                {
                    let mut state = self.state.lock();
                    if let Some(slot) = state.slots.iter_mut().find(|s| s.id == slot_id) {
                        // A renter may have taken the slot mid-probe; leave it alone.
                        if slot.state == SlotState::Idle {
                            if healthy {
                                slot.last_health_check_ms = now_ms;
                            } else {
                                slot.state = SlotState::Draining;
                                destroy = true;
                            }
                        }
                    }
                }
                if destroy {
                    tracing::warn!(slot = %slot_id, container = %container_id, "idle slot failed sweep, destroying");
                    self.destroy(&slot_id, &container_id).await;
                    self.refill_kick.notify_one();
                }
            }
        }
    }
}

fn population(slots: &[ContainerSlot], runtime: RuntimeKind) -> usize {
    slots
        .iter()
        .filter(|s| s.runtime == runtime && s.state.counts_toward_population())
        .count()
}

fn mark_rented(slot: &mut ContainerSlot) -> RentedSlot {
    slot.state = SlotState::Rented;
    slot.generation += 1;
    slot.use_count += 1;
    RentedSlot {
        slot_id: slot.id.clone(),
        container_id: slot.container_id.clone(),
        runtime: slot.runtime,
        generation: slot.generation,
        workspace_path: None,
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "pool_prop_tests.rs"]
mod prop_tests;
