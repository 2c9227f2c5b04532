//! Periodic polling against Cruise Control
//!
//! While a resource sits in a waiting state (PendingProposal, Rebalancing)
//! the reconciler drives a per-resource timer loop here. The controller
//! keeps one registration per (namespace, name): starting a second loop for
//! the same key is refused, cancellation is addressed by key, and shutdown
//! cancels every active loop at once.

use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tracing::debug;

use crate::controller::error::Result;
use crate::controller::lock::ResourceKey;

/// Fixed tick period of the proposal and task-status polls
pub const REBALANCE_POLLING_TIMER_MS: u64 = 5_000;

/// Maximum consecutive transport errors within one polling sequence
pub const MAX_API_RETRIES: u32 = 5;

/// How a polling loop ended
#[derive(Debug, PartialEq)]
pub enum PollEnd<T> {
    /// The tick function completed the poll with a value
    Completed(T),
    /// The registration was cancelled (stop request or shutdown)
    Cancelled,
}

/// Active registration for one resource key; deregisters on drop
pub struct PollGuard<'a> {
    key: ResourceKey,
    controller: &'a PollController,
    cancel_rx: watch::Receiver<bool>,
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.controller.active.lock().expect("poller table poisoned");
        active.remove(&self.key);
    }
}

/// Table of active per-resource poll timers
pub struct PollController {
    period: Duration,
    active: Mutex<HashMap<ResourceKey, watch::Sender<bool>>>,
}

impl PollController {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Register a polling loop for `key`.
    ///
    /// Returns `None` when a loop is already registered for the key, so a
    /// duplicate start cannot create a second timer.
    pub fn try_begin(&self, key: &ResourceKey) -> Option<PollGuard<'_>> {
        let mut active = self.active.lock().expect("poller table poisoned");
        if active.contains_key(key) {
            return None;
        }
        let (tx, rx) = watch::channel(false);
        active.insert(key.clone(), tx);
        Some(PollGuard {
            key: key.clone(),
            controller: self,
            cancel_rx: rx,
        })
    }

    /// Whether a poll loop is registered for `key`
    pub fn is_active(&self, key: &ResourceKey) -> bool {
        self.active
            .lock()
            .expect("poller table poisoned")
            .contains_key(key)
    }

    /// Cancel the poll loop for `key`, if any
    pub fn cancel(&self, key: &ResourceKey) {
        let active = self.active.lock().expect("poller table poisoned");
        if let Some(tx) = active.get(key) {
            let _ = tx.send(true);
        }
    }

    /// Cancel every active poll loop (operator shutdown)
    pub fn shutdown(&self) {
        let active = self.active.lock().expect("poller table poisoned");
        for tx in active.values() {
            let _ = tx.send(true);
        }
    }

    /// Drive `tick` once per period under the given registration until it
    /// breaks with a value, errors, or the registration is cancelled.
    ///
    /// The first tick fires one full period after installation. The tick
    /// function is responsible for re-reading the resource and deciding
    /// whether to continue.
    pub async fn run<'a, T>(
        &self,
        guard: &mut PollGuard<'_>,
        mut tick: impl FnMut() -> Pin<Box<dyn Future<Output = Result<ControlFlow<T>>> + Send + 'a>>,
    ) -> Result<PollEnd<T>> {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        loop {
            tokio::select! {
                changed = guard.cancel_rx.changed() => {
                    // A closed channel means the controller is gone; treat it
                    // like cancellation.
                    if changed.is_err() || *guard.cancel_rx.borrow() {
                        debug!(key = %guard.key, "Polling cancelled");
                        return Ok(PollEnd::Cancelled);
                    }
                }
                _ = ticker.tick() => {
                    match tick().await? {
                        ControlFlow::Continue(()) => {}
                        ControlFlow::Break(value) => return Ok(PollEnd::Completed(value)),
                    }
                }
            }
        }
    }
}

impl Default for PollController {
    fn default() -> Self {
        Self::new(Duration::from_millis(REBALANCE_POLLING_TIMER_MS))
    }
}
