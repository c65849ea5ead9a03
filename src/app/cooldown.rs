// MedScan - app/cooldown.rs
//
// Persisted admission control. After every terminal session the guard is
// armed for a fixed window; scan-initiating actions are refused until the
// live counter reaches zero.
//
// The deadline (epoch ms) is written to the durable store on every arm and
// read back once at startup. The reported remaining time is the lower of the
// ticked counter and the wall-clock time left before the deadline, so a
// host that never ticks is still released on time. Storage failures never
// propagate: an unreadable store falls back to an in-memory counter, and a
// corrupt one is kept so the next arm rewrites it.

use crate::platform::clock::Clock;
use crate::platform::store::KeyValueStore;
use crate::util::constants::COOLDOWN_DEADLINE_KEY;
use crate::util::error::StorageError;
use std::sync::Arc;

/// Live cooldown counter backed by a persisted deadline.
#[derive(Debug)]
pub struct CooldownGuard {
    window_secs: u64,
    /// Whole seconds left, decremented by `tick`.
    remaining: u64,
    /// Deadline of the most recent arm, epoch ms.
    deadline_ms: Option<i64>,
    /// `None` once the store has proved unreadable.
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
}

impl CooldownGuard {
    /// Restore the counter from the persisted deadline.
    ///
    /// A deadline still in the future yields `ceil((deadline - now) / 1000)`
    /// seconds (never more than the window). A missing, malformed or
    /// unreadable deadline yields 0.
    pub fn recover_on_init(
        window_secs: u64,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut guard = Self {
            window_secs,
            remaining: 0,
            deadline_ms: None,
            store: None,
            clock,
        };

        match store.get(COOLDOWN_DEADLINE_KEY) {
            Ok(Some(raw)) => match raw.trim().parse::<i64>() {
                Ok(deadline) => {
                    guard.deadline_ms = Some(deadline);
                    guard.remaining = guard.seconds_until(deadline);
                    tracing::debug!(
                        remaining = guard.remaining,
                        "Cooldown recovered from store"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        value = %raw,
                        error = %e,
                        "Stored cooldown deadline is malformed, ignoring it"
                    );
                }
            },
            Ok(None) => {}
            Err(e @ StorageError::Corrupt { .. }) => {
                tracing::warn!(error = %e, "Cooldown store is corrupt, starting ready");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Cooldown persistence unavailable, using an in-memory counter"
                );
                return guard;
            }
        }

        guard.store = Some(store);
        guard
    }

    /// Seconds left before scan-initiating actions are admitted.
    pub fn remaining(&self) -> u64 {
        match self.deadline_ms {
            Some(deadline) => self.remaining.min(self.seconds_until(deadline)),
            None => self.remaining,
        }
    }

    /// True when no cooldown is pending.
    pub fn is_ready(&self) -> bool {
        self.remaining() == 0
    }

    /// Whether the deadline is being persisted.
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Start a new window: `deadline = now + window`, persisted, and the live
    /// counter reset to the full window.
    pub fn arm(&mut self) {
        let deadline = self.clock.now_millis() + (self.window_secs as i64) * 1_000;
        self.deadline_ms = Some(deadline);
        self.remaining = self.window_secs;

        if let Some(store) = &self.store {
            if let Err(e) = store.set(COOLDOWN_DEADLINE_KEY, &deadline.to_string()) {
                tracing::warn!(error = %e, "Failed to persist cooldown deadline");
            }
        }

        tracing::info!(window_secs = self.window_secs, "Cooldown armed");
    }

    /// One-second cadence step. Returns true while further ticks are needed.
    pub fn tick(&mut self) -> bool {
        self.remaining = self.remaining().saturating_sub(1);
        if self.remaining == 0 {
            tracing::debug!("Cooldown elapsed");
        }
        self.remaining > 0
    }

    /// Re-derive the counter from the deadline and the clock, e.g. after the
    /// process was suspended and ticks were missed. Never increases it.
    pub fn resync(&mut self) {
        self.remaining = self.remaining();
    }

    fn seconds_until(&self, deadline_ms: i64) -> u64 {
        let left_ms = deadline_ms - self.clock.now_millis();
        if left_ms <= 0 {
            return 0;
        }
        let secs = (left_ms as u64).div_ceil(1_000);
        secs.min(self.window_secs)
    }
}
