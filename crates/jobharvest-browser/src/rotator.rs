//! Identity rotation shared by concurrent fetches.
//!
//! The rotator hands out identities from a fixed pool. It advances to the
//! next slot every `rotation_frequency` calls, after `max_requests_per_session`
//! calls on a session, and whenever the identity in use is reported blocked.
//! All counters sit behind one lock so two fetches never disagree about which
//! slot is current.

use crate::error::{BrowserError, Result};
use crate::fingerprint::{BrowserProfile, Identity};
use jobharvest_core::IdentityConfig;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct RotatorState {
    cursor: usize,
    calls_on_identity: u64,
    session_requests: u64,
    rotations: u64,
    blocked_slots: HashSet<usize>,
}

/// Hands out client identities and tracks which ones have been blocked.
#[derive(Debug)]
pub struct IdentityRotator {
    pool: Vec<BrowserProfile>,
    rotation_frequency: u64,
    max_requests_per_session: u64,
    state: Mutex<RotatorState>,
}

impl IdentityRotator {
    /// Create a rotator over `pool`.
    ///
    /// A `rotation_frequency` of 0 is treated as 1. A
    /// `max_requests_per_session` of 0 disables session resets.
    pub fn new(
        pool: Vec<BrowserProfile>,
        rotation_frequency: u64,
        max_requests_per_session: u64,
    ) -> Result<Self> {
        if pool.is_empty() {
            return Err(BrowserError::EmptyIdentityPool);
        }
        Ok(Self {
            pool,
            rotation_frequency: rotation_frequency.max(1),
            max_requests_per_session,
            state: Mutex::new(RotatorState::default()),
        })
    }

    /// Build the default pool for the configured languages.
    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        Self::new(
            crate::fingerprint::identity_pool(&config.languages),
            config.rotation_frequency,
            config.max_requests_per_session,
        )
    }

    fn lock(&self) -> MutexGuard<'_, RotatorState> {
        // Counters stay consistent under every early return, so a poisoned
        // lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance(&self, state: &mut RotatorState) {
        state.cursor = (state.cursor + 1) % self.pool.len();
        state.calls_on_identity = 0;
        state.rotations += 1;
    }

    /// Identity for the next request. Wraps around the pool indefinitely.
    pub fn next_identity(&self) -> Identity {
        let mut state = self.lock();

        if self.max_requests_per_session > 0
            && state.session_requests >= self.max_requests_per_session
        {
            self.advance(&mut state);
            state.session_requests = 0;
            tracing::info!(
                slot = state.cursor,
                "Session request ceiling reached, resetting identity"
            );
        } else if state.calls_on_identity >= self.rotation_frequency {
            self.advance(&mut state);
            tracing::debug!(slot = state.cursor, "Rotated identity");
        }

        state.calls_on_identity += 1;
        state.session_requests += 1;
        let slot = state.cursor;
        Identity::from_profile(slot, &self.pool[slot])
    }

    /// Advance to the next identity immediately.
    pub fn rotate_now(&self) {
        let mut state = self.lock();
        self.advance(&mut state);
    }

    /// Record that `identity` was refused by the server.
    ///
    /// Rotates away from it if it is still current. Returns `true` once every
    /// identity in the pool has been blocked without a success in between.
    pub fn report_blocked(&self, identity: &Identity) -> bool {
        self.report_blocked_slot(identity.slot)
    }

    /// Slot form of [`report_blocked`](Self::report_blocked). Reporting the
    /// same slot twice counts it once.
    pub fn report_blocked_slot(&self, slot: usize) -> bool {
        let mut state = self.lock();
        state.blocked_slots.insert(slot);

        if slot == state.cursor {
            self.advance(&mut state);
            tracing::warn!(
                blocked_slot = slot,
                profile = %self.pool[slot % self.pool.len()].name,
                next_slot = state.cursor,
                "Identity blocked, rotating"
            );
        }

        let exhausted = state.blocked_slots.len() >= self.pool.len();
        if exhausted {
            tracing::error!(pool_size = self.pool.len(), "Every identity has been blocked");
        }
        exhausted
    }

    /// Record a successful fetch. Clears the blocked-identity tally.
    pub fn report_success(&self) {
        self.lock().blocked_slots.clear();
    }

    /// Whether every identity is currently considered blocked.
    pub fn is_exhausted(&self) -> bool {
        self.lock().blocked_slots.len() >= self.pool.len()
    }

    pub fn current_slot(&self) -> usize {
        self.lock().cursor
    }

    /// Number of rotations so far, for any reason.
    pub fn rotations(&self) -> u64 {
        self.lock().rotations
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }
}
