//! Per-city fetch bookkeeping.
//!
//! Each city moves through `Idle -> Fetching -> Cooling`. Periodic refreshes
//! only start from `Idle` or `Cooling`, so at most one of them is in flight
//! per city. Every fetch carries a sequence number from a single monotonic
//! counter, and a result is applied only if it is newer than the last one
//! applied for that city.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::model::normalize_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Fetching { seq: u64 },
    Cooling { since: DateTime<Utc> },
}

/// Handle for one outstanding fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    key: String,
    seq: u64,
}

impl FetchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[derive(Debug)]
struct Slot {
    state: FetchState,
    applied_seq: u64,
}

impl Default for Slot {
    fn default() -> Self {
        Self { state: FetchState::Idle, applied_seq: 0 }
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    slots: HashMap<String, Slot>,
}

impl Inner {
    fn issue(&mut self, key: String) -> FetchTicket {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.slots.entry(key.clone()).or_default().state = FetchState::Fetching { seq };
        FetchTicket { key, seq }
    }
}

#[derive(Debug, Default)]
pub struct FetchTracker {
    inner: Mutex<Inner>,
}

impl FetchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, name: &str) -> FetchState {
        self.inner
            .lock()
            .slots
            .get(&normalize_name(name))
            .map_or(FetchState::Idle, |slot| slot.state)
    }

    /// Start a fetch unless one is already running for this city.
    pub fn try_begin(&self, name: &str) -> Option<FetchTicket> {
        let key = normalize_name(name);
        let mut inner = self.inner.lock();
        if let Some(Slot { state: FetchState::Fetching { .. }, .. }) = inner.slots.get(&key) {
            return None;
        }
        Some(inner.issue(key))
    }

    /// Start a fetch even if another is running. The sequence check in
    /// [`FetchTracker::complete`] keeps the newer result.
    pub fn begin_forced(&self, name: &str) -> FetchTicket {
        self.inner.lock().issue(normalize_name(name))
    }

    /// Finish a successful fetch. `apply` runs under the tracker lock, and
    /// only if this ticket is newer than the last applied result for the
    /// city. Results for a forgotten city are dropped.
    pub fn complete<T, F: FnOnce() -> T>(
        &self,
        ticket: FetchTicket,
        at: DateTime<Utc>,
        apply: F,
    ) -> Option<T> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(&ticket.key)?;

        if slot.state == (FetchState::Fetching { seq: ticket.seq }) {
            slot.state = FetchState::Cooling { since: at };
        }

        if ticket.seq <= slot.applied_seq {
            return None;
        }
        slot.applied_seq = ticket.seq;
        Some(apply())
    }

    /// Record a fetch that happened before this process started.
    pub fn mark_cooling(&self, name: &str, since: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        let slot = inner.slots.entry(normalize_name(name)).or_default();
        if slot.state == FetchState::Idle {
            slot.state = FetchState::Cooling { since };
        }
    }

    /// Finish a failed fetch. The city becomes eligible again right away.
    pub fn fail(&self, ticket: FetchTicket) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.slots.get_mut(&ticket.key) {
            if slot.state == (FetchState::Fetching { seq: ticket.seq }) {
                slot.state = FetchState::Idle;
            }
        }
    }

    /// Drop all bookkeeping for a city that is no longer tracked.
    pub fn forget(&self, name: &str) {
        self.inner.lock().slots.remove(&normalize_name(name));
    }
}
