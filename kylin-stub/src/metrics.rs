//! Connection and command counters for the stub server.
//!
//! Atomic accumulators updated from connection tasks; `snapshot()` copies
//! them into a plain struct. `Relaxed` ordering is enough since no two
//! counters are read as a consistent pair.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the stub server counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StubStats {
    /// Connections accepted since start.
    pub accepted: u64,
    /// Connections currently open.
    pub active: u64,
    /// Commands dispatched, including failed ones.
    pub commands: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Metrics {
    accepted: AtomicU64,
    active: AtomicU64,
    commands: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Metrics::default()
    }

    pub(crate) fn connection_opened(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        // Saturate instead of wrapping if a close is ever double-counted.
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
    }

    pub(crate) fn command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StubStats {
        StubStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
        }
    }
}
