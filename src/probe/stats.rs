use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated from interception listeners.
///
/// Listeners run on target threads, so every counter is a lock-free atomic.
#[derive(Debug, Default)]
pub struct SessionStatistics {
    invocations: AtomicU64,
    fragments: AtomicU64,
    failed_fields: AtomicU64,
    malformed_names: AtomicU64,
    events: AtomicU64,
}

/// A point-in-time copy of `SessionStatistics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub invocations: u64,
    pub fragments: u64,
    pub failed_fields: u64,
    pub malformed_names: u64,
    pub events: u64,
}

impl SessionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fragment(&self) {
        self.fragments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_field(&self) {
        self.failed_fields.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_name(&self) {
        self.malformed_names.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            fragments: self.fragments.load(Ordering::Relaxed),
            failed_fields: self.failed_fields.load(Ordering::Relaxed),
            malformed_names: self.malformed_names.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
        }
    }

    /// Resets all statistics to zero.
    pub fn reset(&self) {
        self.invocations.store(0, Ordering::Relaxed);
        self.fragments.store(0, Ordering::Relaxed);
        self.failed_fields.store(0, Ordering::Relaxed);
        self.malformed_names.store(0, Ordering::Relaxed);
        self.events.store(0, Ordering::Relaxed);
    }
}
