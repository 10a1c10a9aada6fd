//! Global atomic counters for ARM Portal observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a CLI command exits).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters, no allocation or locking.
pub struct Metrics {
    requests_handled: AtomicU64,
    requests_failed: AtomicU64,
    pull_requests_opened: AtomicU64,
    events_dispatched: AtomicU64,
    event_handler_failures: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            requests_handled: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            pull_requests_opened: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            event_handler_failures: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    pub fn inc_requests_handled(&self) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "requests_handled", "counter incremented");
    }

    pub fn inc_requests_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "requests_failed", "counter incremented");
    }

    pub fn inc_pull_requests_opened(&self) {
        self.pull_requests_opened.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "pull_requests_opened", "counter incremented");
    }

    pub fn inc_events_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_event_handler_failures(&self) {
        self.event_handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            requests_handled = self.requests_handled(),
            requests_failed = self.requests_failed(),
            pull_requests_opened = self.pull_requests_opened(),
            events_dispatched = self.events_dispatched(),
            event_handler_failures = self.event_handler_failures(),
            cache_hits = self.cache_hits(),
            cache_misses = self.cache_misses(),
        );
    }

    pub fn requests_handled(&self) -> u64 {
        self.requests_handled.load(Ordering::Relaxed)
    }

    pub fn requests_failed(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    pub fn pull_requests_opened(&self) -> u64 {
        self.pull_requests_opened.load(Ordering::Relaxed)
    }

    pub fn events_dispatched(&self) -> u64 {
        self.events_dispatched.load(Ordering::Relaxed)
    }

    pub fn event_handler_failures(&self) -> u64 {
        self.event_handler_failures.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.requests_handled,
            &self.requests_failed,
            &self.pull_requests_opened,
            &self.events_dispatched,
            &self.event_handler_failures,
            &self.cache_hits,
            &self.cache_misses,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
