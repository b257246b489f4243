//! Global atomic counters for grading observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a grading session ends).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters: no allocations, no locking.
pub struct Metrics {
    answers_graded: AtomicU64,
    runs_started: AtomicU64,
    runs_timed_out: AtomicU64,
    uncaught_consumed: AtomicU64,
    environments_acquired: AtomicU64,
    environments_released: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            answers_graded: AtomicU64::new(0),
            runs_started: AtomicU64::new(0),
            runs_timed_out: AtomicU64::new(0),
            uncaught_consumed: AtomicU64::new(0),
            environments_acquired: AtomicU64::new(0),
            environments_released: AtomicU64::new(0),
        }
    }

    pub fn inc_answers_graded(&self) {
        self.answers_graded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "answers_graded", "counter incremented");
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_started", "counter incremented");
    }

    pub fn inc_runs_timed_out(&self) {
        self.runs_timed_out.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_timed_out", "counter incremented");
    }

    pub fn inc_uncaught_consumed(&self) {
        self.uncaught_consumed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "uncaught_consumed", "counter incremented");
    }

    pub fn inc_environments_acquired(&self) {
        self.environments_acquired.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "environments_acquired", "counter incremented");
    }

    pub fn inc_environments_released(&self) {
        self.environments_released.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "environments_released", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            answers_graded = self.answers_graded(),
            runs_started = self.runs_started(),
            runs_timed_out = self.runs_timed_out(),
            uncaught_consumed = self.uncaught_consumed(),
            environments_acquired = self.environments_acquired(),
            environments_released = self.environments_released(),
        );
    }

    pub fn answers_graded(&self) -> u64 {
        self.answers_graded.load(Ordering::Relaxed)
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_timed_out(&self) -> u64 {
        self.runs_timed_out.load(Ordering::Relaxed)
    }

    pub fn uncaught_consumed(&self) -> u64 {
        self.uncaught_consumed.load(Ordering::Relaxed)
    }

    pub fn environments_acquired(&self) -> u64 {
        self.environments_acquired.load(Ordering::Relaxed)
    }

    pub fn environments_released(&self) -> u64 {
        self.environments_released.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.answers_graded.store(0, Ordering::Relaxed);
        self.runs_started.store(0, Ordering::Relaxed);
        self.runs_timed_out.store(0, Ordering::Relaxed);
        self.uncaught_consumed.store(0, Ordering::Relaxed);
        self.environments_acquired.store(0, Ordering::Relaxed);
        self.environments_released.store(0, Ordering::Relaxed);
    }
}
