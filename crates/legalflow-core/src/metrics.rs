//! Process-wide atomic counters.
//!
//! Counters are bumped silently at the call site; [`Metrics::flush`] emits
//! all of them as one `info!` event, typically at the end of a CLI command.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    audits_run: AtomicU64,
    autofixes_applied: AtomicU64,
    history_writes: AtomicU64,
    history_write_failures: AtomicU64,
    builder_fallbacks: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub audits_run: u64,
    pub autofixes_applied: u64,
    pub history_writes: u64,
    pub history_write_failures: u64,
    pub builder_fallbacks: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            audits_run: AtomicU64::new(0),
            autofixes_applied: AtomicU64::new(0),
            history_writes: AtomicU64::new(0),
            history_write_failures: AtomicU64::new(0),
            builder_fallbacks: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_audits(&self) {
        Self::bump(&self.audits_run, "audits_run");
    }

    pub fn inc_autofixes(&self) {
        Self::bump(&self.autofixes_applied, "autofixes_applied");
    }

    pub fn inc_history_writes(&self) {
        Self::bump(&self.history_writes, "history_writes");
    }

    pub fn inc_history_write_failures(&self) {
        Self::bump(&self.history_write_failures, "history_write_failures");
    }

    pub fn inc_builder_fallbacks(&self) {
        Self::bump(&self.builder_fallbacks, "builder_fallbacks");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            audits_run: self.audits_run.load(Ordering::Relaxed),
            autofixes_applied: self.autofixes_applied.load(Ordering::Relaxed),
            history_writes: self.history_writes.load(Ordering::Relaxed),
            history_write_failures: self.history_write_failures.load(Ordering::Relaxed),
            builder_fallbacks: self.builder_fallbacks.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            audits_run = s.audits_run,
            autofixes_applied = s.autofixes_applied,
            history_writes = s.history_writes,
            history_write_failures = s.history_write_failures,
            builder_fallbacks = s.builder_fallbacks,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.audits_run,
            &self.autofixes_applied,
            &self.history_writes,
            &self.history_write_failures,
            &self.builder_fallbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
