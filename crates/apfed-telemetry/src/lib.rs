//! Structured logging setup and federation-specific counters. Every other
//! crate logs through `tracing` directly with a `target:` naming its
//! subsystem (`apfed.router`, `apfed.sig`, `apfed.inbox`, `apfed.outbox`,
//! …); this crate only configures the global subscriber and aggregates the
//! counters the engine and outbox emit.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global `tracing` subscriber. `json` selects structured
/// JSON output (for production log shipping) over human-readable output
/// (for local development); both honor `RUST_LOG`.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Counters for the inbox pipeline's dispatch outcomes.
#[derive(Default)]
pub struct InboxMetrics {
    pub received: AtomicU64,
    pub deduplicated: AtomicU64,
    pub unauthenticated: AtomicU64,
    pub dispatched: AtomicU64,
    pub listener_errors: AtomicU64,
}

impl InboxMetrics {
    pub fn snapshot(&self) -> InboxMetricsSnapshot {
        InboxMetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            unauthenticated: self.unauthenticated.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            listener_errors: self.listener_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboxMetricsSnapshot {
    pub received: u64,
    pub deduplicated: u64,
    pub unauthenticated: u64,
    pub dispatched: u64,
    pub listener_errors: u64,
}

/// Counters for the outbox delivery pipeline.
#[derive(Default)]
pub struct OutboxMetrics {
    pub enqueued: AtomicU64,
    pub delivered: AtomicU64,
    pub retried: AtomicU64,
    pub permanently_failed: AtomicU64,
}

impl OutboxMetrics {
    pub fn snapshot(&self) -> OutboxMetricsSnapshot {
        OutboxMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            permanently_failed: self.permanently_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboxMetricsSnapshot {
    pub enqueued: u64,
    pub delivered: u64,
    pub retried: u64,
    pub permanently_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_metrics_snapshot_reflects_counts() {
        let metrics = InboxMetrics::default();
        metrics.received.fetch_add(3, Ordering::Relaxed);
        metrics.dispatched.fetch_add(2, Ordering::Relaxed);
        metrics.deduplicated.fetch_add(1, Ordering::Relaxed);
        let snap = metrics.snapshot();
        assert_eq!(snap.received, 3);
        assert_eq!(snap.dispatched, 2);
        assert_eq!(snap.deduplicated, 1);
    }

    #[test]
    fn outbox_metrics_snapshot_reflects_counts() {
        let metrics = OutboxMetrics::default();
        metrics.enqueued.fetch_add(5, Ordering::Relaxed);
        metrics.retried.fetch_add(2, Ordering::Relaxed);
        let snap = metrics.snapshot();
        assert_eq!(snap.enqueued, 5);
        assert_eq!(snap.retried, 2);
        assert_eq!(snap.delivered, 0);
    }
}
