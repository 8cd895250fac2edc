//! Lifecycle counters shared across every controller a [`Supervisor`] spawns.
//!
//! [`Supervisor`]: crate::supervisor::Supervisor

use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle counters shared by every controller a [`Supervisor`] spawns.
///
/// Attached once per supervisor and cloned into each controller at spawn
/// time, the same way the reference crate's manager hands every subscription
/// task a shared `Arc<SubscriptionMetrics>`.
///
/// [`Supervisor`]: crate::supervisor::Supervisor
#[derive(Debug, Default)]
pub struct ControllerMetrics {
    announcements_published: AtomicU64,
    acks_succeeded: AtomicU64,
    acks_retried: AtomicU64,
    deletes_forwarded: AtomicU64,
    deletes_confirmed: AtomicU64,
}

impl ControllerMetrics {
    /// A fresh, zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_announcement_published(&self) {
        self.announcements_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ack_succeeded(&self) {
        self.acks_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ack_retried(&self) {
        self.acks_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete_forwarded(&self) {
        self.deletes_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete_confirmed(&self) {
        self.deletes_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of every counter.
    pub fn snapshot(&self) -> ControllerMetricsSnapshot {
        ControllerMetricsSnapshot {
            announcements_published: self.announcements_published.load(Ordering::Relaxed),
            acks_succeeded: self.acks_succeeded.load(Ordering::Relaxed),
            acks_retried: self.acks_retried.load(Ordering::Relaxed),
            deletes_forwarded: self.deletes_forwarded.load(Ordering::Relaxed),
            deletes_confirmed: self.deletes_confirmed.load(Ordering::Relaxed),
        }
    }
}

/// An immutable point-in-time read of [`ControllerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerMetricsSnapshot {
    /// Announcements published across all controllers.
    pub announcements_published: u64,
    /// Ack rounds that settled with `acknowledged = true`.
    pub acks_succeeded: u64,
    /// Ack rounds that required a backoff retry.
    pub acks_retried: u64,
    /// `DeleteExpiredSubject` commands forwarded (including resends).
    pub deletes_forwarded: u64,
    /// `SUBJECT_DELETED` confirmations observed.
    pub deletes_confirmed: u64,
}
