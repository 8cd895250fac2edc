//! Clock & named-timer service.
//!
//! The controller never reads the wall clock directly. Everything goes through
//! a [`Clock`] so tests can inject a fake one and drive scheduling deterministically,
//! and through a [`TimerService`] so "replace the existing `ANNOUNCE` timer" is a single
//! call rather than hand-rolled bookkeeping scattered through the FSM.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Tolerance used both to decide "close enough to fire now" and to compare a timer's
/// actual firing instant against its intended target.
pub const ANNOUNCEMENT_WINDOW: Duration = Duration::from_millis(500);

/// Any single scheduled delay is truncated to this ceiling; long-horizon expirations
/// re-arm periodically rather than relying on a single multi-day timer.
pub const MAX_TIMER_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Source of the current instant.
///
/// Production code uses [`SystemClock`]; tests use a fake that can be advanced
/// under the caller's control (typically paired with `tokio::time::pause`).
pub trait Clock: Send + Sync + 'static {
    /// The current instant, per this clock's notion of "now".
    fn now(&self) -> Instant;
}

/// The real wall clock, backed by `tokio::time::Instant::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Name of a controller timer slot. At most one timer is active per name; scheduling
/// a timer under a name already in use cancels the previous one first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerName {
    /// Drives the pre-expiry (or post-deletion) announcement.
    Announce,
    /// Drives the deletion command.
    Delete,
    /// Drives the `DELETED`-state confirmation timeout.
    StateTimeout,
}

/// A named, cancellable, replaceable single-shot timer service for one controller.
///
/// Delivery is modeled as a message sent back to the owning controller's event loop
/// rather than a callback, so the controller still observes one event at a time.
pub struct TimerService<M> {
    clock: Arc<dyn Clock>,
    handles: HashMap<TimerName, tokio::task::JoinHandle<()>>,
    sender: mpsc::UnboundedSender<M>,
}

impl<M: Send + 'static> TimerService<M> {
    /// Create a timer service that delivers fired timers onto `sender`.
    pub fn new(clock: Arc<dyn Clock>, sender: mpsc::UnboundedSender<M>) -> Self {
        Self {
            clock,
            handles: HashMap::new(),
            sender,
        }
    }

    /// Current instant according to the underlying clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// A clone of the sender this service delivers fired timers on, for
    /// self-messaging events that aren't timer-driven.
    pub fn self_sender(&self) -> mpsc::UnboundedSender<M> {
        self.sender.clone()
    }

    /// Schedule `message` to be delivered after `delay`, truncated to [`MAX_TIMER_DELAY`].
    ///
    /// Replaces any timer previously scheduled under `name`; the prior one is
    /// guaranteed not to deliver after this call returns.
    pub fn schedule(&mut self, name: TimerName, message: M, delay: Duration) {
        self.cancel(name);
        let delay = delay.min(MAX_TIMER_DELAY);
        let sender = self.sender.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(message);
        });
        self.handles.insert(name, handle);
    }

    /// Cancel the timer under `name`, if any. Guarantees no subsequent delivery
    /// from the cancelled timer.
    pub fn cancel(&mut self, name: TimerName) {
        if let Some(handle) = self.handles.remove(&name) {
            handle.abort();
        }
    }

    /// Cancel every active timer. Used when the controller stops.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

impl<M> Drop for TimerService<M> {
    fn drop(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}
