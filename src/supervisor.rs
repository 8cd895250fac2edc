//! Spawns and tracks one controller per expiring subject.
//!
//! Mirrors the reference crate's subscription manager: a concurrent registry
//! keyed by subject, a `JoinSet` tracking the spawned controller tasks, a
//! health snapshot, and a bounded graceful shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;

use crate::aggregator::AnnouncementBus;
use crate::clock::Clock;
use crate::fsm::{Controller, ControllerEvent};
use crate::metrics::ControllerMetrics;
use crate::model::{ControllerConfig, PolicyId, Subject, SubjectId};
use crate::sink::CommandForwarder;

/// Health snapshot of a [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStatus {
    /// Controllers currently tracked (spawned, not yet stopped).
    pub active_controllers: usize,
    /// Controllers that have run to completion since this supervisor started.
    pub completed_controllers: usize,
    /// Supervisor uptime in seconds.
    pub uptime_seconds: u64,
}

impl HealthStatus {
    /// Always true today; kept as a method so callers don't need to know the
    /// field is currently unconditional.
    pub fn is_healthy(&self) -> bool {
        true
    }
}

/// Outcome of a bounded [`Supervisor::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownResult {
    /// Controllers tracked when shutdown began.
    pub active_controllers: usize,
    /// Controllers whose task finished before the timeout.
    pub stopped_count: usize,
    /// Whether every tracked controller finished within the timeout.
    pub completed_within_timeout: bool,
}

impl ShutdownResult {
    /// Whether shutdown fully drained the tracked controllers in time.
    pub fn is_success(&self) -> bool {
        self.completed_within_timeout
    }
}

struct Tracked {
    external_sender: mpsc::UnboundedSender<ControllerEvent>,
}

/// Owns the one-controller-per-subject contract: spawns, tracks, and can
/// stop every controller for this process.
///
/// Controllers are not persisted across restarts — on restart the owning
/// process re-derives the set of expiring subjects and respawns.
pub struct Supervisor {
    controllers: dashmap::DashMap<SubjectId, Tracked>,
    tasks: RwLock<JoinSet<SubjectId>>,
    completed: AtomicUsize,
    metrics: Arc<ControllerMetrics>,
    bus: Arc<dyn AnnouncementBus>,
    forwarder: Arc<dyn CommandForwarder>,
    clock: Arc<dyn Clock>,
    created_at: std::time::Instant,
}

impl Supervisor {
    /// Build a supervisor sharing `bus`, `forwarder`, and `clock` across every
    /// controller it spawns.
    pub fn new(bus: Arc<dyn AnnouncementBus>, forwarder: Arc<dyn CommandForwarder>, clock: Arc<dyn Clock>) -> Self {
        Self {
            controllers: dashmap::DashMap::new(),
            tasks: RwLock::new(JoinSet::new()),
            completed: AtomicUsize::new(0),
            metrics: Arc::new(ControllerMetrics::new()),
            bus,
            forwarder,
            clock,
            created_at: std::time::Instant::now(),
        }
    }

    /// Shared metrics counters, for exposing to an operator-facing endpoint.
    pub fn metrics(&self) -> Arc<ControllerMetrics> {
        self.metrics.clone()
    }

    /// Spawn a controller for `subject` under `policy_id`, replacing any
    /// controller already tracked for that subject id.
    pub async fn spawn(&self, policy_id: PolicyId, subject: Subject, config: ControllerConfig) -> SubjectId {
        let subject_id = subject.id.clone();
        self.stop(&subject_id);

        let controller = Controller::new(
            policy_id,
            subject,
            config,
            self.bus.clone(),
            self.forwarder.clone(),
            self.clock.clone(),
            self.metrics.clone(),
        );
        let external_sender = controller.external_sender();

        self.controllers.insert(subject_id.clone(), Tracked { external_sender });

        let task_subject_id = subject_id.clone();
        self.tasks.write().await.spawn(async move {
            controller.run().await;
            task_subject_id
        });
        subject_id
    }

    /// Deliver an externally observed event (`SUBJECT_DELETED`) to the
    /// controller tracked for `subject_id`, if any.
    pub fn notify_subject_deleted(&self, subject_id: &SubjectId) {
        if let Some(entry) = self.controllers.get(subject_id) {
            let _ = entry.external_sender.send(ControllerEvent::SubjectDeleted);
        }
    }

    /// Stop and untrack the controller for `subject_id`, if any is tracked.
    ///
    /// Dropping the tracked entry drops its event sender; the controller's
    /// task notices the closed channel on its next `recv` and exits.
    pub fn stop(&self, subject_id: &SubjectId) {
        self.controllers.remove(subject_id);
    }

    /// Number of controllers currently tracked.
    pub fn count(&self) -> usize {
        self.controllers.len()
    }

    /// Remove completed controller tasks from the tracker, returning how many
    /// were reaped.
    ///
    /// A finished task's subject id is only untracked if the entry currently
    /// held for it is the same one that task was running: its event sender
    /// must be closed. A respawn between the task finishing and this call
    /// replaces the tracked entry with a fresh sender, so the stale
    /// completion never evicts the new controller.
    pub async fn cleanup_completed(&self) -> usize {
        let mut tasks = self.tasks.write().await;
        let mut reaped = 0;
        while let Some(result) = tasks.try_join_next() {
            match result {
                Ok(subject_id) => {
                    let stale = self
                        .controllers
                        .get(&subject_id)
                        .map(|entry| entry.external_sender.is_closed())
                        .unwrap_or(false);
                    if stale {
                        self.controllers.remove(&subject_id);
                    }
                }
                Err(err) => {
                    if !err.is_cancelled() {
                        tracing::warn!(error = %err, "controller task ended abnormally");
                    }
                }
            }
            reaped += 1;
        }
        self.completed.fetch_add(reaped, Ordering::Relaxed);
        reaped
    }

    /// Current health snapshot.
    pub async fn health(&self) -> HealthStatus {
        self.cleanup_completed().await;
        HealthStatus {
            active_controllers: self.controllers.len(),
            completed_controllers: self.completed.load(Ordering::Relaxed),
            uptime_seconds: self.created_at.elapsed().as_secs(),
        }
    }

    /// Stop every tracked controller and wait up to `timeout` for their tasks
    /// to finish.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownResult {
        let active_controllers = self.controllers.len();
        self.controllers.clear();

        let deadline = tokio::time::Instant::now() + timeout;
        let mut tasks = self.tasks.write().await;
        let mut stopped_count = 0;
        let mut completed_within_timeout = true;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                completed_within_timeout = tasks.is_empty();
                break;
            }
            match tokio::time::timeout(remaining, tasks.join_next()).await {
                Ok(Some(_)) => stopped_count += 1,
                Ok(None) => break,
                Err(_) => {
                    completed_within_timeout = false;
                    break;
                }
            }
        }

        ShutdownResult {
            active_controllers,
            stopped_count,
            completed_within_timeout,
        }
    }
}
