//! The controller FSM itself: one task per subject, processing exactly one
//! event at a time to completion.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::aggregator::{self, AnnouncementBus};
use crate::announcement::{build_announcement, CorrelationId};
use crate::clock::{Clock, TimerName, TimerService, ANNOUNCEMENT_WINDOW, MAX_TIMER_DELAY};
use crate::backoff::BackoffGenerator;
use crate::lifecycle_logging as log;
use crate::model::{AckLabel, ControllerConfig, PolicyId, Subject};
use crate::metrics::ControllerMetrics;
use crate::sink::{CommandForwarder, DeleteCommandHeaders, DeleteExpiredSubject};

use super::event::ControllerEvent;
use super::state::FsmState;

/// A single subject's expiry lifecycle controller.
///
/// Owns no shared mutable state; the only things it talks to externally are
/// the announcement bus, the command forwarder, and the clock, all injected
/// at construction. Runs to completion via [`Controller::run`], which drives
/// one event at a time until a transition stops it.
pub struct Controller {
    policy_id: PolicyId,
    subject: Subject,
    config: ControllerConfig,
    bus: Arc<dyn AnnouncementBus>,
    forwarder: Arc<dyn CommandForwarder>,
    metrics: Arc<ControllerMetrics>,
    timers: TimerService<ControllerEvent>,
    backoff_gen: BackoffGenerator,
    self_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,

    state: FsmState,
    next_backoff: Duration,
    deleted: bool,
    delete_at: Instant,
    acknowledged: bool,
    announcement_instant: Instant,
    stopped: bool,
}

impl Controller {
    /// Construct a controller and compute its initial state and scheduling,
    /// per the rules in the owning module's design notes.
    pub fn new(
        policy_id: PolicyId,
        subject: Subject,
        config: ControllerConfig,
        bus: Arc<dyn AnnouncementBus>,
        forwarder: Arc<dyn CommandForwarder>,
        clock: Arc<dyn Clock>,
        metrics: Arc<ControllerMetrics>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let timers = TimerService::new(clock, tx.clone());
        let now = timers.now();
        let next_backoff = config.backoff.min;
        let backoff_gen = config.backoff.generator();
        let delete_at = subject.expiry.unwrap_or(now);

        let mut controller = Self {
            policy_id,
            subject,
            config,
            bus,
            forwarder,
            metrics,
            timers,
            backoff_gen,
            self_tx: tx,
            events_rx: rx,
            state: FsmState::ToDelete,
            next_backoff,
            deleted: false,
            delete_at,
            acknowledged: false,
            announcement_instant: now,
            stopped: false,
        };
        controller.initialize(now);
        controller
    }

    fn initialize(&mut self, now: Instant) {
        let before_expiry = self.subject.announcement.as_ref().and_then(|p| p.before_expiry);
        if let Some(before_expiry) = before_expiry {
            self.state = FsmState::ToAnnounce;
            let announcement_instant = self.subject.expiry.map(|e| e - before_expiry).unwrap_or(now);
            self.announcement_instant = announcement_instant;
            self.schedule_announce(announcement_instant, now);
        } else {
            self.proceed_to_delete_scheduling(now);
        }
        log::log_controller_spawned(&self.policy_id, &self.subject.id, self.state);
    }

    /// Drive the controller until a transition stops it.
    pub async fn run(mut self) {
        while let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
            if self.stopped {
                break;
            }
        }
    }

    fn handle_event(&mut self, event: ControllerEvent) {
        let now = self.timers.now();
        match self.state {
            FsmState::ToAnnounce => self.handle_to_announce(event, now),
            FsmState::ToAcknowledge => self.handle_to_acknowledge(event, now),
            FsmState::ToDelete => self.handle_to_delete(event, now),
            FsmState::Deleted => self.handle_deleted(event, now),
        }
    }

    // ---- TO_ANNOUNCE ----

    fn handle_to_announce(&mut self, event: ControllerEvent, now: Instant) {
        match event {
            ControllerEvent::Announce => self.on_to_announce_announce(now),
            ControllerEvent::SubjectDeleted => self.on_to_announce_subject_deleted(now),
            other => self.log_unexpected(&other),
        }
    }

    fn on_to_announce_announce(&mut self, now: Instant) {
        self.timers.cancel(TimerName::Announce);

        let skip_early_check = self.deleted && self.when_deleted();
        if !skip_early_check {
            let remaining = self.announcement_instant.saturating_duration_since(now);
            if remaining >= ANNOUNCEMENT_WINDOW {
                self.schedule_announce(self.announcement_instant, now);
                return;
            }
        }

        self.publish_announcement(now);
        self.state = FsmState::ToAcknowledge;
    }

    fn on_to_announce_subject_deleted(&mut self, now: Instant) {
        self.stamp_delete_at(now);
        if !self.acknowledged && self.when_deleted() {
            self.timers.cancel(TimerName::Announce);
            self.announcement_instant = now;
            let _ = self.self_tx.send(ControllerEvent::Announce);
        }
    }

    // ---- TO_ACKNOWLEDGE ----

    fn handle_to_acknowledge(&mut self, event: ControllerEvent, now: Instant) {
        match event {
            ControllerEvent::AckOutcome(Ok(acks)) => {
                let requested = self.requested_ack_labels();
                if acks.requires_redelivery(&requested) {
                    self.retry_with_backoff(now);
                } else {
                    self.acknowledged = true;
                    self.metrics.record_ack_succeeded();
                    match acks.first_terminal_failure(&requested) {
                        Some(status) => log::log_terminal_ack_failure(&self.subject.id, status),
                        None => log::log_ack_settled(&self.subject.id, true),
                    }
                    self.proceed_to_delete_scheduling(now);
                }
            }
            ControllerEvent::AckOutcome(Err(err)) => {
                if err.requires_redelivery() {
                    self.retry_with_backoff(now);
                } else {
                    log::log_terminal_ack_failure(&self.subject.id, err.0);
                    self.proceed_to_delete_scheduling(now);
                }
            }
            ControllerEvent::Acknowledged => {
                self.acknowledged = true;
                self.metrics.record_ack_succeeded();
                log::log_ack_settled(&self.subject.id, true);
                self.proceed_to_delete_scheduling(now);
            }
            ControllerEvent::SubjectDeleted => self.stamp_delete_at(now),
            other => self.log_unexpected(&other),
        }
    }

    fn retry_with_backoff(&mut self, now: Instant) {
        self.next_backoff = self.backoff_gen.next(self.next_backoff);
        self.metrics.record_ack_retried();
        log::log_ack_retry_scheduled(&self.subject.id, self.next_backoff);

        let candidate = now + self.next_backoff;
        self.announcement_instant = candidate;

        if candidate < self.grace_boundary() {
            self.schedule_announce(candidate, now);
            self.state = FsmState::ToAnnounce;
        } else if self.deleted {
            log::log_grace_exhausted(&self.subject.id, true);
            self.stop();
        } else {
            self.forward_delete();
        }
    }

    // ---- TO_DELETE ----

    fn handle_to_delete(&mut self, event: ControllerEvent, now: Instant) {
        match event {
            ControllerEvent::Delete => self.proceed_to_delete_scheduling(now),
            ControllerEvent::SubjectDeleted => self.handle_external_delete_while_pending(now),
            other => self.log_unexpected(&other),
        }
    }

    // ---- DELETED ----

    fn handle_deleted(&mut self, event: ControllerEvent, now: Instant) {
        match event {
            ControllerEvent::SubjectDeleted => {
                self.timers.cancel(TimerName::StateTimeout);
                log::log_delete_confirmed(&self.subject.id);
                self.metrics.record_delete_confirmed();
                self.handle_external_delete_while_pending(now);
            }
            ControllerEvent::StateTimeout => self.on_deleted_state_timeout(now),
            other => self.log_unexpected(&other),
        }
    }

    fn on_deleted_state_timeout(&mut self, now: Instant) {
        if self.deleted {
            self.stop();
            return;
        }
        let retry_candidate = now + self.next_backoff;
        if self.acknowledged || !self.when_deleted() || retry_candidate >= self.grace_boundary() {
            log::log_grace_exhausted(&self.subject.id, false);
            self.stop();
        } else {
            self.forward_delete_resend();
        }
    }

    /// Shared by `TO_DELETE`/`SUBJECT_DELETED` and `DELETED`/`SUBJECT_DELETED`:
    /// both react identically to learning the subject is gone.
    fn handle_external_delete_while_pending(&mut self, now: Instant) {
        self.stamp_delete_at(now);
        if !self.acknowledged && self.when_deleted() {
            self.state = FsmState::ToAnnounce;
            self.announcement_instant = now;
            let _ = self.self_tx.send(ControllerEvent::Announce);
        } else {
            self.stop();
        }
    }

    /// Shared "proceed to delete scheduling" sub-protocol, used both for the
    /// controller's initial state and after the ack phase settles.
    fn proceed_to_delete_scheduling(&mut self, now: Instant) {
        if !self.deleted {
            match self.subject.expiry {
                Some(expiry) if expiry <= now => self.forward_delete(),
                Some(expiry) => {
                    let delay = (expiry + ANNOUNCEMENT_WINDOW).saturating_duration_since(now);
                    self.state = FsmState::ToDelete;
                    self.timers
                        .schedule(TimerName::Delete, ControllerEvent::Delete, delay.min(MAX_TIMER_DELAY));
                }
                None => self.forward_delete(),
            }
        } else if self.acknowledged {
            self.stop();
        } else {
            self.state = FsmState::Deleted;
            let _ = self.self_tx.send(ControllerEvent::SubjectDeleted);
        }
    }

    // ---- shared helpers ----

    fn schedule_announce(&mut self, instant: Instant, now: Instant) {
        let remaining = instant.saturating_duration_since(now);
        if remaining < ANNOUNCEMENT_WINDOW {
            let _ = self.self_tx.send(ControllerEvent::Announce);
        } else {
            self.timers
                .schedule(TimerName::Announce, ControllerEvent::Announce, remaining.min(MAX_TIMER_DELAY));
        }
    }

    fn publish_announcement(&mut self, now: Instant) {
        let _ = now;
        let requested_labels = self.requested_ack_labels();
        let timeout = self
            .subject
            .announcement
            .as_ref()
            .and_then(|p| p.requested_acks_timeout)
            .unwrap_or(self.config.max_timeout);
        let announcement = build_announcement(
            &self.policy_id,
            &self.subject,
            self.delete_at,
            requested_labels.clone(),
            Some(timeout),
        );

        log::log_announcement_published(
            &self.subject.id,
            announcement.headers.correlation_id,
            requested_labels.len(),
        );
        self.metrics.record_announcement_published();

        let bus = self.bus.clone();
        let tx = self.self_tx.clone();
        let labels_for_dispatch = requested_labels.clone();
        tokio::spawn(async move {
            let outcome =
                aggregator::publish_with_acks(bus.as_ref(), announcement, &labels_for_dispatch, timeout).await;
            let event = if labels_for_dispatch.is_empty() {
                ControllerEvent::Acknowledged
            } else {
                ControllerEvent::AckOutcome(outcome)
            };
            let _ = tx.send(event);
        });
    }

    fn send_delete_command(&mut self) {
        let command = DeleteExpiredSubject {
            policy_id: self.policy_id.clone(),
            subject: self.subject.id.clone(),
            headers: DeleteCommandHeaders {
                correlation_id: CorrelationId::new(),
                response_required: false,
            },
        };
        log::log_delete_forwarded(&self.policy_id, &self.subject.id, command.headers.correlation_id);
        self.metrics.record_delete_forwarded();
        let forwarder = self.forwarder.clone();
        tokio::spawn(async move {
            if let Err(err) = forwarder.tell(command).await {
                tracing::warn!(error = %err, "delete command forwarding failed");
            }
        });
    }

    fn forward_delete(&mut self) {
        self.send_delete_command();
        self.state = FsmState::Deleted;
        self.timers
            .schedule(TimerName::StateTimeout, ControllerEvent::StateTimeout, self.config.max_timeout);
    }

    fn forward_delete_resend(&mut self) {
        self.send_delete_command();
        self.timers
            .schedule(TimerName::StateTimeout, ControllerEvent::StateTimeout, self.config.max_timeout);
    }

    fn stamp_delete_at(&mut self, now: Instant) {
        if !self.deleted {
            self.deleted = true;
            self.delete_at = now;
        }
    }

    fn grace_boundary(&self) -> Instant {
        let base = self.subject.expiry.unwrap_or(self.delete_at);
        base + self.config.grace_period
    }

    fn when_deleted(&self) -> bool {
        self.subject.announcement.as_ref().map(|p| p.when_deleted).unwrap_or(false)
    }

    fn requested_ack_labels(&self) -> HashSet<AckLabel> {
        self.subject
            .announcement
            .as_ref()
            .map(|p| crate::announcement::requested_ack_labels(p).clone())
            .unwrap_or_default()
    }

    fn log_unexpected(&self, event: &ControllerEvent) {
        log::log_unexpected_event(&self.subject.id, self.state, event_name(event));
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.timers.cancel_all();
        log::log_controller_stopped(&self.subject.id, self.state);
    }

    /// Current state, for tests and supervisor introspection.
    #[cfg(test)]
    pub(crate) fn state(&self) -> FsmState {
        self.state
    }

    /// A sender for injecting external events (`SUBJECT_DELETED`) from outside
    /// the controller, e.g. from the supervisor's persistence-event listener.
    pub fn external_sender(&self) -> mpsc::UnboundedSender<ControllerEvent> {
        self.self_tx.clone()
    }
}

fn event_name(event: &ControllerEvent) -> &'static str {
    match event {
        ControllerEvent::Announce => "ANNOUNCE",
        ControllerEvent::Delete => "DELETE",
        ControllerEvent::StateTimeout => "STATE_TIMEOUT",
        ControllerEvent::SubjectDeleted => "SUBJECT_DELETED",
        ControllerEvent::Acknowledged => "ACKNOWLEDGED",
        ControllerEvent::AckOutcome(_) => "ACK_OUTCOME",
    }
}
