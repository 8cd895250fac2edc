use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::ack::{AckAggregationError, AckStatusCode, Acknowledgements};
use crate::aggregator::{AckOutcome, AnnouncementBus};
use crate::announcement::SubjectDeletionAnnouncement;
use crate::backoff::BackoffConfig;
use crate::clock::SystemClock;
use crate::model::{AckLabel, AnnouncementPolicy, ControllerConfig, PolicyId, Subject};
use crate::sink::test_support::RecordingForwarder;

use super::{Controller, ControllerEvent, FsmState};

/// A bus that returns a scripted sequence of outcomes, one per
/// `publish_with_acks` call; once exhausted, repeats the last entry forever
/// (or an all-ok result if the script was empty to begin with).
struct SequencedBus {
    responses: Vec<AckOutcome>,
    calls: Mutex<usize>,
    published: Mutex<Vec<SubjectDeletionAnnouncement>>,
}

impl SequencedBus {
    fn new(responses: Vec<AckOutcome>) -> Self {
        Self {
            responses,
            calls: Mutex::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl AnnouncementBus for SequencedBus {
    async fn publish(&self, announcement: SubjectDeletionAnnouncement) {
        self.published.lock().unwrap().push(announcement);
    }

    async fn publish_with_acks(
        &self,
        announcement: SubjectDeletionAnnouncement,
        _timeout: Duration,
    ) -> AckOutcome {
        self.published.lock().unwrap().push(announcement);
        if self.responses.is_empty() {
            return Ok(Acknowledgements::all_ok(std::iter::empty()));
        }
        let mut calls = self.calls.lock().unwrap();
        let idx = (*calls).min(self.responses.len() - 1);
        *calls += 1;
        self.responses[idx].clone()
    }
}

fn tight_backoff() -> BackoffConfig {
    BackoffConfig::new(Duration::from_secs(1), Duration::from_secs(10), 0.0).unwrap()
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn s1_happy_path_announce_ack_delete() {
    let now = Instant::now();
    let expiry = now + Duration::from_secs(3600);
    let labels: HashSet<AckLabel> = ["billing"].into_iter().map(AckLabel::from).collect();

    let mut subject = Subject::expiring_at("sub-1", expiry);
    subject.announcement = Some(AnnouncementPolicy {
        before_expiry: Some(Duration::from_secs(600)),
        when_deleted: false,
        requested_ack_labels: labels.clone(),
        requested_acks_timeout: None,
    });

    let bus = Arc::new(SequencedBus::new(vec![Ok(Acknowledgements::all_ok(
        labels.iter().cloned(),
    ))]));
    let forwarder = Arc::new(RecordingForwarder::default());
    let config = ControllerConfig::new(Duration::from_secs(300), Duration::from_secs(30), tight_backoff()).unwrap();

    let controller = Controller::new(
        PolicyId::from("policy-1"),
        subject,
        config,
        bus.clone(),
        forwarder.clone(),
        Arc::new(SystemClock),
        Arc::new(crate::metrics::ControllerMetrics::new()),
    );
    let external = controller.external_sender();
    let handle = tokio::spawn(controller.run());

    tokio::time::advance(Duration::from_secs(3000)).await;
    settle().await;
    assert_eq!(bus.publish_count(), 1, "announcement should have published once");

    tokio::time::advance(Duration::from_secs(700)).await;
    settle().await;
    assert_eq!(forwarder.sent.lock().await.len(), 1, "delete should have been forwarded");

    external.send(ControllerEvent::SubjectDeleted).unwrap();
    settle().await;

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("controller should stop after confirmed deletion")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn s2_retryable_ack_failure_then_success_inside_grace() {
    let now = Instant::now();
    let expiry = now + Duration::from_secs(3600);
    let labels: HashSet<AckLabel> = ["billing"].into_iter().map(AckLabel::from).collect();

    let mut subject = Subject::expiring_at("sub-2", expiry);
    subject.announcement = Some(AnnouncementPolicy {
        before_expiry: Some(Duration::from_secs(600)),
        when_deleted: false,
        requested_ack_labels: labels.clone(),
        requested_acks_timeout: None,
    });

    let bus = Arc::new(SequencedBus::new(vec![
        Err(AckAggregationError(AckStatusCode(503))),
        Ok(Acknowledgements::all_ok(labels.iter().cloned())),
    ]));
    let forwarder = Arc::new(RecordingForwarder::default());
    let config = ControllerConfig::new(Duration::from_secs(1800), Duration::from_secs(30), tight_backoff()).unwrap();

    let controller = Controller::new(
        PolicyId::from("policy-2"),
        subject,
        config,
        bus.clone(),
        forwarder.clone(),
        Arc::new(SystemClock),
        Arc::new(crate::metrics::ControllerMetrics::new()),
    );
    let handle = tokio::spawn(controller.run());

    tokio::time::advance(Duration::from_secs(3000)).await;
    settle().await;
    assert_eq!(bus.publish_count(), 1, "first announcement published");

    tokio::time::advance(Duration::from_secs(15)).await;
    settle().await;
    assert_eq!(bus.publish_count(), 2, "retry should have re-published after backoff");

    tokio::time::advance(Duration::from_secs(700)).await;
    settle().await;
    assert_eq!(forwarder.sent.lock().await.len(), 1, "delete forwarded after ack succeeds");

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn s3_grace_exhausted_forces_deletion_without_further_retry() {
    let now = Instant::now();
    let expiry = now + Duration::from_secs(100);
    let labels: HashSet<AckLabel> = ["billing"].into_iter().map(AckLabel::from).collect();

    let mut subject = Subject::expiring_at("sub-3", expiry);
    subject.announcement = Some(AnnouncementPolicy {
        before_expiry: Some(Duration::from_secs(50)),
        when_deleted: false,
        requested_ack_labels: labels.clone(),
        requested_acks_timeout: None,
    });

    // Every ack attempt fails transiently; grace period is too short to absorb them.
    let bus = Arc::new(SequencedBus::new(vec![Err(AckAggregationError(AckStatusCode(503)))]));
    let forwarder = Arc::new(RecordingForwarder::default());
    let config = ControllerConfig::new(
        Duration::from_secs(5),
        Duration::from_secs(30),
        BackoffConfig::new(Duration::from_secs(20), Duration::from_secs(20), 0.0).unwrap(),
    )
    .unwrap();

    let controller = Controller::new(
        PolicyId::from("policy-3"),
        subject,
        config,
        bus.clone(),
        forwarder.clone(),
        Arc::new(SystemClock),
        Arc::new(crate::metrics::ControllerMetrics::new()),
    );
    let handle = tokio::spawn(controller.run());

    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(bus.publish_count(), 1);

    // The first retry backoff (20s) pushes past expiry + grace (100 + 5 = 105s from start);
    // the controller must fall through to forwarding delete rather than retry forever.
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;

    assert_eq!(
        forwarder.sent.lock().await.len(),
        1,
        "controller should forward delete once grace is exhausted instead of retrying"
    );

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn s4_when_deleted_reannounces_after_external_delete() {
    let now = Instant::now();
    let expiry = now + Duration::from_secs(1000);
    let labels: HashSet<AckLabel> = HashSet::new();

    let mut subject = Subject::expiring_at("sub-4", expiry);
    subject.announcement = Some(AnnouncementPolicy {
        before_expiry: None,
        when_deleted: true,
        requested_ack_labels: labels,
        requested_acks_timeout: None,
    });

    let bus = Arc::new(SequencedBus::new(vec![]));
    let forwarder = Arc::new(RecordingForwarder::default());
    let config = ControllerConfig::new(Duration::from_secs(300), Duration::from_secs(30), tight_backoff()).unwrap();

    let controller = Controller::new(
        PolicyId::from("policy-4"),
        subject,
        config,
        bus.clone(),
        forwarder.clone(),
        Arc::new(SystemClock),
        Arc::new(crate::metrics::ControllerMetrics::new()),
    );
    assert_eq!(controller.state(), FsmState::ToDelete);
    let external = controller.external_sender();
    let handle = tokio::spawn(controller.run());

    external.send(ControllerEvent::SubjectDeleted).unwrap();
    settle().await;

    assert!(
        bus.publish_count() >= 1,
        "whenDeleted should trigger a post-deletion announcement"
    );

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn s5_lost_delete_confirmation_resends_within_grace() {
    let now = Instant::now();
    let mut subject = Subject::expiring_at("sub-5", now);
    subject.announcement = Some(AnnouncementPolicy {
        before_expiry: None,
        when_deleted: true,
        requested_ack_labels: HashSet::new(),
        requested_acks_timeout: None,
    });

    let bus = Arc::new(SequencedBus::new(vec![]));
    let forwarder = Arc::new(RecordingForwarder::default());
    let config = ControllerConfig::new(Duration::from_secs(3600), Duration::from_secs(10), tight_backoff()).unwrap();

    let controller = Controller::new(
        PolicyId::from("policy-5"),
        subject,
        config,
        bus.clone(),
        forwarder.clone(),
        Arc::new(SystemClock),
        Arc::new(crate::metrics::ControllerMetrics::new()),
    );
    let handle = tokio::spawn(controller.run());

    settle().await;
    assert_eq!(forwarder.sent.lock().await.len(), 1, "initial delete forwarded immediately");

    // No SUBJECT_DELETED arrives; the DELETED state timeout should resend.
    tokio::time::advance(Duration::from_secs(11)).await;
    settle().await;
    assert_eq!(
        forwarder.sent.lock().await.len(),
        2,
        "lost confirmation should trigger a resend while still within grace"
    );

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn s6_no_acks_requested_uses_fire_and_forget_path() {
    let now = Instant::now();
    let expiry = now + Duration::from_secs(100);

    let mut subject = Subject::expiring_at("sub-6", expiry);
    subject.announcement = Some(AnnouncementPolicy {
        before_expiry: Some(Duration::from_secs(50)),
        when_deleted: false,
        requested_ack_labels: HashSet::new(),
        requested_acks_timeout: None,
    });

    let bus = Arc::new(SequencedBus::new(vec![]));
    let forwarder = Arc::new(RecordingForwarder::default());
    let config = ControllerConfig::new(Duration::from_secs(300), Duration::from_secs(30), tight_backoff()).unwrap();

    let controller = Controller::new(
        PolicyId::from("policy-6"),
        subject,
        config,
        bus.clone(),
        forwarder.clone(),
        Arc::new(SystemClock),
        Arc::new(crate::metrics::ControllerMetrics::new()),
    );
    let handle = tokio::spawn(controller.run());

    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;

    assert_eq!(bus.publish_count(), 1, "fire-and-forget publish still happens");

    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(
        forwarder.sent.lock().await.len(),
        1,
        "no acks requested should proceed straight to deletion"
    );

    handle.abort();
}
