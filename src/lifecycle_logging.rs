//! Lifecycle logging for subject expiry controllers.
//!
//! One small function per milestone, each attaching structured fields rather
//! than interpolating them into the message — consistent with how the rest
//! of this crate's call sites are expected to filter and aggregate logs.

use crate::ack::AckStatusCode;
use crate::announcement::CorrelationId;
use crate::fsm::FsmState;
use crate::model::{PolicyId, SubjectId};

/// Log a controller starting up in its computed initial state.
pub fn log_controller_spawned(policy_id: &PolicyId, subject_id: &SubjectId, initial_state: FsmState) {
    tracing::info!(
        policy_id = %policy_id,
        subject_id = %subject_id,
        fsm_state = %initial_state,
        "subject expiry controller spawned"
    );
}

/// Log an announcement being published.
pub fn log_announcement_published(
    subject_id: &SubjectId,
    correlation_id: CorrelationId,
    requested_acks: usize,
) {
    tracing::info!(
        subject_id = %subject_id,
        correlation_id = %correlation_id,
        requested_acks = requested_acks,
        "announcement published"
    );
}

/// Log an ack aggregation outcome that requires a backoff retry.
pub fn log_ack_retry_scheduled(subject_id: &SubjectId, next_backoff: std::time::Duration) {
    tracing::info!(
        subject_id = %subject_id,
        next_backoff_ms = next_backoff.as_millis() as u64,
        "ack requires redelivery, retry scheduled"
    );
}

/// Log an ack aggregation outcome that settles the announcement (successfully
/// or as a terminal failure that still ends the ack phase).
pub fn log_ack_settled(subject_id: &SubjectId, acknowledged: bool) {
    tracing::debug!(
        subject_id = %subject_id,
        acknowledged = acknowledged,
        "ack phase settled"
    );
}

/// Log a terminal (non-retryable) ack failure.
pub fn log_terminal_ack_failure(subject_id: &SubjectId, status: AckStatusCode) {
    tracing::warn!(
        subject_id = %subject_id,
        status = status.0,
        "terminal ack failure, proceeding to deletion"
    );
}

/// Log a delete command being forwarded.
pub fn log_delete_forwarded(policy_id: &PolicyId, subject_id: &SubjectId, correlation_id: CorrelationId) {
    tracing::info!(
        policy_id = %policy_id,
        subject_id = %subject_id,
        correlation_id = %correlation_id,
        "delete command forwarded"
    );
}

/// Log a confirmed subject deletion.
pub fn log_delete_confirmed(subject_id: &SubjectId) {
    tracing::info!(subject_id = %subject_id, "subject deletion confirmed");
}

/// Log the grace period being exhausted. `already_deleted` controls severity:
/// an error if the subject is already gone with no confirmation received, an
/// info-level note if it simply means no further retries will occur.
pub fn log_grace_exhausted(subject_id: &SubjectId, already_deleted: bool) {
    if already_deleted {
        tracing::error!(subject_id = %subject_id, "grace period exhausted after deletion, giving up");
    } else {
        tracing::info!(subject_id = %subject_id, "grace period exhausted, stopping");
    }
}

/// Log an event the current state doesn't define a transition for.
pub fn log_unexpected_event(subject_id: &SubjectId, fsm_state: FsmState, event: &str) {
    tracing::warn!(
        subject_id = %subject_id,
        fsm_state = %fsm_state,
        event = event,
        "unexpected event ignored"
    );
}

/// Log a controller stopping.
pub fn log_controller_stopped(subject_id: &SubjectId, final_state: FsmState) {
    tracing::debug!(
        subject_id = %subject_id,
        fsm_state = %final_state,
        "subject expiry controller stopped"
    );
}
