//! Announcement construction: the message published to subscribers before a
//! subject is removed (or after, for policies that request it).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::model::{AckLabel, AnnouncementPolicy, PolicyId, Subject, SubjectId};

/// Correlates one announcement with whatever acks and deletion attempts it
/// triggers, across process and transport boundaries.
///
/// Time-ordered (UUIDv7) purely so correlation ids sort and log usefully;
/// nothing in this crate depends on that ordering for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh correlation id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport-level headers attached to every published message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeaders {
    /// Correlates this message with the ack(s) and delete attempt(s) it causes.
    pub correlation_id: CorrelationId,
    /// Ack labels this announcement asks subscribers to fulfil. Empty means
    /// no acks are requested and publication is fire-and-forget.
    #[serde(default)]
    pub ack_requests: HashSet<AckLabel>,
    /// Deadline for ack aggregation, if any acks were requested. Falls back
    /// to the controller's `max_timeout` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_timeout: Option<Duration>,
    /// Arbitrary extra headers carried through unchanged; empty by default.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl MessageHeaders {
    /// Headers carrying a fresh correlation id, no ack requests, and no extras.
    pub fn new() -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            ack_requests: HashSet::new(),
            ack_timeout: None,
            extra: HashMap::new(),
        }
    }

    /// Headers carrying a specific correlation id (e.g. reused for a retry).
    pub fn with_correlation_id(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            ack_requests: HashSet::new(),
            ack_timeout: None,
            extra: HashMap::new(),
        }
    }
}

impl Default for MessageHeaders {
    fn default() -> Self {
        Self::new()
    }
}

/// The message published to announce a subject's (pending or completed) deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectDeletionAnnouncement {
    /// Policy the announced subjects belong to.
    pub policy_id: PolicyId,
    /// Instant the subject is (or was) slated to be deleted at. Never later
    /// than the wall-clock time this announcement is published.
    #[serde(skip, default = "Instant::now")]
    pub delete_at: Instant,
    /// Subjects this announcement concerns. Only ever contains the one subject
    /// its owning controller is responsible for; the field is a list because
    /// downstream subscribers expect the same envelope shape batched calls use.
    pub subjects: Vec<SubjectId>,
    /// Headers, including the correlation id subsequent acks must echo back.
    pub headers: MessageHeaders,
}

/// Build the announcement for `subject` under `policy_id`, stamped with
/// `delete_at` and a fresh correlation id.
///
/// `ack_requests` and `ack_timeout` are copied onto the headers verbatim from
/// the subject's announcement policy (empty/`None` when it requests none).
/// Deterministic given its inputs except for the generated correlation id;
/// callers that need to re-publish under the same correlation id (e.g. a
/// retried delivery) should construct [`MessageHeaders::with_correlation_id`]
/// directly instead of calling this twice.
pub fn build_announcement(
    policy_id: &PolicyId,
    subject: &Subject,
    delete_at: Instant,
    ack_requests: HashSet<AckLabel>,
    ack_timeout: Option<Duration>,
) -> SubjectDeletionAnnouncement {
    SubjectDeletionAnnouncement {
        policy_id: policy_id.clone(),
        delete_at,
        subjects: vec![subject.id.clone()],
        headers: MessageHeaders {
            ack_requests,
            ack_timeout,
            ..MessageHeaders::new()
        },
    }
}

/// The ack labels an announcement for `policy` must collect before it is
/// considered acknowledged. Empty when the policy requests no acks at all.
pub fn requested_ack_labels(policy: &AnnouncementPolicy) -> &std::collections::HashSet<AckLabel> {
    &policy.requested_ack_labels
}
