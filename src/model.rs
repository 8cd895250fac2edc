//! Data model: subjects, policy identifiers, and controller configuration.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Opaque entity identifier for the policy a subject belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(pub String);

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PolicyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PolicyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque identifier for a single authorization principal attached to a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A label identifying one acknowledgement the announcement must collect before
/// the subject is considered acknowledged (e.g. `"billing"`, `"audit-log"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckLabel(pub String);

impl fmt::Display for AckLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AckLabel {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How and when to announce a subject's expiry to external subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementPolicy {
    /// Duration before `expiry` at which to send the pre-expiry announcement.
    /// Absent means "only announce on deletion, if `when_deleted` is set".
    #[serde(default)]
    pub before_expiry: Option<Duration>,
    /// Whether to also announce after the subject has actually been deleted.
    pub when_deleted: bool,
    /// Ack labels the announcement must collect before it is considered acknowledged.
    #[serde(default)]
    pub requested_ack_labels: HashSet<AckLabel>,
    /// Timeout for the ack aggregation; falls back to the controller's `max_timeout`
    /// when absent.
    #[serde(default)]
    pub requested_acks_timeout: Option<Duration>,
}

impl AnnouncementPolicy {
    /// An announcement policy with no pre-expiry announcement and no post-deletion
    /// announcement — effectively a no-op policy, distinct from `Subject::announcement`
    /// being `None` only in that callers can still hold a value of this type.
    pub fn silent() -> Self {
        Self {
            before_expiry: None,
            when_deleted: false,
            requested_ack_labels: HashSet::new(),
            requested_acks_timeout: None,
        }
    }
}

/// A subject whose end-of-life this crate's controller owns.
///
/// Immutable for the lifetime of the controller that owns it: the controller never
/// mutates a `Subject`, only its own derived state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Identifier of the subject itself.
    pub id: SubjectId,
    /// Absolute instant at which the subject must be removed, if any.
    ///
    /// Not part of the wire format (JSON codecs live outside this crate); callers
    /// construct it from whatever absolute-time representation they receive.
    #[serde(skip)]
    pub expiry: Option<Instant>,
    /// Announcement configuration, if the subject's removal should be announced.
    #[serde(default)]
    pub announcement: Option<AnnouncementPolicy>,
}

impl Subject {
    /// A subject with no expiry and no announcement: it is deleted immediately.
    pub fn immediate(id: impl Into<SubjectId>) -> Self {
        Self {
            id: id.into(),
            expiry: None,
            announcement: None,
        }
    }

    /// A subject that expires at `expiry` with no announcement configured.
    pub fn expiring_at(id: impl Into<SubjectId>, expiry: Instant) -> Self {
        Self {
            id: id.into(),
            expiry: Some(expiry),
            announcement: None,
        }
    }
}

/// Construction-time validation failure for a [`ControllerConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControllerConfigError {
    /// `gracePeriod` must be non-zero; a zero grace period would make every
    /// retry decision degenerate to "exhausted" the instant `expiry` passes.
    #[error("grace period must be greater than zero")]
    ZeroGracePeriod,
    /// `maxTimeout` must be non-zero; it bounds both the ack aggregator and
    /// the `DELETED` confirmation wait.
    #[error("max timeout must be greater than zero")]
    ZeroMaxTimeout,
}

/// Immutable configuration for one controller instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Tolerance past `expiry` within which retries are still permitted.
    pub grace_period: Duration,
    /// Used both as the ack-aggregator deadline and the `DELETED`-state
    /// confirmation timeout.
    pub max_timeout: Duration,
    /// Backoff policy governing ack-retry spacing.
    pub backoff: crate::backoff::BackoffConfig,
}

impl ControllerConfig {
    /// Validate and construct a controller configuration.
    pub fn new(
        grace_period: Duration,
        max_timeout: Duration,
        backoff: crate::backoff::BackoffConfig,
    ) -> Result<Self, ControllerConfigError> {
        if grace_period.is_zero() {
            return Err(ControllerConfigError::ZeroGracePeriod);
        }
        if max_timeout.is_zero() {
            return Err(ControllerConfigError::ZeroMaxTimeout);
        }
        Ok(Self {
            grace_period,
            max_timeout,
            backoff,
        })
    }
}
