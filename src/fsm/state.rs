//! The controller's four lifecycle states.

/// Where a controller is in its subject's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    /// Waiting for the pre-expiry (or post-deletion) announcement to become due.
    ToAnnounce,
    /// Announcement published; waiting on the ack aggregator.
    ToAcknowledge,
    /// Acks settled (or skipped); waiting for the delete timer.
    ToDelete,
    /// Delete command forwarded; waiting for `SUBJECT_DELETED` confirmation.
    Deleted,
}

impl FsmState {
    /// A short, log-friendly tag for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToAnnounce => "TO_ANNOUNCE",
            Self::ToAcknowledge => "TO_ACKNOWLEDGE",
            Self::ToDelete => "TO_DELETE",
            Self::Deleted => "DELETED",
        }
    }
}

impl std::fmt::Display for FsmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
