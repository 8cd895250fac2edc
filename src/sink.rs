//! Forwarding `DeleteExpiredSubject` to the external persistence engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::announcement::MessageHeaders;
use crate::model::{PolicyId, SubjectId};

/// Headers attached to a forwarded delete command.
///
/// `response_required` is always `false`: the controller learns of completion
/// from the out-of-band `SUBJECT_DELETED` event, never from the `tell()` call
/// itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteCommandHeaders {
    /// Correlates this delete attempt with the announcement (if any) that led to it.
    pub correlation_id: crate::announcement::CorrelationId,
    /// Always `false`. Present on the wire type because downstream consumers
    /// expect the same header shape every command carries.
    pub response_required: bool,
}

impl DeleteCommandHeaders {
    /// Build headers for a fire-and-forget delete command correlated with `headers`.
    pub fn from_announcement(headers: &MessageHeaders) -> Self {
        Self {
            correlation_id: headers.correlation_id,
            response_required: false,
        }
    }
}

/// The command forwarded to the persistence engine to remove an expired subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteExpiredSubject {
    /// Policy the subject belongs to.
    pub policy_id: PolicyId,
    /// Subject to delete.
    pub subject: SubjectId,
    /// Fire-and-forget headers.
    pub headers: DeleteCommandHeaders,
}

/// Error forwarding a delete command: the transport itself failed, distinct
/// from any later `SUBJECT_DELETED` confirmation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to forward delete command: {0}")]
pub struct ForwardError(pub String);

/// Boundary to the external persistence engine. Implementations only need to
/// guarantee at-least-once delivery attempts; the controller owns all retry
/// policy.
#[async_trait]
pub trait CommandForwarder: Send + Sync {
    /// Forward `command`, without waiting for the engine to apply it.
    async fn tell(&self, command: DeleteExpiredSubject) -> Result<(), ForwardError>;
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingForwarder;
    use super::*;
    use crate::announcement::CorrelationId;

    #[tokio::test]
    async fn recording_forwarder_captures_sent_commands() {
        let forwarder = RecordingForwarder::default();
        let command = DeleteExpiredSubject {
            policy_id: PolicyId::from("policy-1"),
            subject: SubjectId::from("sub-1"),
            headers: DeleteCommandHeaders {
                correlation_id: CorrelationId::new(),
                response_required: false,
            },
        };

        forwarder.tell(command.clone()).await.unwrap();
        assert_eq!(forwarder.sent.lock().await.as_slice(), &[command]);
    }

    #[test]
    fn delete_headers_never_request_a_response() {
        let headers = DeleteCommandHeaders::from_announcement(&MessageHeaders::new());
        assert!(!headers.response_required);
    }
}
