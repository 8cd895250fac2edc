//! Publishing an announcement and collecting the acks it requests.
//!
//! Ack collection runs as an ephemeral child task rather than threading
//! subscriber state through the controller: the task publishes, listens until
//! every requested label reports in or the timeout elapses, and replies with
//! one combined [`Acknowledgements`] or a single aggregation failure. The
//! controller receives that outcome as one event — it never sees individual
//! ack deliveries.

use std::time::Duration;

use async_trait::async_trait;

use crate::ack::{AckAggregationError, Acknowledgements};
use crate::announcement::SubjectDeletionAnnouncement;

/// Outcome of one ack-collection round.
pub type AckOutcome = Result<Acknowledgements, AckAggregationError>;

/// Boundary to the pub/sub transport the announcement is delivered over.
#[async_trait]
pub trait AnnouncementBus: Send + Sync {
    /// Publish `announcement` without waiting for any acknowledgement.
    async fn publish(&self, announcement: SubjectDeletionAnnouncement);

    /// Publish `announcement` and collect acks within `timeout`, returning the
    /// combined result (or a failure of the aggregation itself).
    ///
    /// Only called when the announcement actually requests acks; the
    /// fire-and-forget path in [`publish_with_acks`] never reaches the bus.
    async fn publish_with_acks(
        &self,
        announcement: SubjectDeletionAnnouncement,
        timeout: Duration,
    ) -> AckOutcome;
}

/// Publish `announcement`, collecting acks only if it actually requests any.
///
/// When the announcement's headers carry no requested ack labels, publishing
/// is fire-and-forget and this synthesizes an immediate all-ok result — there
/// is nothing to wait for, and the aggregator is never started.
pub async fn publish_with_acks(
    bus: &dyn AnnouncementBus,
    announcement: SubjectDeletionAnnouncement,
    requested_labels: &std::collections::HashSet<crate::model::AckLabel>,
    timeout: Duration,
) -> AckOutcome {
    if requested_labels.is_empty() {
        bus.publish(announcement).await;
        return Ok(Acknowledgements::all_ok(requested_labels.iter().cloned()));
    }
    bus.publish_with_acks(announcement, timeout).await
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// A bus whose response to `publish_with_acks` is scripted ahead of time,
    /// and that records every announcement it was asked to publish (through
    /// either method).
    pub struct ScriptedBus {
        pub response: AckOutcome,
        pub published: Mutex<Vec<SubjectDeletionAnnouncement>>,
    }

    impl ScriptedBus {
        pub fn new(response: AckOutcome) -> Self {
            Self {
                response,
                published: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AnnouncementBus for ScriptedBus {
        async fn publish(&self, announcement: SubjectDeletionAnnouncement) {
            self.published.lock().unwrap().push(announcement);
        }

        async fn publish_with_acks(
            &self,
            announcement: SubjectDeletionAnnouncement,
            _timeout: Duration,
        ) -> AckOutcome {
            self.published.lock().unwrap().push(announcement);
            self.response.clone()
        }
    }
}
