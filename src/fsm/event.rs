//! Events a controller reacts to — from its own timers, from itself
//! (self-messaging), and from the outside world.

use crate::aggregator::AckOutcome;

/// One event in a controller's inbox.
///
/// Self-sent and timer-delivered events share this type and the same queue:
/// the controller always processes exactly one at a time, so "send an event
/// to myself" never recurses into the handler that produced it.
#[derive(Debug)]
pub enum ControllerEvent {
    /// The announcement is due (timer-delivered or self-sent).
    Announce,
    /// The delete timer fired.
    Delete,
    /// The `DELETED` state's confirmation timeout elapsed.
    StateTimeout,
    /// An external signal that the subject has actually been removed.
    SubjectDeleted,
    /// The aggregator synthesized an immediate ack because none were requested.
    Acknowledged,
    /// The aggregator finished collecting (or failed to collect) requested acks.
    AckOutcome(AckOutcome),
}
