#![warn(missing_docs)]
//! # Subject Expiry Lifecycle Controller
//!
//! A per-subject expiry lifecycle controller extracted from a
//! policy-management service. A "subject" is an authorization principal
//! attached to a policy; each subject may carry an expiry timestamp and an
//! optional announcement policy describing how and when to notify external
//! subscribers that the subject is about to vanish or has vanished.
//!
//! This crate owns one subject's end-of-life: it decides *when* to emit a
//! pre-expiry announcement, collects acknowledgements from downstream
//! consumers, retries under backoff within a bounded grace period, and
//! finally instructs a command forwarder to delete the expired subject from
//! the persistent policy.
//!
//! ## Out of scope
//!
//! This crate does not implement the policy persistence engine, the
//! announcement pub/sub bus, the acknowledgement aggregator's transport, JSON
//! codecs, or CLI/configuration wiring. Those are external collaborators
//! reached through the [`aggregator::AnnouncementBus`] and
//! [`sink::CommandForwarder`] traits.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐      spawn(subject)      ┌──────────────────────────┐
//! │  Supervisor    │ ────────────────────────▶│  Controller (per subject)│
//! │ (one per proc) │◀──────────────────────── │  TO_ANNOUNCE             │
//! └───────────────┘      stop / health        │  TO_ACKNOWLEDGE          │
//!         │                                   │  TO_DELETE               │
//!         │ notify_subject_deleted            │  DELETED                 │
//!         ▼                                   └─────────┬────────────────┘
//! ┌───────────────┐                                      │
//! │ SUBJECT_DELETED│                                      │ publish / tell
//! │   (external)   │                            ┌─────────▼─────────┐
//! └───────────────┘                            │ AnnouncementBus /   │
//!                                               │ CommandForwarder    │
//!                                               └─────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use subject_expiry_controller::backoff::BackoffConfig;
//! use subject_expiry_controller::clock::SystemClock;
//! use subject_expiry_controller::model::{ControllerConfig, PolicyId, Subject};
//! use subject_expiry_controller::supervisor::Supervisor;
//!
//! # async fn run(bus: Arc<dyn subject_expiry_controller::aggregator::AnnouncementBus>,
//! #              forwarder: Arc<dyn subject_expiry_controller::sink::CommandForwarder>) {
//! let supervisor = Supervisor::new(bus, forwarder, Arc::new(SystemClock));
//!
//! let backoff = BackoffConfig::new(
//!     Duration::from_secs(1),
//!     Duration::from_secs(60),
//!     0.5,
//! ).unwrap();
//! let config = ControllerConfig::new(
//!     Duration::from_secs(300),
//!     Duration::from_secs(10),
//!     backoff,
//! ).unwrap();
//!
//! let subject = Subject::immediate("subject-1");
//! supervisor.spawn(PolicyId::from("policy-1"), subject, config).await;
//! # }
//! ```
//!
//! ## Module structure
//!
//! - [`model`] — `Subject`, `PolicyId`, `ControllerConfig`, and related types.
//! - [`clock`] — the `Clock` abstraction and named-timer service.
//! - [`backoff`] — randomized exponential backoff with a hard ceiling.
//! - [`announcement`] — the announcement message builder.
//! - [`ack`] — acknowledgement outcomes and the redelivery predicate.
//! - [`aggregator`] — the boundary to the pub/sub bus and ack collection.
//! - [`sink`] — the boundary to the policy persistence engine.
//! - [`fsm`] — the controller state machine itself.
//! - [`metrics`] — lifecycle counters shared across controllers.
//! - [`supervisor`] — spawns and tracks one controller per subject.
//! - [`lifecycle_logging`] — structured `tracing` helpers for controller milestones.

pub mod ack;
pub mod aggregator;
pub mod announcement;
pub mod backoff;
pub mod clock;
pub mod fsm;
pub mod lifecycle_logging;
pub mod metrics;
pub mod model;
pub mod sink;
pub mod supervisor;

pub use ack::{AckAggregationError, AckStatusCode, Acknowledgements};
pub use aggregator::{AckOutcome, AnnouncementBus};
pub use announcement::{CorrelationId, MessageHeaders, SubjectDeletionAnnouncement};
pub use backoff::{BackoffConfig, BackoffConfigError, BackoffGenerator};
pub use clock::{Clock, SystemClock, TimerName, TimerService, ANNOUNCEMENT_WINDOW, MAX_TIMER_DELAY};
pub use fsm::{Controller, ControllerEvent, FsmState};
pub use metrics::{ControllerMetrics, ControllerMetricsSnapshot};
pub use model::{
    AckLabel, AnnouncementPolicy, ControllerConfig, ControllerConfigError, PolicyId, Subject,
    SubjectId,
};
pub use sink::{CommandForwarder, DeleteCommandHeaders, DeleteExpiredSubject, ForwardError};
pub use supervisor::{HealthStatus, ShutdownResult, Supervisor};

/// Prelude for convenient imports.
///
/// ```rust
/// use subject_expiry_controller::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AckAggregationError, AckLabel, AckOutcome, AckStatusCode, Acknowledgements,
        AnnouncementBus, AnnouncementPolicy, BackoffConfig, BackoffConfigError, BackoffGenerator,
        Clock, CommandForwarder, Controller, ControllerConfig, ControllerConfigError,
        ControllerEvent, ControllerMetrics, ControllerMetricsSnapshot, CorrelationId,
        DeleteCommandHeaders, DeleteExpiredSubject, ForwardError, FsmState, HealthStatus,
        MessageHeaders, PolicyId, ShutdownResult, Subject, SubjectDeletionAnnouncement, SubjectId,
        Supervisor, SystemClock, TimerName, TimerService,
    };
}
