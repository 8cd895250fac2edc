//! Acknowledgement outcomes and the redelivery predicate.
//!
//! Mirrors the HTTP-status-shaped error codes the reference crate's `RpcErrorCode`
//! uses, because the ack aggregator in production reports ack failures the same
//! way a downstream HTTP call would.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::AckLabel;

/// HTTP-shaped status code reported for a single ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AckStatusCode(pub u16);

impl AckStatusCode {
    /// `200 OK` — the canonical success code.
    pub const OK: Self = Self(200);
    /// `408 Request Timeout`.
    pub const REQUEST_TIMEOUT: Self = Self(408);
    /// `424 Failed Dependency`.
    pub const FAILED_DEPENDENCY: Self = Self(424);

    /// Whether this status requires redelivery: `408`, `424`, or any `5xx`.
    ///
    /// All other statuses (including other 4xx client errors) are terminal for
    /// the ack attempt — retrying would not help.
    pub fn requires_redelivery(&self) -> bool {
        matches!(self.0, 408 | 424) || (500..600).contains(&self.0)
    }

    /// Whether this status represents success.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }
}

/// The combined result of one ack aggregation round, keyed by the ack label each
/// subscriber was asked to fulfil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgements {
    /// Status per requested ack label. A label absent from this map is treated
    /// the same as a transient failure (the aggregator never received it).
    pub statuses: HashMap<AckLabel, AckStatusCode>,
}

impl Acknowledgements {
    /// Construct an all-success aggregate for the given labels.
    pub fn all_ok(labels: impl IntoIterator<Item = AckLabel>) -> Self {
        Self {
            statuses: labels.into_iter().map(|l| (l, AckStatusCode::OK)).collect(),
        }
    }

    /// Whether any collected status (or the absence of an expected one) requires
    /// redelivery of the announcement.
    pub fn requires_redelivery(&self, requested: &std::collections::HashSet<AckLabel>) -> bool {
        for label in requested {
            match self.statuses.get(label) {
                Some(status) if !status.requires_redelivery() => continue,
                _ => return true,
            }
        }
        false
    }

    /// Whether every requested label was collected with a non-redelivery status.
    ///
    /// Note this can be true even when some statuses were not `2xx` — a terminal
    /// 4xx failure still counts as "handled", per §7's `TerminalAckFailure`.
    pub fn is_settled(&self, requested: &std::collections::HashSet<AckLabel>) -> bool {
        !self.requires_redelivery(requested)
    }

    /// The first requested label's status that settled without redelivery but
    /// was not itself a success, if any — a terminal ack failure (e.g. a `404`)
    /// distinct from the common case where every requested label came back `2xx`.
    ///
    /// Only meaningful to call once [`Acknowledgements::is_settled`] is true;
    /// a status requiring redelivery is never "settled" in the first place.
    pub fn first_terminal_failure(
        &self,
        requested: &std::collections::HashSet<AckLabel>,
    ) -> Option<AckStatusCode> {
        requested
            .iter()
            .find_map(|label| self.statuses.get(label).copied().filter(|status| !status.is_success()))
    }
}

/// A runtime failure from the aggregator itself (distinct from a per-label ack
/// status): the aggregator task failed to run to completion at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("ack aggregation failed with status {0:?}")]
pub struct AckAggregationError(pub AckStatusCode);

impl AckAggregationError {
    /// Whether this failure requires redelivery, per the same predicate as
    /// per-label statuses.
    pub fn requires_redelivery(&self) -> bool {
        self.0.requires_redelivery()
    }
}
