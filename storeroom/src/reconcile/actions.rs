//! Actions for payment reconciliation.

use crate::gateway::ChargeResult;
use crate::types::{AttemptId, PaymentAttempt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a resolution came from
///
/// Callbacks and status queries carry the same information through the same
/// transition; the source is recorded for logging only, the state machine
/// treats both identically so the two paths commute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolveSource {
    /// Asynchronous gateway notification
    Callback,
    /// Explicit status query (poll fallback)
    Query,
}

impl fmt::Display for ResolveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback => write!(f, "callback"),
            Self::Query => write!(f, "query"),
        }
    }
}

/// Actions processed by the payment reducer.
///
/// All state transitions of a booking's attempts flow through these; the
/// reconciler service never mutates attempt state directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PaymentAction {
    /// Record an attempt the gateway accepted.
    ///
    /// The attempt arrives in the `Initiated` state carrying the correlation
    /// identifiers the gateway assigned; recording moves it to `Pending`.
    RecordInitiated {
        /// The freshly opened attempt
        attempt: PaymentAttempt,
    },

    /// Record an attempt the gateway declined at initiation.
    ///
    /// Kept for audit as a terminal `Failed` attempt; the booking is
    /// reverted by the service.
    RecordRejected {
        /// The declined attempt
        attempt: PaymentAttempt,
        /// Gateway error description
        reason: String,
    },

    /// Apply a success/failure outcome to an attempt.
    ///
    /// A no-op when the attempt is already terminal - this is the
    /// idempotency that absorbs duplicate callback deliveries and decides
    /// callback/query races.
    Resolve {
        /// Attempt to resolve
        attempt_id: AttemptId,
        /// Outcome reported by the gateway
        outcome: ChargeResult,
        /// Which path delivered the outcome
        via: ResolveSource,
    },

    /// Expire an attempt that exceeded the wait window.
    ///
    /// A no-op when the attempt is already terminal.
    Expire {
        /// Attempt to expire
        attempt_id: AttemptId,
        /// When the expiry was decided
        at: DateTime<Utc>,
    },
}
