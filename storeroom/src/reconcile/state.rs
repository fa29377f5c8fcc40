//! State for payment reconciliation.

use crate::types::{AttemptId, BookingId, PaymentAttempt};
use serde::{Deserialize, Serialize};

/// Payment attempts of one booking - the reducer's state
///
/// A booking may accumulate attempts across retries; the reducer keeps at
/// most one of them non-terminal at a time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingPayments {
    /// Booking the attempts belong to
    pub booking_id: BookingId,
    /// Attempts in creation order; retained for audit even when terminal
    pub attempts: Vec<PaymentAttempt>,
    /// Last invariant violation observed by the reducer
    pub last_error: Option<String>,
}

impl BookingPayments {
    /// Creates an empty attempt history for a booking
    #[must_use]
    pub const fn new(booking_id: BookingId) -> Self {
        Self {
            booking_id,
            attempts: Vec::new(),
            last_error: None,
        }
    }

    /// The at-most-one attempt that is still in flight
    #[must_use]
    pub fn active(&self) -> Option<&PaymentAttempt> {
        self.attempts.iter().find(|a| !a.status.is_terminal())
    }

    /// Attempt by ID
    #[must_use]
    pub fn attempt(&self, attempt_id: AttemptId) -> Option<&PaymentAttempt> {
        self.attempts.iter().find(|a| a.id == attempt_id)
    }

    /// Mutable attempt by ID (reducer internal)
    pub(crate) fn attempt_mut(&mut self, attempt_id: AttemptId) -> Option<&mut PaymentAttempt> {
        self.attempts.iter_mut().find(|a| a.id == attempt_id)
    }

    /// Attempt carrying the given gateway correlation ID
    #[must_use]
    pub fn find_by_checkout(&self, checkout_request_id: &str) -> Option<&PaymentAttempt> {
        self.attempts
            .iter()
            .find(|a| a.checkout_request_id.as_deref() == Some(checkout_request_id))
    }

    /// Most recently opened attempt
    #[must_use]
    pub fn latest(&self) -> Option<&PaymentAttempt> {
        self.attempts.last()
    }

    /// Number of attempts recorded
    #[must_use]
    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    /// Whether no attempt was ever recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}
