//! Payment confirmation notifications.
//!
//! External collaborator boundary: the reconciler fires a notification after
//! a booking is finalized, without waiting for it and without letting a
//! delivery failure affect the payment. Real deployments would plug an email
//! or SMS provider in here.

use crate::types::Booking;
use async_trait::async_trait;

/// Notification sink invoked after successful payment
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notifies the customer that their booking is paid
    ///
    /// # Errors
    ///
    /// Returns an error when delivery fails; callers log and move on,
    /// a failed notification never rolls back a payment.
    async fn booking_paid(&self, booking: &Booking, receipt: Option<&str>) -> anyhow::Result<()>;
}

/// Notifier that logs confirmations instead of sending them
///
/// Useful for development and testing where no delivery channel is wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    /// Creates a new tracing notifier
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn booking_paid(&self, booking: &Booking, receipt: Option<&str>) -> anyhow::Result<()> {
        tracing::info!(
            booking_id = %booking.id,
            unit_id = %booking.unit_id,
            email = %booking.customer.email,
            receipt = receipt.unwrap_or("-"),
            "payment confirmed, notifying customer"
        );
        Ok(())
    }
}
