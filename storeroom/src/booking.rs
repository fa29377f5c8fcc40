//! Booking manager.
//!
//! Owns booking records and every transition a booking makes. It is also the
//! only component that writes to the inventory ledger, which is what makes
//! "one non-terminal booking per unit" hold: a booking is created only
//! against a successfully reserved unit, and finalize/revert pair the booking
//! transition with the matching unit transition.

use crate::inventory::{InventoryLedger, LedgerError};
use crate::reconcile::PaymentReconciler;
use crate::types::{
    Booking, BookingId, BookingStatus, CustomerContact, DateRange, Money, UnitId,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use storeroom_core::environment::Clock;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors returned by booking operations
#[derive(Debug, Error)]
pub enum BookingError {
    /// The storage unit does not exist
    #[error("storage unit {0} not found")]
    UnitNotFound(UnitId),

    /// The booking does not exist
    #[error("booking {0} not found")]
    NotFound(BookingId),

    /// The unit is held by another booking (expected, recoverable)
    #[error("storage unit {0} is no longer available")]
    UnitUnavailable(UnitId),

    /// The requested date range is rejected by policy
    #[error("invalid date range: {0}")]
    InvalidRange(String),

    /// The ledger rejected a transition the booking state implied
    #[error("inventory ledger rejected transition: {0}")]
    Ledger(#[source] LedgerError),
}

/// Why a booking is being reverted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RevertReason {
    /// The gateway definitively failed the payment
    PaymentFailed,
    /// The payment attempt exceeded the wait window
    Expired,
    /// The customer cancelled before paying
    Cancelled,
}

impl RevertReason {
    /// Terminal booking status this reason maps to
    #[must_use]
    pub const fn target_status(self) -> BookingStatus {
        match self {
            Self::PaymentFailed => BookingStatus::Failed,
            Self::Expired | Self::Cancelled => BookingStatus::Cancelled,
        }
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaymentFailed => write!(f, "payment failed"),
            Self::Expired => write!(f, "payment attempt expired"),
            Self::Cancelled => write!(f, "cancelled before payment"),
        }
    }
}

/// Outcome of an idempotent finalize/revert call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The transition was applied now
    Applied,
    /// The booking was already in a final state; nothing changed
    AlreadyFinal,
}

/// Owns booking records, addressed by booking ID
pub struct BookingManager {
    ledger: Arc<InventoryLedger>,
    clock: Arc<dyn Clock>,
    bookings: RwLock<HashMap<BookingId, Booking>>,
}

impl BookingManager {
    /// Creates a manager over the given ledger
    #[must_use]
    pub fn new(ledger: Arc<InventoryLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            bookings: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a booking against an available unit
    ///
    /// Validates the range first (`start < end`, `start >= today`), then
    /// reserves the unit. A reserve conflict returns without creating any
    /// booking row; a successful reserve and the insert happen together.
    ///
    /// # Errors
    ///
    /// [`BookingError::InvalidRange`], [`BookingError::UnitUnavailable`]
    /// (race lost to another booking), or [`BookingError::UnitNotFound`].
    pub async fn create_booking(
        &self,
        unit_id: UnitId,
        customer: CustomerContact,
        range: DateRange,
        total_cost: Money,
    ) -> Result<Booking, BookingError> {
        if !range.is_well_formed() {
            return Err(BookingError::InvalidRange(
                "start date must fall before end date".to_string(),
            ));
        }
        let today = self.clock.now().date_naive();
        if range.start < today {
            return Err(BookingError::InvalidRange(
                "start date must not be in the past".to_string(),
            ));
        }

        self.ledger.reserve(unit_id).await.map_err(|e| match e {
            LedgerError::NotFound(id) => BookingError::UnitNotFound(id),
            LedgerError::Conflict { unit_id, .. } => BookingError::UnitUnavailable(unit_id),
        })?;

        let now = self.clock.now();
        let booking = Booking {
            id: BookingId::new(),
            unit_id,
            customer,
            range,
            total_cost,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.bookings.write().await.insert(booking.id, booking.clone());

        tracing::info!(
            booking_id = %booking.id,
            unit_id = %unit_id,
            total_cost = %total_cost,
            "booking created, unit reserved"
        );
        Ok(booking)
    }

    /// Marks a pending booking as awaiting payment
    ///
    /// Called by the reconciler once a payment attempt is open. Idempotent;
    /// a booking already awaiting payment is left as is.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for unknown bookings.
    pub async fn mark_awaiting_payment(&self, booking_id: BookingId) -> Result<(), BookingError> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;
        if booking.status == BookingStatus::Pending {
            booking.status = BookingStatus::AwaitingPayment;
            booking.updated_at = self.clock.now();
        }
        Ok(())
    }

    /// Finalizes a booking after a completed payment attempt
    ///
    /// Occupies the unit and moves the booking to `Paid` (straight to
    /// `Active` when the rental period has already started). Idempotent:
    /// repeating the call on an already-final booking is a no-op.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], or [`BookingError::Ledger`] when the unit
    /// state drifted from what the booking implies.
    pub async fn finalize_on_payment(
        &self,
        booking_id: BookingId,
    ) -> Result<FinalizeOutcome, BookingError> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;

        match booking.status {
            BookingStatus::Pending | BookingStatus::AwaitingPayment => {}
            _ => return Ok(FinalizeOutcome::AlreadyFinal),
        }

        self.ledger
            .occupy(booking.unit_id)
            .await
            .map_err(BookingError::Ledger)?;

        let now = self.clock.now();
        booking.status = if booking.range.has_started(now.date_naive()) {
            BookingStatus::Active
        } else {
            BookingStatus::Paid
        };
        booking.updated_at = now;

        tracing::info!(
            booking_id = %booking_id,
            unit_id = %booking.unit_id,
            status = %booking.status,
            "booking finalized, unit occupied"
        );
        Ok(FinalizeOutcome::Applied)
    }

    /// Reverts a booking whose payment failed, expired, or was cancelled
    ///
    /// Releases the unit back to the available pool. Idempotent the same way
    /// as [`Self::finalize_on_payment`].
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], or [`BookingError::Ledger`].
    pub async fn revert_on_failure(
        &self,
        booking_id: BookingId,
        reason: RevertReason,
    ) -> Result<FinalizeOutcome, BookingError> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;

        match booking.status {
            BookingStatus::Pending | BookingStatus::AwaitingPayment => {}
            _ => return Ok(FinalizeOutcome::AlreadyFinal),
        }

        self.ledger
            .release(booking.unit_id)
            .await
            .map_err(BookingError::Ledger)?;

        booking.status = reason.target_status();
        booking.updated_at = self.clock.now();

        tracing::info!(
            booking_id = %booking_id,
            unit_id = %booking.unit_id,
            reason = %reason,
            status = %booking.status,
            "booking reverted, unit released"
        );
        Ok(FinalizeOutcome::Applied)
    }

    /// Closes out a paid booking whose rental period has ended
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`], or [`BookingError::Ledger`].
    pub async fn mark_completed(&self, booking_id: BookingId) -> Result<(), BookingError> {
        let mut bookings = self.bookings.write().await;
        let booking = bookings
            .get_mut(&booking_id)
            .ok_or(BookingError::NotFound(booking_id))?;

        if !matches!(booking.status, BookingStatus::Paid | BookingStatus::Active) {
            return Ok(());
        }

        self.ledger
            .release(booking.unit_id)
            .await
            .map_err(BookingError::Ledger)?;
        booking.status = BookingStatus::Completed;
        booking.updated_at = self.clock.now();
        Ok(())
    }

    /// Bookings currently awaiting payment
    pub async fn awaiting_payment(&self) -> Vec<BookingId> {
        self.bookings
            .read()
            .await
            .values()
            .filter(|b| b.status == BookingStatus::AwaitingPayment)
            .map(|b| b.id)
            .collect()
    }

    /// The expiry sweep: the safety valve that guarantees a unit is never
    /// permanently stranded in `Reserved` because a callback was lost.
    ///
    /// Asks the reconciler to expire the attempt of every booking stuck in
    /// `AwaitingPayment` past the wait window, then reverts those bookings.
    /// Returns the ids that were reverted.
    pub async fn expire_stale(
        &self,
        now: DateTime<Utc>,
        reconciler: &PaymentReconciler,
    ) -> Vec<BookingId> {
        let mut reverted = Vec::new();
        for booking_id in self.awaiting_payment().await {
            if !reconciler.expire_if_stale(booking_id, now).await {
                continue;
            }
            match self.revert_on_failure(booking_id, RevertReason::Expired).await {
                Ok(FinalizeOutcome::Applied) => reverted.push(booking_id),
                Ok(FinalizeOutcome::AlreadyFinal) => {}
                Err(error) => {
                    tracing::error!(booking_id = %booking_id, %error, "expiry revert failed");
                }
            }
        }
        reverted
    }

    /// Snapshot of a single booking
    pub async fn get(&self, booking_id: BookingId) -> Option<Booking> {
        self.bookings.read().await.get(&booking_id).cloned()
    }
}
