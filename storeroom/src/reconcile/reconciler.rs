//! Payment reconciler service.
//!
//! Imperative shell around the payment reducer: talks to the gateway, holds
//! the per-booking slot lock for the duration of each reconciliation step,
//! and drives the booking manager when an attempt reaches a terminal state.

use crate::booking::{BookingError, BookingManager, FinalizeOutcome, RevertReason};
use crate::gateway::{ChargeRequest, ChargeStatus, GatewayError, PaymentGateway};
use crate::ingress::CallbackEvent;
use crate::notify::Notifier;
use crate::reconcile::{
    BookingPayments, PaymentAction, PaymentStore, ResolveSource,
};
use crate::types::{AttemptStatus, BookingId, BookingStatus, Money, PaymentAttempt};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use storeroom_core::environment::Clock;
use thiserror::Error;

/// Errors surfaced by reconciliation operations
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The booking does not exist
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),

    /// No attempt carries the given gateway correlation ID
    ///
    /// Callbacks with unknown ids are logged and discarded by the ingress;
    /// an attempt is never created from an unsolicited notification.
    #[error("no payment attempt matches checkout request {0}")]
    UnknownCheckout(String),

    /// The booking has no payment attempt to act on
    #[error("no payment attempt found for booking {0}")]
    AttemptNotFound(BookingId),

    /// The booking already has a non-terminal attempt
    #[error("booking {0} already has an active payment attempt")]
    AttemptAlreadyActive(BookingId),

    /// The booking is past the point where payment can be opened
    #[error("booking {booking_id} is not payable in status {status}")]
    BookingNotPayable {
        /// Booking that rejected the attempt
        booking_id: BookingId,
        /// Status it was in
        status: BookingStatus,
    },

    /// The charge amount is not acceptable
    #[error("charge amount must be at least one shilling")]
    InvalidAmount,

    /// Classified gateway failure (see [`GatewayError`])
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Attempt and booking state drifted apart; nothing was partially applied
    #[error("reconciliation state drifted: {0}")]
    Internal(String),
}

/// Outcome of applying a callback or query result
#[derive(Clone, Debug)]
pub enum Applied {
    /// The attempt transitioned now, and the booking with it
    Transitioned(PaymentAttempt),
    /// The attempt was already terminal; the event was absorbed unchanged
    Duplicate(PaymentAttempt),
}

impl Applied {
    /// The attempt snapshot either way
    #[must_use]
    pub fn attempt(&self) -> &PaymentAttempt {
        match self {
            Self::Transitioned(attempt) | Self::Duplicate(attempt) => attempt,
        }
    }
}

/// Correlates gateway events to bookings and applies the state machine
pub struct PaymentReconciler {
    store: PaymentStore,
    gateway: Arc<dyn PaymentGateway>,
    bookings: Arc<BookingManager>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    wait_window: chrono::Duration,
}

impl PaymentReconciler {
    /// Creates a reconciler with the given wait window for attempt expiry
    #[must_use]
    pub fn new(
        store: PaymentStore,
        gateway: Arc<dyn PaymentGateway>,
        bookings: Arc<BookingManager>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        wait_window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            bookings,
            notifier,
            clock,
            wait_window,
        }
    }

    /// Opens a payment attempt for a booking
    ///
    /// Guarded: fails when the booking already has a non-terminal attempt.
    /// On gateway acceptance the attempt is stored `Pending` with its
    /// correlation ids and the booking moves to `AwaitingPayment`. A
    /// gateway rejection stores a terminal `Failed` attempt and reverts the
    /// booking. A transient failure leaves no record and surfaces the error
    /// so the caller may retry.
    ///
    /// # Errors
    ///
    /// See [`ReconcileError`].
    pub async fn open(
        &self,
        booking_id: BookingId,
        phone_number: &str,
        amount: Money,
    ) -> Result<PaymentAttempt, ReconcileError> {
        if amount.shillings() == 0 {
            return Err(ReconcileError::InvalidAmount);
        }

        let booking = self
            .bookings
            .get(booking_id)
            .await
            .ok_or(ReconcileError::BookingNotFound(booking_id))?;
        if !matches!(
            booking.status,
            BookingStatus::Pending | BookingStatus::AwaitingPayment
        ) {
            return Err(ReconcileError::BookingNotPayable {
                booking_id,
                status: booking.status,
            });
        }
        if amount.shillings() != booking.total_cost.shillings() {
            tracing::warn!(
                booking_id = %booking_id,
                charged = amount.shillings(),
                expected = booking.total_cost.shillings(),
                "charge amount differs from booking cost"
            );
        }

        let slot = self.store.slot(booking_id).await;
        let mut payments = slot.lock().await;
        if payments.active().is_some() {
            return Err(ReconcileError::AttemptAlreadyActive(booking_id));
        }

        let reference: String = booking_id.as_uuid().simple().to_string();
        let request = ChargeRequest {
            phone_number: phone_number.to_string(),
            amount,
            account_reference: format!("BK-{}", &reference[..8]),
            description: format!("Storage unit rental {}", booking.range.start),
        };

        match self.gateway.initiate(&request).await {
            Ok(handle) => {
                let attempt = PaymentAttempt::initiated(
                    booking_id,
                    amount,
                    phone_number,
                    self.clock.now(),
                )
                .with_gateway_ids(
                    handle.checkout_request_id.clone(),
                    handle.merchant_request_id,
                );
                self.store
                    .reduce(&mut payments, PaymentAction::RecordInitiated { attempt });
                self.store
                    .index_checkout(handle.checkout_request_id, booking_id)
                    .await;
                self.bookings
                    .mark_awaiting_payment(booking_id)
                    .await
                    .map_err(|e| ReconcileError::Internal(e.to_string()))?;

                payments
                    .latest()
                    .cloned()
                    .ok_or_else(|| ReconcileError::Internal("attempt not recorded".to_string()))
            }
            Err(error @ GatewayError::Transient(_)) => {
                // No record: the caller may retry with the same parameters.
                tracing::warn!(booking_id = %booking_id, %error, "charge initiation failed transiently");
                Err(error.into())
            }
            Err(error) => {
                let attempt = PaymentAttempt::initiated(
                    booking_id,
                    amount,
                    phone_number,
                    self.clock.now(),
                );
                self.store.reduce(
                    &mut payments,
                    PaymentAction::RecordRejected {
                        attempt,
                        reason: error.to_string(),
                    },
                );
                drop(payments);

                if let Err(revert_error) = self
                    .bookings
                    .revert_on_failure(booking_id, RevertReason::PaymentFailed)
                    .await
                {
                    tracing::error!(booking_id = %booking_id, error = %revert_error, "revert after rejection failed");
                }
                Err(error.into())
            }
        }
    }

    /// Applies an inbound callback event
    ///
    /// A duplicate delivery (attempt already terminal) is absorbed and
    /// reported as [`Applied::Duplicate`]. Unknown correlation ids never
    /// create state.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::UnknownCheckout`] for foreign or stale ids,
    /// [`ReconcileError::Internal`] when the booking transition fails.
    pub async fn apply_callback(&self, event: CallbackEvent) -> Result<Applied, ReconcileError> {
        let booking_id = self
            .store
            .booking_for_checkout(&event.checkout_request_id)
            .await
            .ok_or_else(|| ReconcileError::UnknownCheckout(event.checkout_request_id.clone()))?;
        let slot = self
            .store
            .existing_slot(booking_id)
            .await
            .ok_or_else(|| ReconcileError::Internal("indexed booking has no slot".to_string()))?;
        let mut payments = slot.lock().await;

        let attempt = payments
            .find_by_checkout(&event.checkout_request_id)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownCheckout(event.checkout_request_id.clone()))?;
        if attempt.status.is_terminal() {
            tracing::debug!(
                checkout_request_id = %event.checkout_request_id,
                status = %attempt.status,
                "duplicate callback absorbed"
            );
            return Ok(Applied::Duplicate(attempt));
        }

        self.resolve_locked(&mut payments, attempt.id, event.result, ResolveSource::Callback)
            .await
    }

    /// Poll fallback: queries the gateway for the booking's active attempt
    ///
    /// Exists because callback delivery is not guaranteed. Applies the same
    /// completion/failure/idempotency logic as the callback path; a
    /// still-pending answer changes nothing.
    ///
    /// # Errors
    ///
    /// See [`ReconcileError`]; transient gateway failures surface for retry.
    pub async fn refresh(&self, booking_id: BookingId) -> Result<PaymentAttempt, ReconcileError> {
        let slot = self
            .store
            .existing_slot(booking_id)
            .await
            .ok_or(ReconcileError::AttemptNotFound(booking_id))?;
        let mut payments = slot.lock().await;
        let attempt = payments
            .latest()
            .cloned()
            .ok_or(ReconcileError::AttemptNotFound(booking_id))?;
        self.query_and_resolve(&mut payments, attempt).await
    }

    /// Poll fallback addressed by gateway correlation ID
    ///
    /// # Errors
    ///
    /// [`ReconcileError::UnknownCheckout`] for foreign ids; otherwise as
    /// [`Self::refresh`].
    pub async fn refresh_by_checkout(
        &self,
        checkout_request_id: &str,
    ) -> Result<PaymentAttempt, ReconcileError> {
        let booking_id = self
            .store
            .booking_for_checkout(checkout_request_id)
            .await
            .ok_or_else(|| ReconcileError::UnknownCheckout(checkout_request_id.to_string()))?;
        let slot = self
            .store
            .existing_slot(booking_id)
            .await
            .ok_or_else(|| ReconcileError::Internal("indexed booking has no slot".to_string()))?;
        let mut payments = slot.lock().await;
        let attempt = payments
            .find_by_checkout(checkout_request_id)
            .cloned()
            .ok_or_else(|| ReconcileError::UnknownCheckout(checkout_request_id.to_string()))?;
        self.query_and_resolve(&mut payments, attempt).await
    }

    /// Expires the booking's active attempt when it outlived the wait window
    ///
    /// Returns whether the booking is clear to be reverted: true when the
    /// attempt was just expired, was already terminal, or never existed.
    /// A late callback after this point finds a terminal attempt and is
    /// absorbed; the attempt is never reopened.
    pub async fn expire_if_stale(&self, booking_id: BookingId, now: DateTime<Utc>) -> bool {
        let Some(slot) = self.store.existing_slot(booking_id).await else {
            return true;
        };
        let mut payments = slot.lock().await;
        let Some(active) = payments.active().cloned() else {
            return true;
        };
        if now - active.initiated_at < self.wait_window {
            return false;
        }

        self.store.reduce(
            &mut payments,
            PaymentAction::Expire {
                attempt_id: active.id,
                at: now,
            },
        );
        tracing::info!(
            booking_id = %booking_id,
            attempt_id = %active.id,
            "payment attempt expired without a conclusive answer"
        );
        true
    }

    /// Explicit pre-payment cancellation
    ///
    /// Expires any active attempt first so a late callback cannot resurrect
    /// the booking, then reverts booking and unit.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::BookingNotFound`].
    pub async fn cancel(&self, booking_id: BookingId) -> Result<FinalizeOutcome, ReconcileError> {
        if let Some(slot) = self.store.existing_slot(booking_id).await {
            let mut payments = slot.lock().await;
            if let Some(active) = payments.active().cloned() {
                self.store.reduce(
                    &mut payments,
                    PaymentAction::Expire {
                        attempt_id: active.id,
                        at: self.clock.now(),
                    },
                );
            }
        }

        self.bookings
            .revert_on_failure(booking_id, RevertReason::Cancelled)
            .await
            .map_err(|e| match e {
                BookingError::NotFound(id) => ReconcileError::BookingNotFound(id),
                other => ReconcileError::Internal(other.to_string()),
            })
    }

    /// Snapshot of a booking's attempt history
    pub async fn attempts(&self, booking_id: BookingId) -> Vec<PaymentAttempt> {
        self.store
            .snapshot(booking_id)
            .await
            .map(|payments| payments.attempts)
            .unwrap_or_default()
    }

    /// Queries the gateway for one attempt and applies the outcome
    ///
    /// Holding the slot lock across the query serializes this path with
    /// callbacks for the same booking: whichever reaches a terminal state
    /// first wins and the other observes it.
    async fn query_and_resolve(
        &self,
        payments: &mut BookingPayments,
        attempt: PaymentAttempt,
    ) -> Result<PaymentAttempt, ReconcileError> {
        if attempt.status.is_terminal() {
            return Ok(attempt);
        }
        let checkout_request_id = attempt.checkout_request_id.clone().ok_or_else(|| {
            ReconcileError::Internal("pending attempt without correlation id".to_string())
        })?;

        match self.gateway.query(&checkout_request_id).await? {
            ChargeStatus::Pending => Ok(attempt),
            ChargeStatus::Resolved(result) => {
                let applied = self
                    .resolve_locked(payments, attempt.id, result, ResolveSource::Query)
                    .await?;
                Ok(applied.attempt().clone())
            }
        }
    }

    /// Applies an outcome under the slot lock and drives the booking
    ///
    /// The attempt transition and the booking transition happen under the
    /// same per-booking lock, and both sides are idempotent, so an attempt
    /// that completes exactly once finalizes its booking exactly once.
    async fn resolve_locked(
        &self,
        payments: &mut BookingPayments,
        attempt_id: crate::types::AttemptId,
        outcome: crate::gateway::ChargeResult,
        via: ResolveSource,
    ) -> Result<Applied, ReconcileError> {
        self.store.reduce(
            payments,
            PaymentAction::Resolve {
                attempt_id,
                outcome,
                via,
            },
        );
        let updated = payments
            .attempt(attempt_id)
            .cloned()
            .ok_or_else(|| ReconcileError::Internal("resolved attempt vanished".to_string()))?;

        match updated.status {
            AttemptStatus::Completed => {
                self.bookings
                    .finalize_on_payment(updated.booking_id)
                    .await
                    .map_err(|e| ReconcileError::Internal(e.to_string()))?;
                self.notify_paid(updated.booking_id, updated.receipt.clone());
            }
            AttemptStatus::Failed => {
                self.bookings
                    .revert_on_failure(updated.booking_id, RevertReason::PaymentFailed)
                    .await
                    .map_err(|e| ReconcileError::Internal(e.to_string()))?;
            }
            _ => {}
        }

        Ok(Applied::Transitioned(updated))
    }

    /// Fire-and-forget confirmation; a delivery failure only warns
    fn notify_paid(&self, booking_id: BookingId, receipt: Option<String>) {
        let bookings = self.bookings.clone();
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let Some(booking) = bookings.get(booking_id).await else {
                return;
            };
            if let Err(error) = notifier.booking_paid(&booking, receipt.as_deref()).await {
                tracing::warn!(booking_id = %booking_id, %error, "payment notification failed");
            }
        });
    }
}
