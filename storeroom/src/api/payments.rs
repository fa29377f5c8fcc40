//! Payment API endpoints.
//!
//! - `POST /api/payments` - initiate an STK push charge for a booking
//! - `POST /api/payments/callback` - gateway callback endpoint (always acks)
//! - `GET /api/payments/:checkout_id/status` - live status query fallback

use super::bookings::AttemptView;
use crate::ingress::CallbackAck;
use crate::server::{AppError, AppState};
use crate::types::{BookingId, Money};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to initiate a payment.
#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    /// Booking to pay for
    pub booking_id: Uuid,
    /// Payer phone number in international format
    pub phone_number: String,
    /// Amount in whole shillings
    pub amount: u64,
}

/// Acknowledgment of a pending payment attempt.
#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    /// The opened attempt
    #[serde(flatten)]
    pub attempt: AttemptView,
    /// Booking the attempt pays for
    pub booking_id: Uuid,
    /// Message for the customer
    pub message: String,
}

/// Initiate an STK push charge for a booking.
///
/// Returns `202 ACCEPTED` with the pending attempt: the charge completes
/// asynchronously via the gateway callback, or via the status query
/// fallback when no callback arrives.
///
/// # Errors
///
/// `409` active attempt or non-payable booking, `502` gateway decline,
/// `503` transient gateway failure (safe to retry).
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(request): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<InitiatePaymentResponse>), AppError> {
    let booking_id = BookingId::from_uuid(request.booking_id);
    let attempt = state
        .reconciler
        .open(
            booking_id,
            &request.phone_number,
            Money::from_shillings(request.amount),
        )
        .await?;

    let message = format!(
        "Payment prompt sent to {}. Enter your PIN to complete the payment.",
        request.phone_number
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(InitiatePaymentResponse {
            attempt: AttemptView::from_attempt(&attempt),
            booking_id: request.booking_id,
            message,
        }),
    ))
}

/// Gateway callback endpoint.
///
/// Always answers the fixed acknowledgment, regardless of internal outcome,
/// so the gateway never sees a failure that would trigger a retry storm.
/// Malformed and duplicate payloads are logged and dropped.
pub async fn gateway_callback(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> (StatusCode, Json<CallbackAck>) {
    let ack = state.ingress.receive(raw).await;
    (StatusCode::OK, Json(ack))
}

/// Live attempt status, sourced from the gateway.
///
/// The poll fallback for when a callback never arrives: a still-pending
/// answer reports the attempt as it stands, a conclusive answer applies the
/// same transition a callback would have.
///
/// # Errors
///
/// `404` unknown correlation id, `503` when the gateway query itself fails
/// transiently.
pub async fn payment_status(
    Path(checkout_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AttemptView>, AppError> {
    let attempt = state.reconciler.refresh_by_checkout(&checkout_id).await?;
    Ok(Json(AttemptView::from_attempt(&attempt)))
}
