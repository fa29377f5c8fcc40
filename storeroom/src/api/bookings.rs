//! Booking API endpoints.
//!
//! - `POST /api/bookings` - create a booking against an available unit
//! - `GET /api/bookings/:id` - booking snapshot with its payment attempts
//! - `DELETE /api/bookings/:id` - cancel before payment

use crate::server::{AppError, AppState};
use crate::types::{
    Booking, BookingId, CustomerContact, DateRange, Money, PaymentAttempt, UnitId,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to create a booking.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    /// Unit to reserve
    pub unit_id: Uuid,
    /// Customer contact details
    pub customer: CustomerPayload,
    /// First day of the rental
    pub start_date: NaiveDate,
    /// Day the rental ends (exclusive)
    pub end_date: NaiveDate,
    /// Cost computed for the full period, in whole shillings
    pub total_cost: u64,
}

/// Customer contact fields.
#[derive(Debug, Deserialize)]
pub struct CustomerPayload {
    /// Full name
    pub full_name: String,
    /// Phone number in international format
    pub phone_number: String,
    /// Email address
    pub email: String,
}

/// Response after creating a booking.
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    /// Created booking ID
    pub booking_id: Uuid,
    /// Reserved unit
    pub unit_id: Uuid,
    /// Booking status
    pub status: String,
    /// Total cost in whole shillings
    pub total_cost: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl BookingResponse {
    fn from_booking(booking: &Booking) -> Self {
        Self {
            booking_id: *booking.id.as_uuid(),
            unit_id: *booking.unit_id.as_uuid(),
            status: booking.status.to_string(),
            total_cost: booking.total_cost.shillings(),
            created_at: booking.created_at,
        }
    }
}

/// Payment attempt as shown to API clients.
#[derive(Debug, Serialize)]
pub struct AttemptView {
    /// Attempt ID
    pub attempt_id: Uuid,
    /// Attempt status
    pub status: String,
    /// Gateway correlation ID
    pub checkout_request_id: Option<String>,
    /// Gateway receipt identifier (present once completed)
    pub receipt: Option<String>,
    /// Failure description (present once failed)
    pub failure: Option<String>,
    /// Amount in whole shillings
    pub amount: u64,
    /// When the charge was initiated
    pub initiated_at: DateTime<Utc>,
    /// When the attempt reached a terminal status
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AttemptView {
    /// Builds the client view of an attempt
    #[must_use]
    pub fn from_attempt(attempt: &PaymentAttempt) -> Self {
        Self {
            attempt_id: *attempt.id.as_uuid(),
            status: attempt.status.to_string(),
            checkout_request_id: attempt.checkout_request_id.clone(),
            receipt: attempt.receipt.clone(),
            failure: attempt.failure.clone(),
            amount: attempt.amount.shillings(),
            initiated_at: attempt.initiated_at,
            resolved_at: attempt.resolved_at,
        }
    }
}

/// Booking snapshot with attempt history.
#[derive(Debug, Serialize)]
pub struct BookingDetailResponse {
    /// The booking
    #[serde(flatten)]
    pub booking: BookingResponse,
    /// Rental start date
    pub start_date: NaiveDate,
    /// Rental end date (exclusive)
    pub end_date: NaiveDate,
    /// Payment attempts in creation order
    pub attempts: Vec<AttemptView>,
}

/// Create a booking against an available unit.
///
/// The unit is reserved atomically with creation; losing a race for the
/// last unit yields `409 CONFLICT` and no booking row.
///
/// # Errors
///
/// `409` unit taken, `422` invalid range, `404` unknown unit.
pub async fn create_booking(
    State(state): State<AppState>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let booking = state
        .bookings
        .create_booking(
            UnitId::from_uuid(request.unit_id),
            CustomerContact {
                full_name: request.customer.full_name,
                phone_number: request.customer.phone_number,
                email: request.customer.email,
            },
            DateRange::new(request.start_date, request.end_date),
            Money::from_shillings(request.total_cost),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(BookingResponse::from_booking(&booking))))
}

/// Get a booking with its payment attempts.
///
/// # Errors
///
/// `404` for unknown bookings.
pub async fn get_booking(
    Path(booking_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<BookingDetailResponse>, AppError> {
    let booking_id = BookingId::from_uuid(booking_id);
    let booking = state
        .bookings
        .get(booking_id)
        .await
        .ok_or_else(|| AppError::not_found("Booking", booking_id))?;
    let attempts = state.reconciler.attempts(booking_id).await;

    Ok(Json(BookingDetailResponse {
        booking: BookingResponse::from_booking(&booking),
        start_date: booking.range.start,
        end_date: booking.range.end,
        attempts: attempts.iter().map(AttemptView::from_attempt).collect(),
    }))
}

/// Cancel a booking before payment completes.
///
/// Expires any in-flight attempt so a late callback cannot resurrect the
/// booking, then releases the unit.
///
/// # Errors
///
/// `404` for unknown bookings.
pub async fn cancel_booking(
    Path(booking_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking_id = BookingId::from_uuid(booking_id);
    state.reconciler.cancel(booking_id).await?;
    let booking = state
        .bookings
        .get(booking_id)
        .await
        .ok_or_else(|| AppError::not_found("Booking", booking_id))?;
    Ok(Json(BookingResponse::from_booking(&booking)))
}
