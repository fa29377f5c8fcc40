//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{bookings, payments};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Build the complete Axum router.
///
/// Inbound surfaces: booking creation, payment initiation, the gateway
/// callback endpoint, and the live status query fallback. Authentication
/// and request-shape validation are assumed to sit in front of this router.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Bookings
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id", delete(bookings::cancel_booking))
        // Payments
        .route("/payments", post(payments::initiate_payment))
        .route("/payments/callback", post(payments::gateway_callback))
        .route("/payments/:checkout_id/status", get(payments::payment_status));

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // API routes under /api prefix
        .nest("/api", api_routes)
        .with_state(state)
}
