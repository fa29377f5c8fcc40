//! Error types for HTTP handlers.
//!
//! Bridges the domain error taxonomy to HTTP responses, implementing Axum's
//! `IntoResponse`. Expected concurrent-state collisions surface as 409s,
//! definitive gateway failures as 502s, transient ones as 503s; duplicates
//! never reach this type because they are absorbed upstream.

use crate::booking::BookingError;
use crate::gateway::GatewayError;
use crate::reconcile::ReconcileError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: String,
    /// Internal error (for logging, not exposed to client)
    #[allow(dead_code)]
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: String) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            message.into(),
            "BAD_REQUEST".to_string(),
        )
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND".to_string(),
        )
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT".to_string())
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            message.into(),
            "VALIDATION_ERROR".to_string(),
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            message.into(),
            "INTERNAL_SERVER_ERROR".to_string(),
        )
    }

    /// Create a 502 Bad Gateway error (payment gateway declined or broke).
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            message.into(),
            "BAD_GATEWAY".to_string(),
        )
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            message.into(),
            "SERVICE_UNAVAILABLE".to_string(),
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: String,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log internal errors
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = %self.code,
                message = %self.message,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::UnitNotFound(id) => Self::not_found("Storage unit", id),
            BookingError::NotFound(id) => Self::not_found("Booking", id),
            BookingError::UnitUnavailable(_) => Self::conflict(err.to_string()),
            BookingError::InvalidRange(_) => Self::validation(err.to_string()),
            BookingError::Ledger(_) => Self::internal(err.to_string()),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::BookingNotFound(id) => Self::not_found("Booking", id),
            ReconcileError::UnknownCheckout(id) => Self::not_found("Payment attempt", id),
            ReconcileError::AttemptNotFound(id) => {
                Self::not_found("Payment attempt for booking", id)
            }
            ReconcileError::AttemptAlreadyActive(_) | ReconcileError::BookingNotPayable { .. } => {
                Self::conflict(err.to_string())
            }
            ReconcileError::InvalidAmount => Self::validation(err.to_string()),
            ReconcileError::Gateway(gateway) => match gateway {
                GatewayError::Transient(_) => Self::unavailable(gateway.to_string()),
                GatewayError::Auth(_) | GatewayError::Rejected { .. } => {
                    Self::bad_gateway(gateway.to_string())
                }
            },
            ReconcileError::Internal(_) => Self::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BookingId;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_not_found() {
        let err = AppError::not_found("Booking", "123");
        assert_eq!(err.to_string(), "[NOT_FOUND] Booking with id 123 not found");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflicts_map_to_409() {
        let err: AppError = ReconcileError::AttemptAlreadyActive(BookingId::new()).into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn transient_gateway_failures_map_to_503() {
        let err: AppError =
            ReconcileError::Gateway(GatewayError::Transient("timeout".to_string())).into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn gateway_rejections_map_to_502() {
        let err: AppError = ReconcileError::Gateway(GatewayError::Rejected {
            code: "1".to_string(),
            message: "declined".to_string(),
        })
        .into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
    }
}
