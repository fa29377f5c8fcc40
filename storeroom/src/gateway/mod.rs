//! Outbound payment gateway adapter.
//!
//! Abstraction over an asynchronous mobile-money gateway in the Lipa Na
//! M-Pesa (STK push) style: a charge is initiated, the customer confirms on
//! their phone out-of-band, and the outcome arrives later as a callback or is
//! fetched with a status query. The client is stateless per call apart from
//! the cached OAuth token.

use crate::types::Money;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod daraja;
pub mod mock;
pub mod retry;

pub use daraja::DarajaGateway;
pub use mock::MockGateway;

/// Gateway result codes observed in callbacks and status queries
pub mod result_code {
    /// Charge completed successfully
    pub const SUCCESS: i64 = 0;
    /// Customer has insufficient funds
    pub const INSUFFICIENT_FUNDS: i64 = 1;
    /// Customer dismissed the STK prompt
    pub const CANCELLED_BY_USER: i64 = 1032;
    /// Prompt timed out before the customer answered
    pub const TIMEOUT: i64 = 1037;
}

/// A charge to push to the customer's phone
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Payer phone number in international format
    pub phone_number: String,
    /// Amount to charge
    pub amount: Money,
    /// Merchant-side reference shown on the customer statement
    pub account_reference: String,
    /// Human-readable description shown on the prompt
    pub description: String,
}

/// Correlation identifiers the gateway assigns when it accepts a charge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChargeHandle {
    /// Identifier used to correlate callbacks and status queries
    pub checkout_request_id: String,
    /// Gateway-internal request identifier
    pub merchant_request_id: String,
    /// Message the gateway showed the customer, if any
    pub customer_message: Option<String>,
}

/// Final outcome of a charge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeResult {
    /// Charge succeeded
    Paid {
        /// Gateway receipt identifier (present in callbacks, not in queries)
        receipt: Option<String>,
    },
    /// Charge failed
    Failed {
        /// Gateway result code
        code: i64,
        /// Gateway result description
        description: String,
    },
}

impl ChargeResult {
    /// Builds a result from a raw gateway result code
    #[must_use]
    pub fn from_code(code: i64, description: String, receipt: Option<String>) -> Self {
        if code == result_code::SUCCESS {
            Self::Paid { receipt }
        } else {
            Self::Failed { code, description }
        }
    }
}

/// Answer to a status query
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChargeStatus {
    /// The gateway has no outcome yet (customer has not answered the prompt)
    Pending,
    /// The gateway reached a final outcome
    Resolved(ChargeResult),
}

/// Gateway failure classification
///
/// The classification drives the reconciler: `Auth` and `Rejected` are
/// terminal for the attempt, `Transient` leaves no record and may be retried
/// by the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Credential or token failure after a transparent re-authentication
    #[error("gateway authentication failed: {0}")]
    Auth(String),

    /// The gateway explicitly declined the request
    ///
    /// Not retryable with the same parameters.
    #[error("gateway rejected the request ({code}): {message}")]
    Rejected {
        /// Gateway error code
        code: String,
        /// Gateway error message
        message: String,
    },

    /// Network failure or timeout; retryable with backoff
    #[error("transient gateway failure: {0}")]
    Transient(String),
}

impl GatewayError {
    /// Whether a retry with backoff may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Outbound payment gateway
///
/// Both operations are pure outbound I/O with no local state beyond the
/// implementation's token cache; failures are classified per [`GatewayError`].
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Initiates a charge (STK push) against the payer's phone
    ///
    /// # Errors
    ///
    /// Returns a classified [`GatewayError`].
    async fn initiate(&self, request: &ChargeRequest) -> Result<ChargeHandle, GatewayError>;

    /// Queries the current status of a previously initiated charge
    ///
    /// # Errors
    ///
    /// Returns a classified [`GatewayError`].
    async fn query(&self, checkout_request_id: &str) -> Result<ChargeStatus, GatewayError>;
}
