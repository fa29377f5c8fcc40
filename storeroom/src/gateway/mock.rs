//! Mock payment gateway for development and testing.
//!
//! Plays the Daraja role without network I/O: responses can be scripted per
//! call, and every initiated charge is recorded for inspection. With nothing
//! scripted, initiation succeeds with generated correlation ids and queries
//! answer "still pending", which matches a customer who has not yet acted on
//! the STK prompt.

use super::{ChargeHandle, ChargeRequest, ChargeStatus, GatewayError, PaymentGateway};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Scriptable in-memory gateway
#[derive(Default)]
pub struct MockGateway {
    initiate_responses: Mutex<VecDeque<Result<ChargeHandle, GatewayError>>>,
    query_responses: Mutex<VecDeque<Result<ChargeStatus, GatewayError>>>,
    initiated: Mutex<Vec<ChargeRequest>>,
    counter: AtomicU64,
}

impl MockGateway {
    /// Creates a gateway with no scripted responses
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `initiate` response
    pub async fn push_initiate(&self, response: Result<ChargeHandle, GatewayError>) {
        self.initiate_responses.lock().await.push_back(response);
    }

    /// Scripts the next `query` response
    pub async fn push_query(&self, response: Result<ChargeStatus, GatewayError>) {
        self.query_responses.lock().await.push_back(response);
    }

    /// Charges initiated so far
    pub async fn initiated(&self) -> Vec<ChargeRequest> {
        self.initiated.lock().await.clone()
    }

    fn generated_handle(&self) -> ChargeHandle {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        ChargeHandle {
            checkout_request_id: format!("ws_CO_mock_{n:06}"),
            merchant_request_id: format!("mock-merchant-{n:06}"),
            customer_message: Some("Success. Request accepted for processing".to_string()),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initiate(&self, request: &ChargeRequest) -> Result<ChargeHandle, GatewayError> {
        self.initiated.lock().await.push(request.clone());
        match self.initiate_responses.lock().await.pop_front() {
            Some(scripted) => scripted,
            None => Ok(self.generated_handle()),
        }
    }

    async fn query(&self, _checkout_request_id: &str) -> Result<ChargeStatus, GatewayError> {
        match self.query_responses.lock().await.pop_front() {
            Some(scripted) => scripted,
            None => Ok(ChargeStatus::Pending),
        }
    }
}
