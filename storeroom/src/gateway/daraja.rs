//! Daraja (Lipa Na M-Pesa Online) gateway client.
//!
//! Speaks the Safaricom Daraja sandbox/production API: OAuth client
//! credentials, STK push initiation, and STK push status queries. The OAuth
//! token expires after roughly an hour and is never assumed valid across
//! calls; it is cached with its deadline and refreshed transparently,
//! including a one-shot re-authentication when the gateway answers 401
//! mid-call.

use super::retry::{RetryPolicy, retry_with_predicate};
use super::{ChargeHandle, ChargeRequest, ChargeResult, ChargeStatus, GatewayError, PaymentGateway};
use crate::config::DarajaConfig;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use storeroom_core::environment::Clock;
use tokio::sync::RwLock;

/// Error code Daraja uses for a status query on a transaction that is still
/// being processed.
const STILL_PROCESSING: &str = "500.001.1001";

/// Safety margin subtracted from the token deadline before reuse.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Clone, Debug)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Production gateway client for the Daraja STK push API
pub struct DarajaGateway {
    http: reqwest::Client,
    config: DarajaConfig,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    token: RwLock<Option<CachedToken>>,
}

impl DarajaGateway {
    /// Builds a client with bounded request timeouts from the configuration
    ///
    /// # Errors
    ///
    /// Returns the underlying error when the HTTP client cannot be built.
    pub fn new(config: DarajaConfig, clock: Arc<dyn Clock>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            ..RetryPolicy::default()
        };
        Ok(Self {
            http,
            config,
            clock,
            retry,
            token: RwLock::new(None),
        })
    }

    fn transient(err: &reqwest::Error) -> GatewayError {
        GatewayError::Transient(err.to_string())
    }

    /// Timestamp in the `YYYYMMDDHHmmss` format the password scheme requires
    fn timestamp(&self) -> String {
        self.clock.now().format("%Y%m%d%H%M%S").to_string()
    }

    /// STK password: Base64 of `shortcode + passkey + timestamp`
    fn password(&self, timestamp: &str) -> String {
        STANDARD.encode(format!(
            "{}{}{}",
            self.config.short_code, self.config.passkey, timestamp
        ))
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                let deadline = token.expires_at - chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS);
                if self.clock.now() < deadline {
                    return Ok(token.token.clone());
                }
            }
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *self.token.write().await = Some(fresh);
        Ok(token)
    }

    async fn fetch_token(&self) -> Result<CachedToken, GatewayError> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|e| Self::transient(&e))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
        {
            return Err(GatewayError::Auth(format!(
                "token endpoint answered {status}"
            )));
        }
        if !status.is_success() {
            return Err(GatewayError::Transient(format!(
                "token endpoint answered {status}"
            )));
        }

        let body: TokenResponse = response.json().await.map_err(|e| Self::transient(&e))?;
        let lifetime = body.expires_in.parse::<i64>().unwrap_or(3600);
        Ok(CachedToken {
            token: body.access_token,
            expires_at: self.clock.now() + chrono::Duration::seconds(lifetime),
        })
    }

    /// POSTs with a bearer token, re-authenticating once on 401
    async fn authorized_post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}{}", self.config.base_url, path);
        let token = self.access_token().await?;
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| Self::transient(&e))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // Token invalidated server-side before its deadline: refresh once.
        *self.token.write().await = None;
        let token = self.access_token().await?;
        let retried = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| Self::transient(&e))?;

        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Auth(
                "request rejected after re-authentication".to_string(),
            ));
        }
        Ok(retried)
    }

    fn classify_failure(status: StatusCode, body: Option<&DarajaErrorBody>) -> GatewayError {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return GatewayError::Auth(format!("gateway answered {status}"));
        }
        if status.is_server_error() {
            return GatewayError::Transient(format!("gateway answered {status}"));
        }
        let code = body
            .and_then(|b| b.error_code.clone())
            .unwrap_or_else(|| status.to_string());
        let message = body
            .and_then(|b| b.error_message.clone())
            .unwrap_or_else(|| "gateway declined the request".to_string());
        GatewayError::Rejected { code, message }
    }

    async fn try_initiate(&self, request: &ChargeRequest) -> Result<ChargeHandle, GatewayError> {
        let timestamp = self.timestamp();
        let payload = StkPushPayload {
            business_short_code: self.config.short_code.clone(),
            password: self.password(&timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: request.amount.shillings(),
            party_a: request.phone_number.clone(),
            party_b: self.config.short_code.clone(),
            phone_number: request.phone_number.clone(),
            call_back_url: self.config.callback_url.clone(),
            account_reference: request.account_reference.clone(),
            transaction_desc: request.description.clone(),
        };

        let response = self
            .authorized_post("/mpesa/stkpush/v1/processrequest", &payload)
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body: Option<DarajaErrorBody> = response.json().await.ok();
            return Err(Self::classify_failure(status, body.as_ref()));
        }

        let body: StkPushResponse = response.json().await.map_err(|e| Self::transient(&e))?;
        if body.response_code.as_deref() == Some("0") {
            match (body.checkout_request_id, body.merchant_request_id) {
                (Some(checkout_request_id), Some(merchant_request_id)) => {
                    tracing::info!(
                        checkout_request_id = %checkout_request_id,
                        merchant_request_id = %merchant_request_id,
                        "STK push accepted"
                    );
                    Ok(ChargeHandle {
                        checkout_request_id,
                        merchant_request_id,
                        customer_message: body.customer_message,
                    })
                }
                _ => Err(GatewayError::Transient(
                    "gateway acknowledged without correlation ids".to_string(),
                )),
            }
        } else {
            Err(GatewayError::Rejected {
                code: body.response_code.unwrap_or_else(|| "unknown".to_string()),
                message: body
                    .response_description
                    .unwrap_or_else(|| "STK push rejected".to_string()),
            })
        }
    }

    async fn try_query(&self, checkout_request_id: &str) -> Result<ChargeStatus, GatewayError> {
        let timestamp = self.timestamp();
        let payload = StkQueryPayload {
            business_short_code: self.config.short_code.clone(),
            password: self.password(&timestamp),
            timestamp,
            checkout_request_id: checkout_request_id.to_string(),
        };

        let response = self
            .authorized_post("/mpesa/stkpushquery/v1/query", &payload)
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body: Option<DarajaErrorBody> = response.json().await.ok();
            if body.as_ref().and_then(|b| b.error_code.as_deref()) == Some(STILL_PROCESSING) {
                return Ok(ChargeStatus::Pending);
            }
            return Err(Self::classify_failure(status, body.as_ref()));
        }

        let body: StkQueryResponse = response.json().await.map_err(|e| Self::transient(&e))?;
        match body.result_code {
            Some(code) => {
                let code = code.parse::<i64>().unwrap_or(-1);
                let description = body.result_desc.unwrap_or_default();
                Ok(ChargeStatus::Resolved(ChargeResult::from_code(
                    code,
                    description,
                    None,
                )))
            }
            // Accepted but no result yet: the customer has not answered.
            None => Ok(ChargeStatus::Pending),
        }
    }
}

#[async_trait]
impl PaymentGateway for DarajaGateway {
    async fn initiate(&self, request: &ChargeRequest) -> Result<ChargeHandle, GatewayError> {
        retry_with_predicate(
            &self.retry,
            || self.try_initiate(request),
            GatewayError::is_transient,
        )
        .await
    }

    async fn query(&self, checkout_request_id: &str) -> Result<ChargeStatus, GatewayError> {
        retry_with_predicate(
            &self.retry,
            || self.try_query(checkout_request_id),
            GatewayError::is_transient,
        )
        .await
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: String,
}

#[derive(Debug, Serialize)]
struct StkPushPayload {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: String,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "TransactionType")]
    transaction_type: String,
    #[serde(rename = "Amount")]
    amount: u64,
    #[serde(rename = "PartyA")]
    party_a: String,
    #[serde(rename = "PartyB")]
    party_b: String,
    #[serde(rename = "PhoneNumber")]
    phone_number: String,
    #[serde(rename = "CallBackURL")]
    call_back_url: String,
    #[serde(rename = "AccountReference")]
    account_reference: String,
    #[serde(rename = "TransactionDesc")]
    transaction_desc: String,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode")]
    response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    response_description: Option<String>,
    #[serde(rename = "CustomerMessage")]
    customer_message: Option<String>,
}

#[derive(Debug, Serialize)]
struct StkQueryPayload {
    #[serde(rename = "BusinessShortCode")]
    business_short_code: String,
    #[serde(rename = "Password")]
    password: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
}

#[derive(Debug, Deserialize)]
struct StkQueryResponse {
    #[serde(rename = "ResultCode")]
    result_code: Option<String>,
    #[serde(rename = "ResultDesc")]
    result_desc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DarajaErrorBody {
    #[serde(rename = "requestId")]
    #[allow(dead_code)]
    request_id: Option<String>,
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}
