//! Inbound callback boundary.
//!
//! Receives the gateway's asynchronous STK callback notifications, validates
//! and deduplicates them, and hands a normalized event to the reconciler.
//!
//! The gateway delivers callbacks at-least-once and retries on anything that
//! looks like a failure, so this boundary always acknowledges - malformed
//! payloads, replays, and internal errors are logged and absorbed, never
//! surfaced. Deduplication keys on the gateway's own transaction
//! identifiers and is retained for at least the gateway's callback-retry
//! window.

use crate::gateway::ChargeResult;
use crate::reconcile::{Applied, PaymentReconciler, ReconcileError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use storeroom_core::environment::Clock;
use tokio::sync::RwLock;

/// Normalized callback event handed to the reconciler
#[derive(Clone, Debug)]
pub struct CallbackEvent {
    /// Gateway correlation ID of the attempt
    pub checkout_request_id: String,
    /// Gateway-internal request ID
    pub merchant_request_id: String,
    /// Outcome the gateway reported
    pub result: ChargeResult,
}

impl CallbackEvent {
    /// Idempotency key derived from the gateway's transaction identifiers
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.merchant_request_id, self.checkout_request_id)
    }
}

/// Fixed acknowledgment body the gateway expects
///
/// Returned unconditionally so a broken pipeline never looks like a
/// delivery failure worth retry-storming.
#[derive(Clone, Debug, Serialize)]
pub struct CallbackAck {
    /// Always zero
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    /// Fixed description
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    /// The one acknowledgment this endpoint ever sends
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }
}

/// In-process deduplication table for recently seen callback identifiers
pub struct DedupCache {
    seen: RwLock<HashMap<String, DateTime<Utc>>>,
    retention: chrono::Duration,
}

impl DedupCache {
    /// Creates a cache that remembers identifiers for `retention`
    #[must_use]
    pub fn new(retention: chrono::Duration) -> Self {
        Self {
            seen: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Records an identifier; returns false when it was already seen
    ///
    /// Entries older than the retention window are pruned opportunistically,
    /// which keeps the table bounded by the callback-retry window.
    pub async fn observe(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut seen = self.seen.write().await;
        seen.retain(|_, first_seen| now - *first_seen < self.retention);
        match seen.get(key) {
            Some(_) => false,
            None => {
                seen.insert(key.to_string(), now);
                true
            }
        }
    }
}

/// Receives raw gateway notifications and dispatches them
pub struct CallbackIngress {
    reconciler: Arc<PaymentReconciler>,
    dedup: DedupCache,
    clock: Arc<dyn Clock>,
}

impl CallbackIngress {
    /// Creates an ingress with the given dedup retention window
    #[must_use]
    pub fn new(
        reconciler: Arc<PaymentReconciler>,
        clock: Arc<dyn Clock>,
        dedup_retention: chrono::Duration,
    ) -> Self {
        Self {
            reconciler,
            dedup: DedupCache::new(dedup_retention),
            clock,
        }
    }

    /// Handles one raw callback delivery; always acknowledges
    pub async fn receive(&self, raw: serde_json::Value) -> CallbackAck {
        let event = match parse_event(&raw) {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(%error, "malformed gateway callback dropped");
                return CallbackAck::accepted();
            }
        };

        let key = event.idempotency_key();
        if !self.dedup.observe(&key, self.clock.now()).await {
            tracing::debug!(idempotency_key = %key, "replayed gateway callback dropped");
            return CallbackAck::accepted();
        }

        match self.reconciler.apply_callback(event).await {
            Ok(Applied::Transitioned(attempt)) => {
                tracing::info!(
                    booking_id = %attempt.booking_id,
                    attempt_id = %attempt.id,
                    status = %attempt.status,
                    "callback applied"
                );
            }
            Ok(Applied::Duplicate(attempt)) => {
                tracing::debug!(
                    attempt_id = %attempt.id,
                    "callback for already-terminal attempt absorbed"
                );
            }
            // A callback for a stale or foreign transaction; nothing to do.
            Err(ReconcileError::UnknownCheckout(checkout_request_id)) => {
                tracing::warn!(
                    checkout_request_id = %checkout_request_id,
                    "callback matched no payment attempt, discarded"
                );
            }
            Err(error) => {
                tracing::error!(%error, "callback processing failed");
            }
        }

        CallbackAck::accepted()
    }
}

/// Daraja STK callback envelope: `Body.stkCallback.{...}`
#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
    #[serde(rename = "Body")]
    body: CallbackBody,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    result_code: i64,
    #[serde(rename = "ResultDesc")]
    result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata")]
    callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
struct CallbackMetadata {
    #[serde(rename = "Item")]
    item: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value")]
    value: Option<serde_json::Value>,
}

fn parse_event(raw: &serde_json::Value) -> Result<CallbackEvent, serde_json::Error> {
    let envelope: CallbackEnvelope = serde_json::from_value(raw.clone())?;
    let callback = envelope.body.stk_callback;

    let receipt = callback.callback_metadata.as_ref().and_then(|metadata| {
        metadata
            .item
            .iter()
            .find(|item| item.name == "MpesaReceiptNumber")
            .and_then(|item| item.value.as_ref())
            .and_then(|value| value.as_str())
            .map(str::to_string)
    });

    let description = callback
        .result_desc
        .unwrap_or_else(|| "no result description".to_string());

    Ok(CallbackEvent {
        checkout_request_id: callback.checkout_request_id,
        merchant_request_id: callback.merchant_request_id,
        result: ChargeResult::from_code(callback.result_code, description, receipt),
    })
}
