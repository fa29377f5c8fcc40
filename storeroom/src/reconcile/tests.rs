//! Service-level tests for payment reconciliation.
//!
//! These drive the reconciler, booking manager, and ledger together through
//! a scripted gateway, covering the round-trip, duplicate-delivery,
//! race-commutativity, and expiry scenarios end to end.

#![allow(clippy::unwrap_used, clippy::panic)]

use crate::booking::BookingManager;
use crate::gateway::{
    ChargeResult, ChargeStatus, GatewayError, MockGateway, result_code,
};
use crate::ingress::CallbackEvent;
use crate::inventory::InventoryLedger;
use crate::notify::TracingNotifier;
use crate::reconcile::{
    Applied, PaymentAction, PaymentEnvironment, PaymentReconciler, PaymentReducer, PaymentStore,
    ReconcileError, ResolveSource,
};
use crate::types::{
    AttemptStatus, BookingStatus, CustomerContact, DateRange, Money, PaymentAttempt, StorageUnit,
    UnitId, UnitStatus,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use storeroom_core::environment::Clock;
use storeroom_testing::FixedClock;

const WAIT_WINDOW_MINUTES: i64 = 3;

struct Harness {
    ledger: Arc<InventoryLedger>,
    bookings: Arc<BookingManager>,
    gateway: Arc<MockGateway>,
    reconciler: Arc<PaymentReconciler>,
    clock: Arc<FixedClock>,
    unit_id: UnitId,
}

impl Harness {
    async fn new() -> Self {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let ledger = Arc::new(InventoryLedger::new());
        let unit = StorageUnit::new("C-11", "Industrial Area", Money::from_shillings(3_200));
        let unit_id = unit.id;
        ledger.register(unit).await;

        let bookings = Arc::new(BookingManager::new(ledger.clone(), clock.clone()));
        let gateway = Arc::new(MockGateway::new());
        let store = PaymentStore::new(PaymentEnvironment::new(clock.clone()));
        let reconciler = Arc::new(PaymentReconciler::new(
            store,
            gateway.clone(),
            bookings.clone(),
            Arc::new(TracingNotifier::new()),
            clock.clone(),
            Duration::minutes(WAIT_WINDOW_MINUTES),
        ));

        Self {
            ledger,
            bookings,
            gateway,
            reconciler,
            clock,
            unit_id,
        }
    }

    async fn booking(&self) -> crate::types::Booking {
        let today = self.clock.now().date_naive();
        self.bookings
            .create_booking(
                self.unit_id,
                CustomerContact {
                    full_name: "Achieng Odhiambo".to_string(),
                    phone_number: "254712345678".to_string(),
                    email: "achieng@example.com".to_string(),
                },
                DateRange::new(today + Duration::days(1), today + Duration::days(31)),
                Money::from_shillings(3_200),
            )
            .await
            .unwrap()
    }

    fn success_callback(&self, attempt: &PaymentAttempt) -> CallbackEvent {
        CallbackEvent {
            checkout_request_id: attempt.checkout_request_id.clone().unwrap(),
            merchant_request_id: attempt.merchant_request_id.clone().unwrap(),
            result: ChargeResult::Paid {
                receipt: Some("NLJ7RT61SV".to_string()),
            },
        }
    }
}

#[tokio::test]
async fn open_then_success_callback_round_trip() {
    let h = Harness::new().await;
    let booking = h.booking().await;

    let attempt = h
        .reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap();
    assert_eq!(attempt.status, AttemptStatus::Pending);
    assert!(attempt.checkout_request_id.is_some());
    assert_eq!(
        h.bookings.get(booking.id).await.unwrap().status,
        BookingStatus::AwaitingPayment
    );
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Reserved);

    let applied = h
        .reconciler
        .apply_callback(h.success_callback(&attempt))
        .await
        .unwrap();
    let resolved = match applied {
        Applied::Transitioned(a) => a,
        Applied::Duplicate(_) => panic!("first delivery must transition"),
    };
    assert_eq!(resolved.status, AttemptStatus::Completed);
    assert_eq!(resolved.receipt.as_deref(), Some("NLJ7RT61SV"));
    assert_eq!(h.bookings.get(booking.id).await.unwrap().status, BookingStatus::Paid);
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Occupied);

    // Re-delivering the identical callback changes nothing.
    let replay = h
        .reconciler
        .apply_callback(h.success_callback(&attempt))
        .await
        .unwrap();
    assert!(matches!(replay, Applied::Duplicate(_)));
    assert_eq!(h.bookings.get(booking.id).await.unwrap().status, BookingStatus::Paid);
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Occupied);
    assert_eq!(h.reconciler.attempts(booking.id).await.len(), 1);
}

#[tokio::test]
async fn open_rejects_second_active_attempt() {
    let h = Harness::new().await;
    let booking = h.booking().await;

    h.reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap();
    let err = h
        .reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::AttemptAlreadyActive(_)));
    assert_eq!(h.reconciler.attempts(booking.id).await.len(), 1);
}

#[tokio::test]
async fn rejected_initiation_records_failure_and_reverts() {
    let h = Harness::new().await;
    let booking = h.booking().await;
    h.gateway
        .push_initiate(Err(GatewayError::Rejected {
            code: "400.002.02".to_string(),
            message: "Bad Request - Invalid PhoneNumber".to_string(),
        }))
        .await;

    let err = h
        .reconciler
        .open(booking.id, "not-a-phone", booking.total_cost)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Gateway(GatewayError::Rejected { .. })));

    let attempts = h.reconciler.attempts(booking.id).await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, AttemptStatus::Failed);
    assert_eq!(h.bookings.get(booking.id).await.unwrap().status, BookingStatus::Failed);
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Available);
}

#[tokio::test]
async fn transient_initiation_leaves_no_record_and_allows_retry() {
    let h = Harness::new().await;
    let booking = h.booking().await;
    h.gateway
        .push_initiate(Err(GatewayError::Transient("connection reset".to_string())))
        .await;

    let err = h
        .reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Gateway(GatewayError::Transient(_))));
    assert!(h.reconciler.attempts(booking.id).await.is_empty());
    assert_eq!(h.bookings.get(booking.id).await.unwrap().status, BookingStatus::Pending);

    // Same parameters succeed once the gateway recovers.
    let attempt = h
        .reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap();
    assert_eq!(attempt.status, AttemptStatus::Pending);
}

#[tokio::test]
async fn failure_callback_reverts_booking_and_unit() {
    let h = Harness::new().await;
    let booking = h.booking().await;
    let attempt = h
        .reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap();

    let event = CallbackEvent {
        checkout_request_id: attempt.checkout_request_id.clone().unwrap(),
        merchant_request_id: attempt.merchant_request_id.clone().unwrap(),
        result: ChargeResult::Failed {
            code: result_code::CANCELLED_BY_USER,
            description: "Request cancelled by user".to_string(),
        },
    };
    h.reconciler.apply_callback(event).await.unwrap();

    let attempts = h.reconciler.attempts(booking.id).await;
    assert_eq!(attempts[0].status, AttemptStatus::Failed);
    assert_eq!(h.bookings.get(booking.id).await.unwrap().status, BookingStatus::Failed);
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Available);
}

#[tokio::test]
async fn unsolicited_callbacks_never_create_state() {
    let h = Harness::new().await;
    let event = CallbackEvent {
        checkout_request_id: "ws_CO_foreign".to_string(),
        merchant_request_id: "foreign-merchant".to_string(),
        result: ChargeResult::Paid { receipt: None },
    };
    let err = h.reconciler.apply_callback(event).await.unwrap_err();
    assert!(matches!(err, ReconcileError::UnknownCheckout(_)));
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Available);
}

#[tokio::test]
async fn query_fallback_completes_attempt_when_callback_is_lost() {
    let h = Harness::new().await;
    let booking = h.booking().await;
    h.reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap();

    h.gateway
        .push_query(Ok(ChargeStatus::Resolved(ChargeResult::Paid { receipt: None })))
        .await;
    let refreshed = h.reconciler.refresh(booking.id).await.unwrap();

    assert_eq!(refreshed.status, AttemptStatus::Completed);
    assert_eq!(h.bookings.get(booking.id).await.unwrap().status, BookingStatus::Paid);
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Occupied);
}

#[tokio::test]
async fn query_still_pending_changes_nothing() {
    let h = Harness::new().await;
    let booking = h.booking().await;
    let attempt = h
        .reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap();

    // MockGateway answers "still pending" by default.
    let refreshed = h.reconciler.refresh(booking.id).await.unwrap();
    assert_eq!(refreshed.status, AttemptStatus::Pending);
    assert_eq!(refreshed.id, attempt.id);
    assert_eq!(
        h.bookings.get(booking.id).await.unwrap().status,
        BookingStatus::AwaitingPayment
    );
}

#[tokio::test]
async fn callback_then_query_and_query_then_callback_commute() {
    // Order A: callback first, then a (now moot) query.
    let a = Harness::new().await;
    let booking_a = a.booking().await;
    let attempt_a = a
        .reconciler
        .open(booking_a.id, "254712345678", booking_a.total_cost)
        .await
        .unwrap();
    a.reconciler
        .apply_callback(a.success_callback(&attempt_a))
        .await
        .unwrap();
    // The attempt is terminal, so refresh reports it without touching the gateway.
    let after_query_a = a.reconciler.refresh(booking_a.id).await.unwrap();

    // Order B: query resolves first, then the callback arrives late.
    let b = Harness::new().await;
    let booking_b = b.booking().await;
    let attempt_b = b
        .reconciler
        .open(booking_b.id, "254712345678", booking_b.total_cost)
        .await
        .unwrap();
    b.gateway
        .push_query(Ok(ChargeStatus::Resolved(ChargeResult::Paid { receipt: None })))
        .await;
    b.reconciler.refresh(booking_b.id).await.unwrap();
    let late = b
        .reconciler
        .apply_callback(b.success_callback(&attempt_b))
        .await
        .unwrap();
    assert!(matches!(late, Applied::Duplicate(_)));
    let after_callback_b = b.reconciler.refresh(booking_b.id).await.unwrap();

    // Both interleavings land in the same place.
    assert_eq!(after_query_a.status, AttemptStatus::Completed);
    assert_eq!(after_callback_b.status, AttemptStatus::Completed);
    assert_eq!(a.bookings.get(booking_a.id).await.unwrap().status, BookingStatus::Paid);
    assert_eq!(b.bookings.get(booking_b.id).await.unwrap().status, BookingStatus::Paid);
    assert_eq!(a.ledger.get(a.unit_id).await.unwrap().status, UnitStatus::Occupied);
    assert_eq!(b.ledger.get(b.unit_id).await.unwrap().status, UnitStatus::Occupied);
}

#[tokio::test]
async fn expiry_sweep_reverts_stale_booking_and_absorbs_late_callback() {
    let h = Harness::new().await;
    let booking = h.booking().await;
    let attempt = h
        .reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap();

    // Within the window nothing expires.
    let untouched = h.bookings.expire_stale(h.clock.now(), &h.reconciler).await;
    assert!(untouched.is_empty());

    h.clock.advance(Duration::minutes(WAIT_WINDOW_MINUTES + 1));
    let reverted = h.bookings.expire_stale(h.clock.now(), &h.reconciler).await;
    assert_eq!(reverted, vec![booking.id]);

    let attempts = h.reconciler.attempts(booking.id).await;
    assert_eq!(attempts[0].status, AttemptStatus::Expired);
    assert_eq!(h.bookings.get(booking.id).await.unwrap().status, BookingStatus::Cancelled);
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Available);

    // A late success callback for the expired attempt never reopens it.
    let late = h
        .reconciler
        .apply_callback(h.success_callback(&attempt))
        .await
        .unwrap();
    assert!(matches!(late, Applied::Duplicate(_)));
    assert_eq!(h.bookings.get(booking.id).await.unwrap().status, BookingStatus::Cancelled);
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Available);
}

#[tokio::test]
async fn cancel_expires_active_attempt_and_reverts() {
    let h = Harness::new().await;
    let booking = h.booking().await;
    let attempt = h
        .reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap();

    h.reconciler.cancel(booking.id).await.unwrap();

    let attempts = h.reconciler.attempts(booking.id).await;
    assert_eq!(attempts[0].status, AttemptStatus::Expired);
    assert_eq!(h.bookings.get(booking.id).await.unwrap().status, BookingStatus::Cancelled);
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Available);

    // The cancelled attempt's callback arrives later and is absorbed.
    let late = h
        .reconciler
        .apply_callback(h.success_callback(&attempt))
        .await
        .unwrap();
    assert!(matches!(late, Applied::Duplicate(_)));
    assert_eq!(h.ledger.get(h.unit_id).await.unwrap().status, UnitStatus::Available);
}

#[tokio::test]
async fn retry_after_failure_creates_second_attempt() {
    let h = Harness::new().await;
    let booking = h.booking().await;
    let first = h
        .reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap();

    let event = CallbackEvent {
        checkout_request_id: first.checkout_request_id.clone().unwrap(),
        merchant_request_id: first.merchant_request_id.clone().unwrap(),
        result: ChargeResult::Failed {
            code: result_code::INSUFFICIENT_FUNDS,
            description: "The balance is insufficient for the transaction".to_string(),
        },
    };
    h.reconciler.apply_callback(event).await.unwrap();
    assert_eq!(h.bookings.get(booking.id).await.unwrap().status, BookingStatus::Failed);

    // The booking is terminal; a new attempt cannot be opened against it.
    let err = h
        .reconciler
        .open(booking.id, "254712345678", booking.total_cost)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::BookingNotPayable { .. }));
}

// ============================================================================
// Transition properties
// ============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    #[derive(Clone, Debug)]
    enum Step {
        Resolve(ChargeResult, ResolveSource),
        Expire,
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Resolve(
                ChargeResult::Paid {
                    receipt: Some("NLJ7RT61SV".to_string())
                },
                ResolveSource::Callback
            )),
            Just(Step::Resolve(
                ChargeResult::Paid { receipt: None },
                ResolveSource::Query
            )),
            Just(Step::Resolve(
                ChargeResult::Failed {
                    code: result_code::CANCELLED_BY_USER,
                    description: "Request cancelled by user".to_string()
                },
                ResolveSource::Callback
            )),
            Just(Step::Resolve(
                ChargeResult::Failed {
                    code: result_code::TIMEOUT,
                    description: "DS timeout".to_string()
                },
                ResolveSource::Query
            )),
            Just(Step::Expire),
        ]
    }

    fn expected_status(step: &Step) -> AttemptStatus {
        match step {
            Step::Resolve(ChargeResult::Paid { .. }, _) => AttemptStatus::Completed,
            Step::Resolve(ChargeResult::Failed { .. }, _) => AttemptStatus::Failed,
            Step::Expire => AttemptStatus::Expired,
        }
    }

    proptest! {
        /// Whatever interleaving of callbacks, queries, and expiries is
        /// applied, the first event to reach the attempt decides its final
        /// state; every later event is a no-op.
        #[test]
        fn first_event_wins_for_any_interleaving(steps in proptest::collection::vec(step_strategy(), 1..8)) {
            use storeroom_core::reducer::Reducer;

            let booking_id = crate::types::BookingId::new();
            let clock = Arc::new(FixedClock::new(Utc::now()));
            let env = PaymentEnvironment::new(clock.clone());
            let reducer = PaymentReducer::new();

            let mut state = crate::reconcile::BookingPayments::new(booking_id);
            let attempt = PaymentAttempt::initiated(
                booking_id,
                Money::from_shillings(1_000),
                "254712345678",
                clock.now(),
            )
            .with_gateway_ids("ws_CO_prop", "merchant-prop");
            reducer.reduce(&mut state, PaymentAction::RecordInitiated { attempt }, &env);
            let attempt_id = state.latest().unwrap().id;

            for step in &steps {
                let action = match step.clone() {
                    Step::Resolve(outcome, via) => PaymentAction::Resolve { attempt_id, outcome, via },
                    Step::Expire => PaymentAction::Expire { attempt_id, at: clock.now() },
                };
                reducer.reduce(&mut state, action, &env);
            }

            let final_attempt = state.attempt(attempt_id).unwrap();
            prop_assert_eq!(final_attempt.status, expected_status(&steps[0]));
            prop_assert!(final_attempt.resolved_at.is_some());
            prop_assert_eq!(state.len(), 1);
        }
    }
}
