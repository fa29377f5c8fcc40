//! Reducer for payment reconciliation.
//!
//! The sole owner of attempt transitions. Attempts only move forward
//! (`Initiated → Pending → {Completed | Failed}`, `Pending → Expired`) and
//! terminal states absorb every later action, so replayed callbacks and
//! racing query results become no-ops here rather than special cases in the
//! callers.

use crate::reconcile::{BookingPayments, PaymentAction};
use crate::gateway::ChargeResult;
use crate::types::AttemptStatus;
use std::sync::Arc;
use storeroom_core::environment::Clock;
use storeroom_core::{SmallVec, effect::Effect, reducer::Reducer};

/// Environment dependencies for the payment reducer
#[derive(Clone)]
pub struct PaymentEnvironment {
    /// Clock for transition timestamps
    pub clock: Arc<dyn Clock>,
}

impl PaymentEnvironment {
    /// Creates a new `PaymentEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Reducer for a booking's payment attempts
#[derive(Clone, Debug)]
pub struct PaymentReducer;

impl PaymentReducer {
    /// Creates a new `PaymentReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for PaymentReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for PaymentReducer {
    type State = BookingPayments;
    type Action = PaymentAction;
    type Environment = PaymentEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            PaymentAction::RecordInitiated { mut attempt } => {
                if state.active().is_some() {
                    state.last_error =
                        Some("booking already has an active payment attempt".to_string());
                    return SmallVec::new();
                }
                attempt.status = AttemptStatus::Pending;
                state.attempts.push(attempt);
                state.last_error = None;
                SmallVec::new()
            }

            PaymentAction::RecordRejected { mut attempt, reason } => {
                attempt.status = AttemptStatus::Failed;
                attempt.failure = Some(reason);
                attempt.resolved_at = Some(env.clock.now());
                state.attempts.push(attempt);
                state.last_error = None;
                SmallVec::new()
            }

            PaymentAction::Resolve {
                attempt_id,
                outcome,
                via,
            } => {
                let now = env.clock.now();
                let Some(attempt) = state.attempt_mut(attempt_id) else {
                    state.last_error = Some(format!("attempt {attempt_id} not found"));
                    return SmallVec::new();
                };
                // First terminal transition wins; everything after is a no-op.
                if attempt.status.is_terminal() {
                    return SmallVec::new();
                }
                match outcome {
                    ChargeResult::Paid { receipt } => {
                        attempt.status = AttemptStatus::Completed;
                        if receipt.is_some() {
                            attempt.receipt = receipt;
                        }
                        attempt.resolved_at = Some(now);
                        tracing::info!(
                            attempt_id = %attempt_id,
                            via = %via,
                            "payment attempt completed"
                        );
                    }
                    ChargeResult::Failed { code, description } => {
                        attempt.status = AttemptStatus::Failed;
                        attempt.failure = Some(format!("{code}: {description}"));
                        attempt.resolved_at = Some(now);
                        tracing::info!(
                            attempt_id = %attempt_id,
                            via = %via,
                            code,
                            "payment attempt failed"
                        );
                    }
                }
                state.last_error = None;
                SmallVec::new()
            }

            PaymentAction::Expire { attempt_id, at } => {
                let Some(attempt) = state.attempt_mut(attempt_id) else {
                    state.last_error = Some(format!("attempt {attempt_id} not found"));
                    return SmallVec::new();
                };
                if attempt.status.is_terminal() {
                    return SmallVec::new();
                }
                attempt.status = AttemptStatus::Expired;
                attempt.resolved_at = Some(at);
                state.last_error = None;
                SmallVec::new()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gateway::result_code;
    use crate::reconcile::ResolveSource;
    use crate::types::{BookingId, Money, PaymentAttempt};
    use chrono::Utc;
    use storeroom_testing::{FixedClock, ReducerTest, assertions};

    fn test_env() -> PaymentEnvironment {
        PaymentEnvironment::new(Arc::new(FixedClock::new(Utc::now())))
    }

    fn pending_attempt(booking_id: BookingId) -> PaymentAttempt {
        let mut attempt = PaymentAttempt::initiated(
            booking_id,
            Money::from_shillings(1_000),
            "254712345678",
            Utc::now(),
        )
        .with_gateway_ids("ws_CO_1", "merchant-1");
        attempt.status = AttemptStatus::Pending;
        attempt
    }

    #[test]
    fn record_initiated_moves_attempt_to_pending() {
        let booking_id = BookingId::new();
        let attempt = PaymentAttempt::initiated(
            booking_id,
            Money::from_shillings(1_000),
            "254712345678",
            Utc::now(),
        )
        .with_gateway_ids("ws_CO_1", "merchant-1");

        ReducerTest::new(PaymentReducer::new())
            .with_env(test_env())
            .given_state(BookingPayments::new(booking_id))
            .when_action(PaymentAction::RecordInitiated { attempt })
            .then_state(|state| {
                assert_eq!(state.len(), 1);
                let active = state.active().unwrap();
                assert_eq!(active.status, AttemptStatus::Pending);
                assert_eq!(active.checkout_request_id.as_deref(), Some("ws_CO_1"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn record_initiated_guards_against_second_active_attempt() {
        let booking_id = BookingId::new();
        let mut state = BookingPayments::new(booking_id);
        state.attempts.push(pending_attempt(booking_id));

        let second = PaymentAttempt::initiated(
            booking_id,
            Money::from_shillings(1_000),
            "254712345678",
            Utc::now(),
        );

        ReducerTest::new(PaymentReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(PaymentAction::RecordInitiated { attempt: second })
            .then_state(|state| {
                assert_eq!(state.len(), 1);
                assert!(state.last_error.is_some());
            })
            .run();
    }

    #[test]
    fn resolve_success_completes_pending_attempt() {
        let booking_id = BookingId::new();
        let attempt = pending_attempt(booking_id);
        let attempt_id = attempt.id;
        let mut state = BookingPayments::new(booking_id);
        state.attempts.push(attempt);

        ReducerTest::new(PaymentReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(PaymentAction::Resolve {
                attempt_id,
                outcome: ChargeResult::Paid {
                    receipt: Some("QGH7SK61SU".to_string()),
                },
                via: ResolveSource::Callback,
            })
            .then_state(move |state| {
                let attempt = state.attempt(attempt_id).unwrap();
                assert_eq!(attempt.status, AttemptStatus::Completed);
                assert_eq!(attempt.receipt.as_deref(), Some("QGH7SK61SU"));
                assert!(attempt.resolved_at.is_some());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn resolve_failure_fails_pending_attempt() {
        let booking_id = BookingId::new();
        let attempt = pending_attempt(booking_id);
        let attempt_id = attempt.id;
        let mut state = BookingPayments::new(booking_id);
        state.attempts.push(attempt);

        ReducerTest::new(PaymentReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(PaymentAction::Resolve {
                attempt_id,
                outcome: ChargeResult::Failed {
                    code: result_code::CANCELLED_BY_USER,
                    description: "Request cancelled by user".to_string(),
                },
                via: ResolveSource::Callback,
            })
            .then_state(move |state| {
                let attempt = state.attempt(attempt_id).unwrap();
                assert_eq!(attempt.status, AttemptStatus::Failed);
                assert!(attempt.failure.as_deref().unwrap().contains("1032"));
            })
            .run();
    }

    #[test]
    fn resolve_is_a_noop_on_terminal_attempt() {
        let booking_id = BookingId::new();
        let mut attempt = pending_attempt(booking_id);
        attempt.status = AttemptStatus::Completed;
        attempt.receipt = Some("QGH7SK61SU".to_string());
        let attempt_id = attempt.id;
        let mut state = BookingPayments::new(booking_id);
        state.attempts.push(attempt);

        ReducerTest::new(PaymentReducer::new())
            .with_env(test_env())
            .given_state(state)
            .when_action(PaymentAction::Resolve {
                attempt_id,
                outcome: ChargeResult::Failed {
                    code: result_code::TIMEOUT,
                    description: "DS timeout".to_string(),
                },
                via: ResolveSource::Query,
            })
            .then_state(move |state| {
                // A late failure never overwrites a completed attempt
                let attempt = state.attempt(attempt_id).unwrap();
                assert_eq!(attempt.status, AttemptStatus::Completed);
                assert_eq!(attempt.receipt.as_deref(), Some("QGH7SK61SU"));
            })
            .run();
    }

    #[test]
    fn expire_only_touches_non_terminal_attempts() {
        let booking_id = BookingId::new();
        let attempt = pending_attempt(booking_id);
        let attempt_id = attempt.id;
        let mut state = BookingPayments::new(booking_id);
        state.attempts.push(attempt);

        let at = Utc::now();
        ReducerTest::new(PaymentReducer::new())
            .with_env(test_env())
            .given_state(state.clone())
            .when_action(PaymentAction::Expire { attempt_id, at })
            .then_state(move |state| {
                assert_eq!(state.attempt(attempt_id).unwrap().status, AttemptStatus::Expired);
                assert!(state.active().is_none());
            })
            .run();
    }
}
