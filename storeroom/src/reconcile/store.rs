//! Store for payment reconciliation state.
//!
//! Explicit stores addressed by booking and checkout ID, with per-key
//! serialization: every booking gets its own slot behind a `tokio::sync::Mutex`,
//! so all mutations to one booking's attempts are single-writer while two
//! different bookings proceed fully in parallel. There is no global lock on
//! the write path; the outer maps are only touched briefly to find or create
//! a slot.
//!
//! The checkout index is an explicit lookup with defined behavior on miss:
//! an unknown correlation ID yields `None` and never creates state.

use crate::reconcile::{BookingPayments, PaymentAction, PaymentEnvironment, PaymentReducer};
use crate::types::BookingId;
use std::collections::HashMap;
use std::sync::Arc;
use storeroom_core::reducer::Reducer;
use tokio::sync::{Mutex, RwLock};

/// Per-booking payment state with a checkout-id index
pub struct PaymentStore {
    reducer: PaymentReducer,
    env: PaymentEnvironment,
    slots: RwLock<HashMap<BookingId, Arc<Mutex<BookingPayments>>>>,
    by_checkout: RwLock<HashMap<String, BookingId>>,
}

impl PaymentStore {
    /// Creates an empty store
    #[must_use]
    pub fn new(env: PaymentEnvironment) -> Self {
        Self {
            reducer: PaymentReducer::new(),
            env,
            slots: RwLock::new(HashMap::new()),
            by_checkout: RwLock::new(HashMap::new()),
        }
    }

    /// The slot for a booking, created on first use
    ///
    /// Callers lock the returned mutex for the whole of one reconciliation
    /// step; that lock is the per-booking serialization discipline.
    pub async fn slot(&self, booking_id: BookingId) -> Arc<Mutex<BookingPayments>> {
        if let Some(slot) = self.slots.read().await.get(&booking_id) {
            return slot.clone();
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(booking_id)
            .or_insert_with(|| Arc::new(Mutex::new(BookingPayments::new(booking_id))))
            .clone()
    }

    /// The slot for a booking, if any attempt was ever opened
    pub async fn existing_slot(&self, booking_id: BookingId) -> Option<Arc<Mutex<BookingPayments>>> {
        self.slots.read().await.get(&booking_id).cloned()
    }

    /// Runs the reducer against a locked slot
    pub fn reduce(&self, state: &mut BookingPayments, action: PaymentAction) {
        // The payment reducer emits no effects; transitions are fully
        // described by the state change.
        let _effects = self.reducer.reduce(state, action, &self.env);
    }

    /// Indexes a gateway correlation ID for callback lookup
    pub async fn index_checkout(&self, checkout_request_id: String, booking_id: BookingId) {
        self.by_checkout
            .write()
            .await
            .insert(checkout_request_id, booking_id);
    }

    /// Booking owning the given correlation ID, `None` for foreign ids
    pub async fn booking_for_checkout(&self, checkout_request_id: &str) -> Option<BookingId> {
        self.by_checkout
            .read()
            .await
            .get(checkout_request_id)
            .copied()
    }

    /// Snapshot of a booking's attempt history
    pub async fn snapshot(&self, booking_id: BookingId) -> Option<BookingPayments> {
        let slot = self.existing_slot(booking_id).await?;
        let payments = slot.lock().await;
        Some(payments.clone())
    }
}
