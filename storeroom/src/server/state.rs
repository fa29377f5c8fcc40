//! Application state for the HTTP server.

use crate::booking::BookingManager;
use crate::ingress::CallbackIngress;
use crate::inventory::InventoryLedger;
use crate::reconcile::PaymentReconciler;
use std::sync::Arc;

/// Shared state handed to every HTTP handler.
///
/// Cloned (cheaply via `Arc`) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Unit availability ledger
    pub ledger: Arc<InventoryLedger>,
    /// Booking records and transitions
    pub bookings: Arc<BookingManager>,
    /// Payment reconciliation core
    pub reconciler: Arc<PaymentReconciler>,
    /// Inbound callback boundary
    pub ingress: Arc<CallbackIngress>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(
        ledger: Arc<InventoryLedger>,
        bookings: Arc<BookingManager>,
        reconciler: Arc<PaymentReconciler>,
        ingress: Arc<CallbackIngress>,
    ) -> Self {
        Self {
            ledger,
            bookings,
            reconciler,
            ingress,
        }
    }
}
