//! Background expiry sweep.
//!
//! Periodically expires payment attempts that outlived the wait window and
//! reverts their bookings, so a lost callback can never strand a unit in
//! `Reserved`.

use crate::booking::BookingManager;
use crate::reconcile::PaymentReconciler;
use std::sync::Arc;
use std::time::Duration;
use storeroom_core::environment::Clock;
use tokio::task::JoinHandle;

/// Spawns the sweep loop; abort the handle on shutdown.
pub fn spawn_expiry_sweeper(
    bookings: Arc<BookingManager>,
    reconciler: Arc<PaymentReconciler>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let reverted = bookings.expire_stale(clock.now(), &reconciler).await;
            if !reverted.is_empty() {
                tracing::info!(count = reverted.len(), "expired stale bookings");
            }
        }
    })
}
