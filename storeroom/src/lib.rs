//! Storeroom - reservable storage units with asynchronous payment reconciliation.
//!
//! Tracks unit availability, creates bookings against units, and reconciles
//! payment for those bookings through an external mobile-money gateway
//! (M-Pesa STK push): initiate, customer confirms out-of-band, the gateway
//! delivers a callback, with a status-query fallback when no callback
//! arrives.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────┐
//!  POST /bookings ──►│  BookingManager  │◄─── expiry sweep
//!                    └───────┬──────────┘
//!                            │ sole mutator
//!                    ┌───────▼──────────┐
//!                    │ InventoryLedger  │  Available ⇄ Reserved → Occupied
//!                    └──────────────────┘
//!                    ┌──────────────────┐      ┌──────────────────┐
//!  POST /payments ──►│ PaymentReconciler│─────►│  GatewayClient   │──► Daraja
//!                    │  (state machine) │      └──────────────────┘
//!  callbacks ───────►│  per-booking     │
//!  status queries ──►│  serialization   │
//!                    └──────────────────┘
//! ```
//!
//! The hard part is the reconciler: correlating duplicate, out-of-order,
//! partially-reliable gateway events back to one booking without ever
//! double-booking a unit, double-finalizing a booking, or stranding a unit
//! in `Reserved` when a callback is lost. Terminal attempt states absorb
//! every later event, which makes replays no-ops and makes the callback and
//! query paths commute.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod booking;
pub mod config;
pub mod gateway;
pub mod ingress;
pub mod inventory;
pub mod notify;
pub mod reconcile;
pub mod server;
pub mod sweep;
pub mod types;

pub use booking::BookingManager;
pub use config::Config;
pub use ingress::CallbackIngress;
pub use inventory::InventoryLedger;
pub use reconcile::PaymentReconciler;
pub use types::*;
