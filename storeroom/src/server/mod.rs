//! HTTP server wiring: routes, shared state, health checks, error bridge.

pub mod error;
pub mod health;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
