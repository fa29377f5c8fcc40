//! Storeroom HTTP server.
//!
//! Storage unit rental with M-Pesa STK push payment reconciliation.

use std::sync::Arc;
use std::time::Duration;
use storeroom::booking::BookingManager;
use storeroom::config::Config;
use storeroom::gateway::DarajaGateway;
use storeroom::ingress::CallbackIngress;
use storeroom::inventory::InventoryLedger;
use storeroom::notify::TracingNotifier;
use storeroom::reconcile::{PaymentEnvironment, PaymentReconciler, PaymentStore};
use storeroom::server::{AppState, build_router};
use storeroom::sweep::spawn_expiry_sweeper;
use storeroom::types::{Money, StorageUnit};
use storeroom_core::environment::SystemClock;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storeroom=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Storeroom HTTP Server");

    let config = Config::from_env();
    info!(
        gateway_base_url = %config.daraja.base_url,
        wait_window_secs = config.payments.wait_window_secs,
        "Configuration loaded"
    );

    let clock = Arc::new(SystemClock);

    // Inventory and bookings
    let ledger = Arc::new(InventoryLedger::new());
    seed_units(&ledger).await;
    let bookings = Arc::new(BookingManager::new(ledger.clone(), clock.clone()));

    // Gateway client
    let gateway = Arc::new(DarajaGateway::new(config.daraja.clone(), clock.clone())?);

    // Reconciliation core
    let store = PaymentStore::new(PaymentEnvironment::new(clock.clone()));
    let reconciler = Arc::new(PaymentReconciler::new(
        store,
        gateway,
        bookings.clone(),
        Arc::new(TracingNotifier::new()),
        clock.clone(),
        chrono::Duration::seconds(config.payments.wait_window_secs.try_into()?),
    ));

    // Callback boundary
    let ingress = Arc::new(CallbackIngress::new(
        reconciler.clone(),
        clock.clone(),
        chrono::Duration::seconds(config.payments.dedup_retention_secs.try_into()?),
    ));

    // The safety valve: revert bookings whose payment stalled
    let sweeper = spawn_expiry_sweeper(
        bookings.clone(),
        reconciler.clone(),
        clock.clone(),
        Duration::from_secs(config.payments.sweep_interval_secs),
    );

    let state = AppState::new(ledger, bookings, reconciler, ingress);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

/// Seed a small demo catalog (unit CRUD is out of scope for this service).
async fn seed_units(ledger: &InventoryLedger) {
    let mut unit_a = StorageUnit::new("A-01", "Nairobi West", Money::from_shillings(4_500));
    unit_a.location = Some("Ground floor, drive-up".to_string());
    unit_a.features = vec!["drive-up access".to_string(), "24/7 access".to_string()];

    let mut unit_b = StorageUnit::new("A-02", "Nairobi West", Money::from_shillings(6_000));
    unit_b.features = vec!["climate control".to_string()];

    let unit_c = StorageUnit::new("B-01", "Mombasa Road", Money::from_shillings(3_200));

    for unit in [unit_a, unit_b, unit_c] {
        info!(unit_id = %unit.id, unit_number = %unit.unit_number, "seeded unit");
        ledger.register(unit).await;
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
