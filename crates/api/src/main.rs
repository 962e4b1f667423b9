use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clinic_core::store::{ChecklistStore, InMemoryStore};
use clinic_db::PgChecklistStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_api::config::ServerConfig;
use clinic_api::router::build_app_router;
use clinic_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clinic_api=debug,clinic_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Storage ---
    let (store, pool) = match &config.database_url {
        Some(database_url) => {
            let pool = clinic_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            clinic_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            clinic_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            let store: Arc<dyn ChecklistStore> = Arc::new(PgChecklistStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, checklists are kept in memory");
            let store: Arc<dyn ChecklistStore> = Arc::new(InMemoryStore::new());
            (store, None)
        }
    };

    // --- Event bus ---
    let event_bus = Arc::new(clinic_events::EventBus::default());
    let logger_handle = tokio::spawn(clinic_events::log_events(event_bus.subscribe()));

    // --- App state ---
    let config = Arc::new(config);
    let state = AppState::new(store, Arc::clone(&event_bus), Arc::clone(&config), pool);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // The router (and its state) is gone; dropping the last bus handle
    // closes the channel and lets the logger drain.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), logger_handle).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
