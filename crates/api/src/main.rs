//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::routes::orders::AppState;
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{NotificationStore, PostgresNotificationStore};
use order_store::{OrderStore, PostgresOrderStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use workflow::InMemoryStaffDirectory;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S, N>(state: Arc<AppState<S, N>>, metrics_handle: PrometheusHandle, addr: &str)
where
    S: OrderStore + 'static,
    N: NotificationStore + 'static,
{
    let app = api::create_app(state.clone(), metrics_handle);

    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Ends open SSE streams and realtime subscriptions.
    state.engine.close();
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let json = config.log_format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Create stores and application state, then serve
    let addr = config.addr();
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let orders = PostgresOrderStore::new(pool.clone());
            orders
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL stores");

            let state = api::create_state(
                orders,
                PostgresNotificationStore::new(pool),
                Arc::new(InMemoryStaffDirectory::new()),
                &config,
            );
            serve(state, metrics_handle, &addr).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            serve(api::create_default_state(&config), metrics_handle, &addr).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
