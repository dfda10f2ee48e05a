//! HTTP API server with observability for the restaurant order workflow.
//!
//! Provides REST endpoints for order placement, staff actions, table release
//! and notification inboxes, a server-sent event stream per realtime channel,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use monitor::{PerformanceMonitor, TracingMetricSink};
use notifications::{InMemoryNotificationStore, NotificationStore};
use order_store::{ChangeFeed, InMemoryOrderStore, OrderStore};
use realtime::RealtimeHub;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use workflow::{InMemoryStaffDirectory, StaffDirectory, WorkflowEngine};

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, N>(state: Arc<AppState<S, N>>, metrics_handle: PrometheusHandle) -> Router
where
    S: OrderStore + 'static,
    N: NotificationStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S, N>))
        .route("/performance", get(routes::performance::analytics::<S, N>))
        .route("/orders", post(routes::orders::create::<S, N>))
        .route("/orders/{id}", get(routes::orders::get::<S, N>))
        .route("/orders/{id}/accept", post(routes::orders::accept::<S, N>))
        .route("/orders/{id}/reject", post(routes::orders::reject::<S, N>))
        .route("/orders/{id}/status", post(routes::orders::update_status::<S, N>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S, N>))
        .route("/restaurants/{id}/orders", get(routes::orders::list::<S, N>))
        .route("/restaurants/{id}/events", get(routes::events::restaurant::<S, N>))
        .route("/sessions/{id}/release", post(routes::sessions::release::<S, N>))
        .route(
            "/notifications/{recipient_type}/{id}",
            get(routes::notifications::inbox::<S, N>),
        )
        .route(
            "/notifications/{recipient_type}/{id}/read-all",
            post(routes::notifications::mark_all_read::<S, N>),
        )
        .route(
            "/notifications/{id}/read",
            post(routes::notifications::mark_read::<S, N>),
        )
        .route("/events/{scope}/{id}", get(routes::events::stream::<S, N>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the workflow engine over the given stores, tuned by `config`.
pub fn create_state<S, N>(
    store: S,
    notifications: N,
    staff_directory: Arc<dyn StaffDirectory>,
    config: &Config,
) -> Arc<AppState<S, N>>
where
    S: OrderStore + 'static,
    N: NotificationStore + 'static,
{
    let hub = RealtimeHub::new(config.realtime_config(), ChangeFeed::default());
    let monitor = PerformanceMonitor::new(config.monitor_config(), Arc::new(TracingMetricSink));

    let engine = WorkflowEngine::builder(store, notifications)
        .config(config.workflow_config())
        .staff_directory(staff_directory)
        .realtime(hub)
        .monitor(monitor)
        .build();

    Arc::new(AppState { engine })
}

/// Creates application state backed entirely by in-memory stores.
pub fn create_default_state(
    config: &Config,
) -> Arc<AppState<InMemoryOrderStore, InMemoryNotificationStore>> {
    create_state(
        InMemoryOrderStore::new(),
        InMemoryNotificationStore::new(),
        Arc::new(InMemoryStaffDirectory::new()),
        config,
    )
}
