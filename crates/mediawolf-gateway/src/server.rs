//! HTTP server implementation using Axum.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use mediawolf_core::config::GatewayConfig;
use mediawolf_scheduler::TaskManager;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    /// Task manager: every task operation goes through it.
    pub manager: Arc<TaskManager>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(manager: Arc<TaskManager>) -> Self {
        Self {
            manager,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(super::routes::health_check))
        // Task API
        .route("/api/v1/tasks", get(super::routes::list_tasks))
        .route(
            "/api/v1/tasks/notifications",
            get(super::routes::task_notifications),
        )
        .route("/api/v1/tasks/{id}", get(super::routes::get_task))
        .route("/api/v1/tasks/{id}/start", post(super::routes::start_task))
        .route("/api/v1/tasks/{id}/stop", post(super::routes::stop_task))
        .route(
            "/api/v1/tasks/{id}/disable",
            post(super::routes::disable_task),
        )
        .route("/api/v1/tasks/{id}/enable", post(super::routes::enable_task))
        .route("/api/v1/tasks/{id}/cron", put(super::routes::update_task_cron))
        .route("/ws", get(super::ws::ws_handler))
        .layer(
            CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .allow_origin(Any)
                .max_age(std::time::Duration::from_secs(3600)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server and run until `shutdown` resolves.
pub async fn serve<F>(config: &GatewayConfig, manager: Arc<TaskManager>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(AppState::new(manager));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Gateway server stopped");
    Ok(())
}
