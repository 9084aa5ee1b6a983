//! API route handlers for the gateway.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mediawolf_scheduler::SchedulerError;
use serde::Deserialize;

use super::server::AppState;

/// A task operation that did not take effect.
pub struct ApiError(SchedulerError);

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SchedulerError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
            SchedulerError::InvalidCron { .. } | SchedulerError::InvalidTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            SchedulerError::AlreadyRunning { .. } => StatusCode::CONFLICT,
            SchedulerError::ClockStopped => StatusCode::SERVICE_UNAVAILABLE,
        };
        (
            status,
            Json(serde_json::json!({"ok": false, "error": self.0.to_string()})),
        )
            .into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mediawolf-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// List all tasks in insertion order.
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let tasks = state.manager.list().await;
    Json(serde_json::json!({"ok": true, "tasks": tasks}))
}

/// One task plus its next scheduled run, if it has a trigger.
pub async fn get_task(State(state): State<Arc<AppState>>, Path(id): Path<u32>) -> ApiResult {
    let task = state.manager.get(id).await?;
    let next_run = state
        .manager
        .engine()
        .next_fire(id)
        .await
        .map(|d| d.to_rfc3339());
    Ok(Json(serde_json::json!({"ok": true, "task": task, "next_run": next_run})))
}

pub async fn start_task(State(state): State<Arc<AppState>>, Path(id): Path<u32>) -> ApiResult {
    let task = state.manager.manual_start(id).await?;
    Ok(Json(serde_json::json!({"ok": true, "task": task})))
}

pub async fn stop_task(State(state): State<Arc<AppState>>, Path(id): Path<u32>) -> ApiResult {
    let task = state.manager.stop(id).await?;
    Ok(Json(serde_json::json!({"ok": true, "task": task})))
}

pub async fn disable_task(State(state): State<Arc<AppState>>, Path(id): Path<u32>) -> ApiResult {
    let task = state.manager.disable(id).await?;
    Ok(Json(serde_json::json!({"ok": true, "task": task})))
}

pub async fn enable_task(State(state): State<Arc<AppState>>, Path(id): Path<u32>) -> ApiResult {
    let task = state.manager.enable(id).await?;
    Ok(Json(serde_json::json!({"ok": true, "task": task})))
}

#[derive(Debug, Deserialize)]
pub struct CronUpdate {
    pub cron: String,
}

/// Replace a task's cron expression.
pub async fn update_task_cron(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u32>,
    Json(body): Json<CronUpdate>,
) -> ApiResult {
    let task = state.manager.update_cron(id, &body.cron).await?;
    Ok(Json(serde_json::json!({"ok": true, "task": task})))
}

/// Get toast history.
pub async fn task_notifications(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let notifications = state.manager.notifications();
    Json(serde_json::json!({"ok": true, "notifications": notifications}))
}
