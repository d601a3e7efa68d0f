//! HTTP handlers module

pub mod webhook;

use axum::extract::{Path, State};
use axum::{response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;

use crate::api::ApiContext;
use crate::error::AppError;
use crate::models::Outlet;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "outlet-bridge".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Service counters for dashboards and smoke checks.
pub async fn service_status(State(context): State<ApiContext>) -> impl IntoResponse {
    let uptime_secs = (Utc::now() - context.started_at).num_seconds().max(0);
    Json(serde_json::json!({
        "uptime_secs": uptime_secs,
        "sessions": context.hub.session_count().await,
        "outlets_known": context.registry.known_count().await,
        "outlets_active": context.registry.active_outlets().await.len(),
        "pending_responses": context.ledger.pending_count().await,
    }))
}

/// Active outlets, the same listing UI snapshots carry.
pub async fn list_outlets(State(context): State<ApiContext>) -> impl IntoResponse {
    Json(context.registry.active_outlets().await)
}

pub async fn get_outlet(
    State(context): State<ApiContext>,
    Path(name): Path<String>,
) -> Result<Json<Outlet>, AppError> {
    context
        .registry
        .lookup(&name)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("outlet {}", name)))
}

/// Re-run the bulk endpoint discovery on demand.
pub async fn refresh_outlets(
    State(context): State<ApiContext>,
) -> Result<Json<serde_json::Value>, AppError> {
    let matched = context.registry.clone().refresh_from_gateway().await?;
    Ok(Json(serde_json::json!({ "matched": matched })))
}
