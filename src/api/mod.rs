//! API module - HTTP routes, webhook ingress, and UI session websocket

pub mod handlers;
pub mod ws;

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};

use crate::broadcast::SessionHub;
use crate::outlets::{OutletRegistry, PendingLedger};

/// Shared service handles passed to every handler.
#[derive(Clone)]
pub struct ApiContext {
    pub registry: Arc<OutletRegistry>,
    pub ledger: Arc<PendingLedger>,
    pub hub: Arc<SessionHub>,
    pub started_at: DateTime<Utc>,
}

impl ApiContext {
    pub fn new(
        registry: Arc<OutletRegistry>,
        ledger: Arc<PendingLedger>,
        hub: Arc<SessionHub>,
    ) -> Self {
        Self {
            registry,
            ledger,
            hub,
            started_at: Utc::now(),
        }
    }
}

pub fn routes() -> Router<ApiContext> {
    Router::new()
        // Gateway-facing ingress
        .route("/webhook", put(handlers::webhook::receive_notification))
        // UI sessions
        .route("/ws", get(ws::session_upgrade))
        // Health check
        .route("/health", get(handlers::health_check))
        // Service API
        .route("/api/status", get(handlers::service_status))
        .route("/api/outlets", get(handlers::list_outlets))
        .route("/api/outlets/:name", get(handlers::get_outlet))
        .route("/api/outlets/refresh", post(handlers::refresh_outlets))
}
