//! outlet-bridge - Real-time outlet control bridge
//!
//! Bridges browser UI sessions to switchable outlets behind an asynchronous
//! device-management gateway: deferred results come back through a webhook
//! and are correlated by token, transient reads retry on a fixed delay, and
//! confirmed state fans out to every connected session.

mod api;
mod broadcast;
mod config;
mod error;
mod gateway;
mod models;
mod outlets;

use std::net::SocketAddr;
use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::ApiContext;
use crate::broadcast::SessionHub;
use crate::gateway::bootstrap::GatewayBootstrap;
use crate::gateway::client::RestGatewayClient;
use crate::gateway::GatewayClient;
use crate::outlets::{OutletRegistry, PendingLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outlet_bridge=info,tower_http=debug".into()),
        )
        .init();

    tracing::info!("Starting outlet-bridge...");

    // Load configuration
    let config = config::Config::load()?;
    tracing::info!(
        "Configuration loaded (gateway: {}, endpoint type: {})",
        config.gateway.base_url,
        config.gateway.endpoint_type
    );

    // Wire up the core services
    let gateway: Arc<dyn GatewayClient> = Arc::new(RestGatewayClient::new(&config.gateway));
    let ledger = Arc::new(PendingLedger::new());
    let hub = Arc::new(SessionHub::new());
    let registry = Arc::new(OutletRegistry::new(
        gateway.clone(),
        ledger.clone(),
        hub.clone(),
        config.gateway.clone(),
        config.reconciler.clone(),
    ));

    // The gateway handshake runs alongside the server; outlets appear as
    // bootstrap discovery and webhook notifications admit them.
    let bootstrap = Arc::new(GatewayBootstrap::new(
        gateway,
        registry.clone(),
        config.gateway.clone(),
    ));
    tokio::spawn(async move {
        bootstrap.start().await;
    });

    // Build application router
    let context = ApiContext::new(registry, ledger, hub);
    let app = api::routes().with_state(context).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
