//! Webhook ingress for batched gateway notifications

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::ApiContext;
use crate::models::WebhookNotification;

/// Route one notification batch into the registry and the ledger.
///
/// Registrations and updates are admitted unfiltered; the endpoint type is
/// only advisory here, bulk discovery is where type filtering happens.
pub async fn receive_notification(
    State(context): State<ApiContext>,
    Json(batch): Json<WebhookNotification>,
) -> StatusCode {
    tracing::debug!(
        "[Webhook] Batch: {} registrations, {} updates, {} removals, {} async responses",
        batch.registrations.len(),
        batch.reg_updates.len(),
        batch.de_registrations.len(),
        batch.async_responses.len()
    );

    for endpoint in batch.registrations.iter().chain(batch.reg_updates.iter()) {
        if let Some(endpoint_type) = &endpoint.endpoint_type {
            tracing::debug!(
                "[Webhook] Endpoint {} advertises type {}",
                endpoint.name,
                endpoint_type
            );
        }
        context.registry.clone().add_outlet(&endpoint.name).await;
    }

    for name in &batch.de_registrations {
        context.registry.remove_outlet(name).await;
    }

    context.ledger.resolve_batch(batch.async_responses).await;

    StatusCode::OK
}
