//! Device-management gateway integration

pub mod bootstrap;
pub mod client;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::EndpointDescriptor;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway returned status {0}")]
    Status(u16),
    #[error("gateway request failed: {0}")]
    Transport(String),
    #[error("gateway response malformed: {0}")]
    Malformed(String),
}

/// How the gateway answered a resource read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Value arrived inline in the response body.
    Inline(String),
    /// Result deferred; the webhook delivers it under this token.
    Deferred(String),
}

/// How the gateway answered a resource write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Write acknowledged inline with no deferred confirmation coming.
    Inline,
    /// Result deferred; the webhook delivers it under this token.
    Deferred(String),
}

/// Transport seam between the reconciler and the gateway.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn read_resource(
        &self,
        endpoint: &str,
        resource: &str,
    ) -> Result<ReadOutcome, GatewayError>;

    async fn write_resource(
        &self,
        endpoint: &str,
        resource: &str,
        value: &str,
    ) -> Result<WriteOutcome, GatewayError>;

    async fn list_endpoints(&self) -> Result<Vec<EndpointDescriptor>, GatewayError>;

    /// Point the gateway's notification channel at our webhook.
    async fn register_webhook(&self, callback_url: &str) -> Result<(), GatewayError>;

    /// Subscribe a resource path for all endpoints of a type.
    async fn register_presubscription(
        &self,
        endpoint_type: &str,
        resource_path: &str,
    ) -> Result<(), GatewayError>;
}
