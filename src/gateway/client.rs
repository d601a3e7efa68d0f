//! REST client for the device-management gateway

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::json;

use crate::config::GatewayConfig;
use crate::gateway::{GatewayClient, GatewayError, ReadOutcome, WriteOutcome};
use crate::models::EndpointDescriptor;

enum Auth {
    Bearer(String),
    Basic { username: String, password: String },
    None,
}

/// `GatewayClient` over the gateway's REST surface.
///
/// A 2xx response whose body carries `async-response-id` means the operation
/// was deferred; the actual result arrives later through the webhook.
pub struct RestGatewayClient {
    http: Client,
    base_url: String,
    auth: Auth,
}

impl RestGatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to create HTTP client");

        let auth = if let Some(token) = &config.token {
            Auth::Bearer(token.clone())
        } else if let Some(username) = &config.username {
            Auth::Basic {
                // The gateway scopes accounts by domain.
                username: format!("{}/{}", config.domain, username),
                password: config.password.clone().unwrap_or_default(),
            }
        } else {
            Auth::None
        };

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn endpoint_url(&self, endpoint: &str, resource: &str) -> String {
        format!("{}/endpoints/{}{}", self.base_url, endpoint, resource)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::None => request,
        }
    }

    async fn success_body(response: Response) -> Result<String, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }
        response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}

/// Pull the deferral token out of a response body, if there is one.
fn extract_async_token(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("async-response-id")?
        .as_str()
        .map(String::from)
}

#[async_trait]
impl GatewayClient for RestGatewayClient {
    async fn read_resource(
        &self,
        endpoint: &str,
        resource: &str,
    ) -> Result<ReadOutcome, GatewayError> {
        let url = self.endpoint_url(endpoint, resource);
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let body = Self::success_body(response).await?;
        match extract_async_token(&body) {
            Some(token) => Ok(ReadOutcome::Deferred(token)),
            None => Ok(ReadOutcome::Inline(body)),
        }
    }

    async fn write_resource(
        &self,
        endpoint: &str,
        resource: &str,
        value: &str,
    ) -> Result<WriteOutcome, GatewayError> {
        let url = self.endpoint_url(endpoint, resource);
        let response = self
            .authorize(self.http.put(&url))
            .header("Content-Type", "text/plain")
            .body(value.to_string())
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let body = Self::success_body(response).await?;
        match extract_async_token(&body) {
            Some(token) => Ok(WriteOutcome::Deferred(token)),
            None => Ok(WriteOutcome::Inline),
        }
    }

    async fn list_endpoints(&self) -> Result<Vec<EndpointDescriptor>, GatewayError> {
        let url = format!("{}/endpoints", self.base_url);
        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let body = Self::success_body(response).await?;
        serde_json::from_str(&body)
            .map_err(|e| GatewayError::Malformed(format!("endpoint listing: {}", e)))
    }

    async fn register_webhook(&self, callback_url: &str) -> Result<(), GatewayError> {
        let url = format!("{}/notification/callback", self.base_url);
        let response = self
            .authorize(self.http.put(&url))
            .json(&json!({ "url": callback_url }))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Self::success_body(response).await?;
        Ok(())
    }

    async fn register_presubscription(
        &self,
        endpoint_type: &str,
        resource_path: &str,
    ) -> Result<(), GatewayError> {
        let url = format!("{}/subscriptions", self.base_url);
        let body = json!([{
            "endpoint-type": endpoint_type,
            "resource-path": [resource_path],
        }]);
        let response = self
            .authorize(self.http.put(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Self::success_body(response).await?;
        Ok(())
    }
}
