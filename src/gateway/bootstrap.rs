//! Gateway bootstrap: webhook callback, pre-subscription, initial discovery
//!
//! Runs once in a background tokio task at startup. The gateway only pushes
//! notifications after the callback URL and the pre-subscription are in
//! place, so each of those steps retries until it lands.

use std::sync::Arc;

use tokio::time::{self, Duration};
use url::Url;

use crate::config::GatewayConfig;
use crate::gateway::GatewayClient;
use crate::outlets::OutletRegistry;

/// Startup handshake with the gateway.
pub struct GatewayBootstrap {
    gateway: Arc<dyn GatewayClient>,
    registry: Arc<OutletRegistry>,
    config: GatewayConfig,
}

impl GatewayBootstrap {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        registry: Arc<OutletRegistry>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            gateway,
            registry,
            config,
        }
    }

    /// Run the handshake to completion.
    ///
    /// Steps run in order: callback registration, pre-subscription, one bulk
    /// endpoint discovery. The first two retry on a fixed delay; a discovery
    /// failure is logged and left for webhook registrations to fill in.
    pub async fn start(self: Arc<Self>) {
        let delay = Duration::from_secs(self.config.bootstrap_retry_secs);
        let Some(callback_url) = callback_url(&self.config.public_url) else {
            tracing::error!(
                "[Bootstrap] public_url {:?} is not a valid URL, gateway notifications disabled",
                self.config.public_url
            );
            return;
        };

        tracing::info!("[Bootstrap] Registering webhook callback {}", callback_url);
        while let Err(e) = self.gateway.register_webhook(&callback_url).await {
            tracing::warn!(
                "[Bootstrap] Webhook registration failed: {}, retrying in {}s",
                e,
                delay.as_secs()
            );
            time::sleep(delay).await;
        }

        tracing::info!(
            "[Bootstrap] Subscribing to {} notifications for {} endpoints",
            self.config.state_resource,
            self.config.endpoint_type
        );
        while let Err(e) = self
            .gateway
            .register_presubscription(&self.config.endpoint_type, &self.config.state_resource)
            .await
        {
            tracing::warn!(
                "[Bootstrap] Pre-subscription failed: {}, retrying in {}s",
                e,
                delay.as_secs()
            );
            time::sleep(delay).await;
        }

        match self.registry.clone().refresh_from_gateway().await {
            Ok(matched) => {
                tracing::info!("[Bootstrap] Initial discovery admitted {} outlets", matched)
            }
            Err(e) => tracing::warn!("[Bootstrap] Initial endpoint listing failed: {}", e),
        }
    }
}

/// Append the webhook route to the public base URL.
///
/// Appends as a path segment rather than RFC-3986 joining, so a path-prefixed
/// `public_url` like `http://host/iot` keeps its prefix.
fn callback_url(public_url: &str) -> Option<String> {
    let mut base = Url::parse(public_url).ok()?;
    base.path_segments_mut().ok()?.pop_if_empty().push("webhook");
    Some(base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::SessionHub;
    use crate::config::ReconcilerConfig;
    use crate::gateway::{GatewayError, ReadOutcome, WriteOutcome};
    use crate::models::{EndpointDescriptor, OutletState};
    use crate::outlets::PendingLedger;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Gateway double whose handshake steps fail a set number of times.
    struct StagedGateway {
        webhook_failures: Mutex<u32>,
        presub_failures: Mutex<u32>,
        fail_listing: bool,
        calls: Mutex<Vec<&'static str>>,
        webhook_url: Mutex<Option<String>>,
        subscription: Mutex<Option<(String, String)>>,
    }

    impl StagedGateway {
        fn new(webhook_failures: u32, presub_failures: u32, fail_listing: bool) -> Self {
            Self {
                webhook_failures: Mutex::new(webhook_failures),
                presub_failures: Mutex::new(presub_failures),
                fail_listing,
                calls: Mutex::new(Vec::new()),
                webhook_url: Mutex::new(None),
                subscription: Mutex::new(None),
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GatewayClient for StagedGateway {
        async fn read_resource(
            &self,
            _endpoint: &str,
            _resource: &str,
        ) -> Result<ReadOutcome, GatewayError> {
            Ok(ReadOutcome::Inline("1".to_string()))
        }

        async fn write_resource(
            &self,
            _endpoint: &str,
            _resource: &str,
            _value: &str,
        ) -> Result<WriteOutcome, GatewayError> {
            Ok(WriteOutcome::Inline)
        }

        async fn list_endpoints(&self) -> Result<Vec<EndpointDescriptor>, GatewayError> {
            self.calls.lock().unwrap().push("listing");
            if self.fail_listing {
                return Err(GatewayError::Status(500));
            }
            Ok(vec![EndpointDescriptor {
                name: "lamp-1".to_string(),
                endpoint_type: Some("connected-outlet".to_string()),
            }])
        }

        async fn register_webhook(&self, callback_url: &str) -> Result<(), GatewayError> {
            self.calls.lock().unwrap().push("webhook");
            let mut remaining = self.webhook_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::Transport("refused".into()));
            }
            *self.webhook_url.lock().unwrap() = Some(callback_url.to_string());
            Ok(())
        }

        async fn register_presubscription(
            &self,
            endpoint_type: &str,
            resource_path: &str,
        ) -> Result<(), GatewayError> {
            self.calls.lock().unwrap().push("presubscription");
            let mut remaining = self.presub_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::Transport("refused".into()));
            }
            *self.subscription.lock().unwrap() =
                Some((endpoint_type.to_string(), resource_path.to_string()));
            Ok(())
        }
    }

    fn bootstrap_with(gateway: Arc<StagedGateway>) -> (Arc<GatewayBootstrap>, Arc<OutletRegistry>) {
        let config = GatewayConfig {
            public_url: "http://bridge.local/".to_string(),
            ..GatewayConfig::default()
        };
        let registry = Arc::new(OutletRegistry::new(
            gateway.clone(),
            Arc::new(PendingLedger::new()),
            Arc::new(SessionHub::new()),
            config.clone(),
            ReconcilerConfig::default(),
        ));
        let bootstrap = Arc::new(GatewayBootstrap::new(gateway, registry.clone(), config));
        (bootstrap, registry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_retries_each_step_until_success() {
        let gateway = Arc::new(StagedGateway::new(2, 1, false));
        let (bootstrap, registry) = bootstrap_with(gateway.clone());

        bootstrap.start().await;

        assert_eq!(
            gateway.calls(),
            vec![
                "webhook",
                "webhook",
                "webhook",
                "presubscription",
                "presubscription",
                "listing",
            ]
        );
        assert_eq!(
            gateway.webhook_url.lock().unwrap().as_deref(),
            Some("http://bridge.local/webhook")
        );
        assert_eq!(
            gateway.subscription.lock().unwrap().clone(),
            Some(("connected-outlet".to_string(), "/Test/0/E".to_string()))
        );

        // The admitted outlet resolves through the same gateway.
        while registry.lookup("lamp-1").await.map(|o| o.state) != Some(OutletState::On) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_handshake_against_http_gateway() {
        use crate::gateway::client::RestGatewayClient;
        use serde_json::json;
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/notification/callback"))
            .and(body_json(json!({ "url": "http://bridge.local/webhook" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/subscriptions"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/endpoints"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "lamp-1", "type": "connected-outlet" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/endpoints/lamp-1/Test/0/E"))
            .respond_with(ResponseTemplate::new(200).set_body_string("1"))
            .mount(&server)
            .await;

        let config = GatewayConfig {
            base_url: server.uri(),
            public_url: "http://bridge.local/".to_string(),
            ..GatewayConfig::default()
        };
        let gateway: Arc<dyn GatewayClient> = Arc::new(RestGatewayClient::new(&config));
        let registry = Arc::new(OutletRegistry::new(
            gateway.clone(),
            Arc::new(PendingLedger::new()),
            Arc::new(SessionHub::new()),
            config.clone(),
            ReconcilerConfig::default(),
        ));

        Arc::new(GatewayBootstrap::new(gateway, registry.clone(), config))
            .start()
            .await;

        while registry.lookup("lamp-1").await.map(|o| o.state) != Some(OutletState::On) {
            time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_listing_failure_is_not_retried() {
        let gateway = Arc::new(StagedGateway::new(0, 0, true));
        let (bootstrap, registry) = bootstrap_with(gateway.clone());

        bootstrap.start().await;

        assert_eq!(gateway.calls(), vec!["webhook", "presubscription", "listing"]);
        assert_eq!(registry.known_count().await, 0);
    }

    #[test]
    fn test_callback_url() {
        assert_eq!(
            callback_url("http://bridge.local/"),
            Some("http://bridge.local/webhook".to_string())
        );
        assert_eq!(
            callback_url("http://localhost:3000"),
            Some("http://localhost:3000/webhook".to_string())
        );
        // A path prefix survives, slash-terminated or not.
        assert_eq!(
            callback_url("http://bridge.local/iot"),
            Some("http://bridge.local/iot/webhook".to_string())
        );
        assert_eq!(
            callback_url("http://bridge.local/iot/"),
            Some("http://bridge.local/iot/webhook".to_string())
        );
        assert_eq!(callback_url("not a url"), None);
    }
}
