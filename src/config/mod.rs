//! Configuration module

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Account domain prefixed to the username for basic auth.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Access key; when set, sent as a bearer token and basic auth is unused.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Externally reachable base URL of this service, for the webhook callback.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_endpoint_type")]
    pub endpoint_type: String,
    #[serde(default = "default_state_resource")]
    pub state_resource: String,
    #[serde(default = "default_name_resource")]
    pub name_resource: String,
    #[serde(default)]
    pub protocol: ReadProtocol,
    #[serde(default = "default_bootstrap_retry_secs")]
    pub bootstrap_retry_secs: u64,
}

/// Which resources a state discovery reads, and in what order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadProtocol {
    /// State resource only.
    #[default]
    Direct,
    /// Display name first, then state.
    Named,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_max_read_attempts")]
    pub max_read_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            domain: default_domain(),
            token: None,
            username: None,
            password: None,
            public_url: default_public_url(),
            endpoint_type: default_endpoint_type(),
            state_resource: default_state_resource(),
            name_resource: default_name_resource(),
            protocol: ReadProtocol::default(),
            bootstrap_retry_secs: default_bootstrap_retry_secs(),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            max_read_attempts: default_max_read_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_domain() -> String {
    "default".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_endpoint_type() -> String {
    "connected-outlet".to_string()
}

fn default_state_resource() -> String {
    "/Test/0/E".to_string()
}

fn default_name_resource() -> String {
    "/Device/0/Name".to_string()
}

fn default_bootstrap_retry_secs() -> u64 {
    1
}

fn default_max_read_attempts() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    10
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::Environment::with_prefix("OUTLETBRIDGE").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize().unwrap_or_else(|_| Config {
            server: ServerConfig::default(),
            gateway: GatewayConfig::default(),
            reconciler: ReconcilerConfig::default(),
        });

        Ok(config)
    }
}
