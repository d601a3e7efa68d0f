//! Data models for outlet-bridge

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Outlet State
// ============================================================================

/// Believed state of an outlet, encoded as {1, 0, -1} on every wire surface.
///
/// `Unknown` is both the initial state and the transient "command in flight"
/// marker; outlets in `Unknown` never appear in snapshot listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum OutletState {
    On,
    Off,
    Unknown,
}

impl OutletState {
    /// The state a toggle drives toward, if the current state is resolved.
    pub fn complement(self) -> Option<OutletState> {
        match self {
            OutletState::On => Some(OutletState::Off),
            OutletState::Off => Some(OutletState::On),
            OutletState::Unknown => None,
        }
    }

    /// Integer string written to the device's state resource.
    pub fn wire_value(self) -> &'static str {
        match self {
            OutletState::On => "1",
            OutletState::Off => "0",
            OutletState::Unknown => "-1",
        }
    }

    /// Parse a state payload as read back from the device.
    pub fn parse_wire(payload: &str) -> Option<OutletState> {
        payload
            .trim()
            .parse::<i8>()
            .ok()
            .and_then(|raw| OutletState::try_from(raw).ok())
    }
}

impl From<OutletState> for i8 {
    fn from(state: OutletState) -> i8 {
        match state {
            OutletState::On => 1,
            OutletState::Off => 0,
            OutletState::Unknown => -1,
        }
    }
}

impl TryFrom<i8> for OutletState {
    type Error = String;

    fn try_from(raw: i8) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(OutletState::On),
            0 => Ok(OutletState::Off),
            -1 => Ok(OutletState::Unknown),
            other => Err(format!("invalid outlet state: {}", other)),
        }
    }
}

impl fmt::Display for OutletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutletState::On => write!(f, "on"),
            OutletState::Off => write!(f, "off"),
            OutletState::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Outlet Records
// ============================================================================

/// An outlet record as owned by the registry.
#[derive(Debug, Clone, Serialize)]
pub struct Outlet {
    pub name: String,
    pub state: OutletState,
    /// Set only while a write toward this state is outstanding.
    #[serde(rename = "targetState", skip_serializing_if = "Option::is_none")]
    pub target_state: Option<OutletState>,
    /// Secondary label, resolved by the name-then-state protocol variant.
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Outlet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: OutletState::Unknown,
            target_state: None,
            display_name: None,
        }
    }
}

/// UI-facing projection of an outlet; the in-flight target never leaves the
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutletSnapshot {
    pub name: String,
    pub state: OutletState,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl From<&Outlet> for OutletSnapshot {
    fn from(outlet: &Outlet) -> Self {
        Self {
            name: outlet.name.clone(),
            state: outlet.state,
            display_name: outlet.display_name.clone(),
        }
    }
}

// ============================================================================
// UI Session Events
// ============================================================================

/// Outbound events pushed to connected UI sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum UiEvent {
    /// Full active-outlet listing; sent on connect and on membership changes.
    Outlets { outlets: Vec<OutletSnapshot> },
    /// Single-outlet state delta.
    UpdateOutletState { name: String, state: OutletState },
}

/// Inbound commands parsed from UI session frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionCommand {
    ToggleOutlet { name: String },
}

// ============================================================================
// Gateway Listing & Webhook Notifications
// ============================================================================

/// Endpoint descriptor from the gateway's bulk listing.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointDescriptor {
    pub name: String,
    #[serde(rename = "type", default)]
    pub endpoint_type: Option<String>,
}

/// One endpoint entry in a registration/update notification.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointNotification {
    #[serde(rename = "ep")]
    pub name: String,
    #[serde(rename = "ept", default)]
    pub endpoint_type: Option<String>,
}

/// Batched notification body delivered to the webhook by the gateway.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookNotification {
    #[serde(default)]
    pub registrations: Vec<EndpointNotification>,
    #[serde(default, rename = "reg-updates")]
    pub reg_updates: Vec<EndpointNotification>,
    #[serde(default, rename = "de-registrations")]
    pub de_registrations: Vec<String>,
    #[serde(default, rename = "async-responses")]
    pub async_responses: Vec<DeferredResponse>,
}

/// A resolved deferred result, correlated back to its request by `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeferredResponse {
    pub id: String,
    pub status: u16,
    /// Base64-encoded resource value, when the operation carries one.
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("response carries no payload")]
    Missing,
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl DeferredResponse {
    /// Client and server error statuses both count as failure.
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }

    /// Decode the base64 payload to the value string it carries.
    pub fn decoded_payload(&self) -> Result<String, PayloadError> {
        let encoded = self.payload.as_deref().ok_or(PayloadError::Missing)?;
        Ok(String::from_utf8(BASE64.decode(encoded)?)?)
    }
}
