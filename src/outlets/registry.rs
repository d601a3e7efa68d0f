//! Outlet registry and state reconciler

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::broadcast::SessionHub;
use crate::config::{GatewayConfig, ReadProtocol, ReconcilerConfig};
use crate::gateway::{GatewayClient, GatewayError, ReadOutcome, WriteOutcome};
use crate::models::{Outlet, OutletSnapshot, OutletState, UiEvent};
use crate::outlets::ledger::PendingLedger;

/// One resource read within a discovery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStep {
    DisplayName,
    State,
}

impl ReadStep {
    fn resource<'a>(&self, config: &'a GatewayConfig) -> &'a str {
        match self {
            ReadStep::DisplayName => &config.name_resource,
            ReadStep::State => &config.state_resource,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReadStep::DisplayName => "display-name",
            ReadStep::State => "state",
        }
    }
}

/// Authoritative outlet table plus the reconciliation flows that mutate it.
///
/// The registry is the single writer of outlet state. An outlet is UNKNOWN
/// from admission until its first state read resolves, and again while a
/// switch command is in flight; UNKNOWN outlets never appear in listings, so
/// the UNKNOWN check doubles as the guard against issuing a second command
/// while one is outstanding.
pub struct OutletRegistry {
    outlets: RwLock<HashMap<String, Outlet>>,
    gateway: Arc<dyn GatewayClient>,
    ledger: Arc<PendingLedger>,
    hub: Arc<SessionHub>,
    gateway_config: GatewayConfig,
    reconciler: ReconcilerConfig,
}

impl OutletRegistry {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        ledger: Arc<PendingLedger>,
        hub: Arc<SessionHub>,
        gateway_config: GatewayConfig,
        reconciler: ReconcilerConfig,
    ) -> Self {
        Self {
            outlets: RwLock::new(HashMap::new()),
            gateway,
            ledger,
            hub,
            gateway_config,
            reconciler,
        }
    }

    /// Admit an outlet and kick off state discovery in the background.
    ///
    /// A re-registration of an outlet whose state is already resolved is a
    /// no-op; one still UNKNOWN (e.g. a device that rebooted mid-discovery)
    /// is re-admitted and discovery starts over.
    pub async fn add_outlet(self: Arc<Self>, name: &str) {
        {
            let mut outlets = self.outlets.write().await;
            if let Some(outlet) = outlets.get(name) {
                if outlet.state != OutletState::Unknown {
                    tracing::debug!(
                        "[Registry] {} already tracked with resolved state, ignoring",
                        name
                    );
                    return;
                }
            }
            outlets.insert(name.to_string(), Outlet::new(name));
        }

        tracing::info!("[Registry] Tracking outlet {}", name);

        let name = name.to_string();
        tokio::spawn(async move {
            self.discover_state(&name).await;
        });
    }

    /// Drop an outlet and push the refreshed listing to every session.
    ///
    /// Safe on an absent name; the listing still goes out.
    pub async fn remove_outlet(&self, name: &str) {
        let existed = {
            let mut outlets = self.outlets.write().await;
            outlets.remove(name).is_some()
        };
        if existed {
            tracing::info!("[Registry] Removed outlet {}", name);
        }
        self.broadcast_snapshot().await;
    }

    /// Pull the gateway's endpoint listing and admit every endpoint of the
    /// configured outlet type. Returns how many matched.
    pub async fn refresh_from_gateway(self: Arc<Self>) -> Result<usize, GatewayError> {
        let endpoints = self.gateway.list_endpoints().await?;
        let total = endpoints.len();

        let mut matched = 0;
        for endpoint in endpoints {
            if endpoint.endpoint_type.as_deref() == Some(self.gateway_config.endpoint_type.as_str())
            {
                self.clone().add_outlet(&endpoint.name).await;
                matched += 1;
            }
        }

        tracing::info!(
            "[Registry] Endpoint listing returned {} endpoints, {} of type {}",
            total,
            matched,
            self.gateway_config.endpoint_type
        );
        Ok(matched)
    }

    /// Resolve an outlet's resources, one read step at a time.
    ///
    /// `direct` reads the state resource only; `named` resolves the display
    /// name first. Each step retries transient failures on a fixed delay and
    /// removes the outlet once attempts are exhausted.
    pub async fn discover_state(&self, name: &str) {
        let steps: &[ReadStep] = match self.gateway_config.protocol {
            ReadProtocol::Direct => &[ReadStep::State],
            ReadProtocol::Named => &[ReadStep::DisplayName, ReadStep::State],
        };

        for step in steps {
            if !self.run_read_step(name, *step).await {
                return;
            }
        }
    }

    /// Execute one read step to completion. Returns whether the pipeline may
    /// continue to the next step.
    async fn run_read_step(&self, name: &str, step: ReadStep) -> bool {
        let resource = step.resource(&self.gateway_config);
        let mut attempt: u32 = 0;

        loop {
            // The outlet may have been removed while this step slept.
            if !self.contains(name).await {
                return false;
            }
            attempt += 1;

            match self.gateway.read_resource(name, resource).await {
                Ok(ReadOutcome::Inline(value)) => {
                    self.apply_read(name, step, &value).await;
                    return true;
                }
                Ok(ReadOutcome::Deferred(token)) => {
                    tracing::debug!(
                        "[Registry] {} read for {} deferred under token {}",
                        step.label(),
                        name,
                        token
                    );
                    return self.await_deferred_read(name, step, token).await;
                }
                Err(e) => {
                    if attempt >= self.reconciler.max_read_attempts {
                        tracing::warn!(
                            "[Registry] Giving up on {} after {} failed {} reads: {}",
                            name,
                            attempt,
                            step.label(),
                            e
                        );
                        self.remove_outlet(name).await;
                        return false;
                    }
                    tracing::debug!(
                        "[Registry] {} read for {} failed (attempt {}/{}): {}",
                        step.label(),
                        name,
                        attempt,
                        self.reconciler.max_read_attempts,
                        e
                    );
                    tokio::time::sleep(Duration::from_secs(self.reconciler.retry_delay_secs)).await;
                }
            }
        }
    }

    /// Wait out a deferred read and apply its eventual result.
    async fn await_deferred_read(&self, name: &str, step: ReadStep, token: String) -> bool {
        let rx = self.ledger.register(token).await;
        let response = match rx.await {
            Ok(response) => response,
            // Ledger dropped; the process is shutting down.
            Err(_) => return false,
        };

        if response.is_error() {
            tracing::warn!(
                "[Registry] Deferred {} read for {} failed with status {}, removing",
                step.label(),
                name,
                response.status
            );
            self.remove_outlet(name).await;
            return false;
        }

        match response.decoded_payload() {
            Ok(value) => self.apply_read(name, step, &value).await,
            Err(e) => {
                tracing::warn!(
                    "[Registry] Discarding {} payload for {}: {}",
                    step.label(),
                    name,
                    e
                );
            }
        }
        true
    }

    /// Apply a successfully read value for one step.
    async fn apply_read(&self, name: &str, step: ReadStep, raw: &str) {
        match step {
            ReadStep::DisplayName => {
                // The outlet is still UNKNOWN here, so no broadcast yet.
                let mut outlets = self.outlets.write().await;
                if let Some(outlet) = outlets.get_mut(name) {
                    outlet.display_name = Some(raw.trim().to_string());
                }
            }
            ReadStep::State => {
                let Some(state) = OutletState::parse_wire(raw) else {
                    tracing::warn!(
                        "[Registry] Unparsable state value {:?} for {}, keeping prior state",
                        raw,
                        name
                    );
                    return;
                };

                let applied = {
                    let mut outlets = self.outlets.write().await;
                    match outlets.get_mut(name) {
                        Some(outlet) => {
                            outlet.state = state;
                            outlet.target_state = None;
                            true
                        }
                        None => false,
                    }
                };

                if applied {
                    tracing::info!("[Registry] {} resolved to {}", name, state);
                    self.broadcast_snapshot().await;
                }
            }
        }
    }

    /// Flip an outlet to the complement of its current state.
    ///
    /// Rejected while the state is unresolved; that one check also debounces
    /// a toggle arriving while a previous one is still pending. The UNKNOWN
    /// transition goes out immediately so every UI shows a pending indicator,
    /// and the final state goes out once the gateway confirms.
    pub async fn toggle(&self, name: &str) {
        let target = {
            let mut outlets = self.outlets.write().await;
            let Some(outlet) = outlets.get_mut(name) else {
                tracing::debug!("[Registry] Toggle for untracked outlet {}, ignoring", name);
                return;
            };
            let Some(target) = outlet.state.complement() else {
                tracing::debug!(
                    "[Registry] Toggle for {} while state unresolved, ignoring",
                    name
                );
                return;
            };
            outlet.state = OutletState::Unknown;
            outlet.target_state = Some(target);
            target
        };

        self.hub
            .broadcast(UiEvent::UpdateOutletState {
                name: name.to_string(),
                state: OutletState::Unknown,
            })
            .await;
        tracing::info!("[Registry] Switching {} {}", name, target);

        let resource = &self.gateway_config.state_resource;
        match self
            .gateway
            .write_resource(name, resource, target.wire_value())
            .await
        {
            Err(e) => {
                // Write failures are not retried; the device is presumed gone.
                tracing::warn!("[Registry] Switch of {} failed: {}, removing", name, e);
                self.remove_outlet(name).await;
            }
            Ok(WriteOutcome::Inline) => {
                tracing::warn!(
                    "[Registry] Switch of {} acknowledged inline with no token, re-reading state",
                    name
                );
                self.discover_state(name).await;
            }
            Ok(WriteOutcome::Deferred(token)) => {
                let rx = self.ledger.register(token).await;
                let response = match rx.await {
                    Ok(response) => response,
                    Err(_) => return,
                };
                if response.is_error() {
                    tracing::warn!(
                        "[Registry] Switch of {} reported status {}, re-reading state",
                        name,
                        response.status
                    );
                    self.discover_state(name).await;
                } else {
                    self.commit_target(name).await;
                }
            }
        }
    }

    /// Commit a confirmed switch and push the delta.
    async fn commit_target(&self, name: &str) {
        let committed = {
            let mut outlets = self.outlets.write().await;
            match outlets.get_mut(name) {
                Some(outlet) => match outlet.target_state.take() {
                    Some(target) => {
                        outlet.state = target;
                        Some(target)
                    }
                    None => None,
                },
                None => None,
            }
        };

        if let Some(state) = committed {
            tracing::info!("[Registry] {} confirmed {}", name, state);
            self.hub
                .broadcast(UiEvent::UpdateOutletState {
                    name: name.to_string(),
                    state,
                })
                .await;
        }
    }

    /// Outlets with a resolved state, in no particular order.
    pub async fn active_outlets(&self) -> Vec<OutletSnapshot> {
        let outlets = self.outlets.read().await;
        outlets
            .values()
            .filter(|outlet| outlet.state != OutletState::Unknown)
            .map(OutletSnapshot::from)
            .collect()
    }

    pub async fn lookup(&self, name: &str) -> Option<Outlet> {
        self.outlets.read().await.get(name).cloned()
    }

    /// Every tracked outlet, resolved or not.
    pub async fn known_count(&self) -> usize {
        self.outlets.read().await.len()
    }

    async fn contains(&self, name: &str) -> bool {
        self.outlets.read().await.contains_key(name)
    }

    async fn broadcast_snapshot(&self) {
        let outlets = self.active_outlets().await;
        self.hub.broadcast(UiEvent::Outlets { outlets }).await;
    }
}
