//! Session hub: fans outlet events out to connected UI sessions

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::models::UiEvent;

/// Connected UI sessions, keyed by session id.
///
/// Senders are unbounded so state fan-out never blocks the reconciler; a slow
/// session buffers in its own channel and is pruned once its receiver drops.
pub struct SessionHub {
    sessions: RwLock<HashMap<Uuid, mpsc::UnboundedSender<UiEvent>>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Add a session; returns its id and the receiver its ws loop drains.
    pub async fn subscribe(&self) -> (Uuid, mpsc::UnboundedReceiver<UiEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut sessions = self.sessions.write().await;
        sessions.insert(id, tx);
        tracing::info!("[Hub] Session {} connected ({} active)", id, sessions.len());

        (id, rx)
    }

    pub async fn unsubscribe(&self, id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(&id).is_some() {
            tracing::info!("[Hub] Session {} disconnected ({} active)", id, sessions.len());
        }
    }

    /// Deliver an event to a single session.
    pub async fn send_to(&self, id: Uuid, event: UiEvent) {
        let sessions = self.sessions.read().await;
        if let Some(tx) = sessions.get(&id) {
            let _ = tx.send(event);
        }
    }

    /// Deliver an event to every session, the originator included.
    pub async fn broadcast(&self, event: UiEvent) {
        let stale: Vec<Uuid> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, tx)| tx.send(event.clone()).is_err())
                .map(|(id, _)| *id)
                .collect()
        };

        if !stale.is_empty() {
            let mut sessions = self.sessions.write().await;
            for id in stale {
                sessions.remove(&id);
                tracing::debug!("[Hub] Pruned stale session {}", id);
            }
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}
