//! Pending-response ledger: correlates deferred gateway results by token

use std::collections::HashMap;

use tokio::sync::{oneshot, Mutex};

use crate::models::DeferredResponse;

/// Maps outstanding async-response tokens to the task awaiting each result.
///
/// A waiter is a one-shot sender, so every token resolves at most once and
/// the entry leaves the map in the same step that delivers the response.
pub struct PendingLedger {
    waiters: Mutex<HashMap<String, oneshot::Sender<DeferredResponse>>>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Register a token and obtain the receiver its response will arrive on.
    ///
    /// Tokens are unique per the gateway's contract; registering one twice is
    /// a programming error and panics.
    pub async fn register(&self, token: impl Into<String>) -> oneshot::Receiver<DeferredResponse> {
        let token = token.into();
        let (tx, rx) = oneshot::channel();

        let mut waiters = self.waiters.lock().await;
        if waiters.insert(token.clone(), tx).is_some() {
            panic!("async-response token registered twice: {}", token);
        }
        tracing::debug!(
            "[Ledger] Registered token {} ({} pending)",
            token,
            waiters.len()
        );

        rx
    }

    /// Deliver a deferred response to its waiter, if one is registered.
    ///
    /// Unmatched responses are logged and dropped; returns whether the token
    /// was known.
    pub async fn resolve(&self, response: DeferredResponse) -> bool {
        let waiter = {
            let mut waiters = self.waiters.lock().await;
            waiters.remove(&response.id)
        };

        match waiter {
            Some(tx) => {
                let token = response.id.clone();
                if tx.send(response).is_err() {
                    // Waiter task already gone; the token is consumed either way.
                    tracing::debug!("[Ledger] Waiter for token {} no longer listening", token);
                }
                true
            }
            None => {
                tracing::info!(
                    "[Ledger] Dropping unmatched async response {} (status {})",
                    response.id,
                    response.status
                );
                false
            }
        }
    }

    /// Resolve a webhook batch, each entry independently of the others.
    pub async fn resolve_batch(&self, responses: Vec<DeferredResponse>) {
        for response in responses {
            self.resolve(response).await;
        }
    }

    /// Number of tokens still awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.waiters.lock().await.len()
    }
}

impl Default for PendingLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    fn response(id: &str, status: u16, payload: Option<&str>) -> DeferredResponse {
        DeferredResponse {
            id: id.to_string(),
            status,
            payload: payload.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_register_then_resolve_delivers_response() {
        let ledger = PendingLedger::new();

        let rx = ledger.register("T1").await;
        let mut waiter = tokio_test::task::spawn(rx);
        assert_pending!(waiter.poll());
        assert_eq!(ledger.pending_count().await, 1);

        assert!(ledger.resolve(response("T1", 200, Some("MQ=="))).await);

        let delivered = assert_ready!(waiter.poll()).unwrap();
        assert_eq!(delivered.status, 200);
        assert_eq!(delivered.decoded_payload().unwrap(), "1");
        assert_eq!(ledger.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_unmatched_response_is_dropped() {
        let ledger = PendingLedger::new();
        let _rx = ledger.register("T1").await;

        assert!(!ledger.resolve(response("T9", 200, None)).await);
        assert_eq!(ledger.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_batch_entries_resolve_independently() {
        let ledger = PendingLedger::new();
        let rx1 = ledger.register("T1").await;
        let rx2 = ledger.register("T2").await;

        ledger
            .resolve_batch(vec![
                response("T1", 200, Some("MA==")),
                response("unknown", 200, None),
                response("T2", 504, None),
            ])
            .await;

        assert_eq!(rx1.await.unwrap().decoded_payload().unwrap(), "0");
        let err = rx2.await.unwrap();
        assert!(err.is_error());
        assert_eq!(ledger.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_resolve_with_dropped_waiter_still_consumes_token() {
        let ledger = PendingLedger::new();
        let rx = ledger.register("T1").await;
        drop(rx);

        assert!(ledger.resolve(response("T1", 200, Some("MQ=="))).await);
        assert_eq!(ledger.pending_count().await, 0);
    }

    #[tokio::test]
    #[should_panic(expected = "registered twice")]
    async fn test_duplicate_token_panics() {
        let ledger = PendingLedger::new();
        let _rx = ledger.register("T1").await;
        let _ = ledger.register("T1").await;
    }
}
