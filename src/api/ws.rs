//! UI session websocket handler

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::api::ApiContext;
use crate::models::{SessionCommand, UiEvent};

pub async fn session_upgrade(ws: WebSocketUpgrade, State(context): State<ApiContext>) -> Response {
    ws.on_upgrade(move |socket| session_loop(socket, context))
}

/// Register a session with the hub and hand it the current listing.
async fn connect_session(context: &ApiContext) -> (Uuid, UnboundedReceiver<UiEvent>) {
    let (session_id, events) = context.hub.subscribe().await;
    let snapshot = UiEvent::Outlets {
        outlets: context.registry.active_outlets().await,
    };
    context.hub.send_to(session_id, snapshot).await;
    (session_id, events)
}

/// Pump hub events out and session commands in until the socket closes.
async fn session_loop(socket: WebSocket, context: ApiContext) {
    let (session_id, mut events) = connect_session(&context).await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        let frame = match serde_json::to_string(&event) {
                            Ok(frame) => frame,
                            Err(e) => {
                                tracing::error!("Failed to encode session event: {}", e);
                                continue;
                            }
                        };
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&context, &text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ping/pong are answered by axum; binary frames are ignored.
                    }
                    Some(Err(e)) => {
                        tracing::debug!("Session {} read error: {}", session_id, e);
                        break;
                    }
                }
            }
        }
    }

    context.hub.unsubscribe(session_id).await;
}

/// Dispatch one inbound frame; unparsable frames are dropped.
///
/// Commands run in their own task so a deferred confirmation never stalls
/// this session's loop.
fn handle_frame(context: &ApiContext, text: &str) {
    match serde_json::from_str::<SessionCommand>(text) {
        Ok(SessionCommand::ToggleOutlet { name }) => {
            let registry = context.registry.clone();
            tokio::spawn(async move { registry.toggle(&name).await });
        }
        Err(e) => tracing::debug!("Ignoring malformed session frame: {}", e),
    }
}
