//! Live channel over WebSocket.
//!
//! Connections arrive unauthenticated and must complete an in-band
//! `authenticate` handshake before any chat operation is accepted.
//! Messages sent over the socket are persisted first and broadcast to
//! the conversation room only after the write succeeds, so the durable
//! log and the live feed can never disagree.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use ideabridge_auth::User;
use ideabridge_chats::Message;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::registry::ConnectionHandle;
use crate::state::AppState;

/// Outbound event queue depth per connection. A slow reader that falls
/// this far behind starts losing events instead of stalling broadcasts.
const OUTBOUND_QUEUE_DEPTH: usize = 100;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Events a client may send over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Authenticate { token: String },
    JoinRoom { conversation_id: String },
    LeaveRoom { conversation_id: String },
    SendMessage { conversation_id: String, content: String },
    TypingStart { conversation_id: String },
    TypingStop { conversation_id: String },
    Ping,
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Authenticated {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    NewMessage {
        conversation_id: String,
        message: Message,
        timestamp: String,
    },
    UserTyping {
        conversation_id: String,
        user_id: String,
        is_typing: bool,
    },
    Error {
        message: String,
    },
    Pong,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_QUEUE_DEPTH);

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to serialize outbound event");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
    let handle = ConnectionHandle::new(conn_id, out_tx);
    let mut identity: Option<User> = None;

    while let Some(incoming) = stream.next().await {
        let message = match incoming {
            Ok(message) => message,
            Err(err) => {
                debug!(conn_id, error = %err, "socket read error");
                break;
            }
        };

        match message {
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    handle_client_event(event, &state, &handle, &mut identity).await;
                }
                Err(err) => {
                    debug!(conn_id, error = %err, "unparseable client event");
                    handle.send(ServerEvent::Error {
                        message: "malformed event".to_string(),
                    });
                }
            },
            WsMessage::Close(_) => break,
            // Protocol-level pings are answered by axum itself.
            _ => {}
        }
    }

    if let Some(user) = identity {
        state.registry().unregister(user.id, conn_id).await;
        state.rooms().leave_all(user.id, conn_id).await;
        info!(conn_id, user = %user.public_id, "live connection closed");
    }
    writer.abort();
}

async fn handle_client_event(
    event: ClientEvent,
    state: &AppState,
    handle: &ConnectionHandle,
    identity: &mut Option<User>,
) {
    let event = match event {
        ClientEvent::Authenticate { token } => {
            authenticate_connection(token, state, handle, identity).await;
            return;
        }
        ClientEvent::Ping => {
            handle.send(ServerEvent::Pong);
            return;
        }
        other => other,
    };

    // Everything below is a chat operation and requires the handshake.
    let Some(user) = identity.as_ref() else {
        handle.send(ServerEvent::Error {
            message: "authenticate before chat operations".to_string(),
        });
        return;
    };

    match event {
        ClientEvent::JoinRoom { conversation_id } => {
            match state
                .store()
                .participant_check(&conversation_id, user.id)
                .await
            {
                Ok(()) => {
                    state
                        .rooms()
                        .join(&conversation_id, user.id, handle.clone())
                        .await;
                }
                Err(err) => {
                    debug!(user = %user.public_id, conversation = %conversation_id, error = %err, "join rejected");
                    handle.send(ServerEvent::Error {
                        message: err.to_string(),
                    });
                }
            }
        }
        ClientEvent::LeaveRoom { conversation_id } => {
            state
                .rooms()
                .leave(&conversation_id, user.id, handle.conn_id())
                .await;
        }
        ClientEvent::SendMessage {
            conversation_id,
            content,
        } => {
            match state
                .store()
                .append_message(&conversation_id, user.id, &content)
                .await
            {
                Ok(message) => {
                    let event = ServerEvent::NewMessage {
                        conversation_id: conversation_id.clone(),
                        timestamp: message.created_at.clone(),
                        message,
                    };
                    state.rooms().broadcast(&conversation_id, event).await;
                }
                Err(err) => {
                    handle.send(ServerEvent::Error {
                        message: err.to_string(),
                    });
                }
            }
        }
        ClientEvent::TypingStart { conversation_id } => {
            relay_typing(state, user, &conversation_id, true).await;
        }
        ClientEvent::TypingStop { conversation_id } => {
            relay_typing(state, user, &conversation_id, false).await;
        }
        // Handled before the handshake gate.
        ClientEvent::Authenticate { .. } | ClientEvent::Ping => {}
    }
}

async fn authenticate_connection(
    token: String,
    state: &AppState,
    handle: &ConnectionHandle,
    identity: &mut Option<User>,
) {
    match state.authenticator().authenticate_token(&token).await {
        Ok((user, _session)) => {
            // Re-authenticating as a different identity releases the
            // previous one's registry entry and rooms first.
            if let Some(previous) = identity.take() {
                if previous.id != user.id {
                    state
                        .registry()
                        .unregister(previous.id, handle.conn_id())
                        .await;
                    state.rooms().leave_all(previous.id, handle.conn_id()).await;
                }
            }

            state.registry().register(user.id, handle.clone()).await;
            info!(user = %user.public_id, conn_id = handle.conn_id(), "live connection authenticated");
            handle.send(ServerEvent::Authenticated {
                success: true,
                user_id: Some(user.public_id.clone()),
            });
            *identity = Some(user);
        }
        Err(err) => {
            debug!(error = %err, "live handshake rejected");
            handle.send(ServerEvent::Authenticated {
                success: false,
                user_id: None,
            });
        }
    }
}

/// Typing notices are transient: never persisted, never echoed back to
/// the typist.
async fn relay_typing(state: &AppState, user: &User, conversation_id: &str, is_typing: bool) {
    let event = ServerEvent::UserTyping {
        conversation_id: conversation_id.to_string(),
        user_id: user.public_id.clone(),
        is_typing,
    };
    state
        .rooms()
        .broadcast_except(conversation_id, user.id, event)
        .await;
}
