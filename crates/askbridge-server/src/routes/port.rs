//! Persistent channel — `GET /api/port` upgrades to a WebSocket.
//!
//! Each socket becomes one broker port. Text frames carry JSON both ways;
//! closing the socket disconnects the port.

use std::sync::Arc;

use askbridge_broker::{BrokerClient, Port};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/port", get(upgrade))
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let broker = state.broker.clone();
    ws.on_upgrade(move |socket| bridge(socket, broker))
}

async fn bridge(socket: WebSocket, broker: BrokerClient) {
    let (port, mut remote) = Port::pair();
    let id = port.id();
    if let Err(e) = broker.connect(port) {
        warn!("Port {}: broker unavailable: {}", id, e);
        return;
    }
    debug!("Port {} opened", id);

    let disconnected = remote.disconnect_token();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            biased;
            outbound = remote.recv() => match outbound {
                Some(message) => {
                    let text = message.to_json().to_string();
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    // Non-JSON text is passed through as a string so the
                    // session rejects it as an invalid question.
                    let value = serde_json::from_str::<Value>(text.as_str())
                        .unwrap_or_else(|_| Value::String(text.as_str().to_owned()));
                    if remote.send(value).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Port {}: socket error: {}", id, e);
                    break;
                }
            },
            _ = disconnected.cancelled() => break,
        }
    }

    remote.disconnect();
    let _ = sink.close().await;
    debug!("Port {} closed", id);
}
