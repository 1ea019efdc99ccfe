//! Persistent bidirectional channel between the UI and the broker.
//!
//! [`Port::pair`] returns both ends: the broker keeps the [`Port`], the
//! transport (a WebSocket, a test) drives the [`RemotePort`]. Messages are
//! delivered in order. Either side may disconnect; once disconnected the
//! port accepts nothing further.

use std::fmt;

use askbridge_core::{Error, Result};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// A message posted by the broker to the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum PortMessage {
    /// A provider chunk, forwarded as-is.
    Payload(Value),
    /// `{"event": "DONE"}`
    Done,
    /// `{"error": "..."}`
    Error(String),
}

impl PortMessage {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Payload(value) => value.clone(),
            Self::Done => json!({ "event": "DONE" }),
            Self::Error(message) => json!({ "error": message }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Payload(_))
    }
}

impl Serialize for PortMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Broker end of a port.
pub struct Port {
    sender: PortSender,
    inbound: mpsc::UnboundedReceiver<Value>,
}

impl Port {
    /// Create a connected port and its remote end.
    pub fn pair() -> (Port, RemotePort) {
        let id = Uuid::new_v4();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let disconnect = CancellationToken::new();

        let port = Port {
            sender: PortSender {
                id,
                outbound: outbound_tx,
                disconnect: disconnect.clone(),
            },
            inbound: inbound_rx,
        };
        let remote = RemotePort {
            id,
            inbound: inbound_tx,
            outbound: outbound_rx,
            disconnect,
        };
        (port, remote)
    }

    pub fn id(&self) -> Uuid {
        self.sender.id
    }

    pub fn sender(&self) -> &PortSender {
        &self.sender
    }

    /// Next inbound message; `None` once the port is disconnected.
    pub async fn recv(&mut self) -> Option<Value> {
        if self.sender.disconnect.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.sender.disconnect.cancelled() => None,
            message = self.inbound.recv() => message,
        }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port").field("id", &self.id()).finish()
    }
}

/// Cloneable posting half of a [`Port`].
#[derive(Clone)]
pub struct PortSender {
    id: Uuid,
    outbound: mpsc::UnboundedSender<PortMessage>,
    disconnect: CancellationToken,
}

impl PortSender {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Post a message to the UI. Fails once the port is disconnected.
    pub fn post(&self, message: PortMessage) -> Result<()> {
        if self.disconnect.is_cancelled() {
            return Err(Error::ChannelClosed);
        }
        self.outbound.send(message).map_err(|_| {
            self.disconnect.cancel();
            Error::ChannelClosed
        })
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnect.is_cancelled() && !self.outbound.is_closed()
    }

    /// Resolves when the remote side disconnects (or already has).
    pub fn disconnected(&self) -> WaitForCancellationFuture<'_> {
        self.disconnect.cancelled()
    }

    pub fn disconnect(&self) {
        self.disconnect.cancel();
    }
}

impl fmt::Debug for PortSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortSender")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// UI end of a port. Dropping it disconnects the port.
pub struct RemotePort {
    id: Uuid,
    inbound: mpsc::UnboundedSender<Value>,
    outbound: mpsc::UnboundedReceiver<PortMessage>,
    disconnect: CancellationToken,
}

impl RemotePort {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn send(&self, message: Value) -> Result<()> {
        if self.disconnect.is_cancelled() {
            return Err(Error::ChannelClosed);
        }
        self.inbound.send(message).map_err(|_| Error::ChannelClosed)
    }

    /// Send `{"question": question}`.
    pub fn ask(&self, question: &str) -> Result<()> {
        self.send(json!({ "question": question }))
    }

    /// Next message posted by the broker; `None` once the broker side is
    /// gone and everything buffered has been read.
    pub async fn recv(&mut self) -> Option<PortMessage> {
        self.outbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PortMessage> {
        self.outbound.try_recv().ok()
    }

    pub fn disconnect(&self) {
        self.disconnect.cancel();
    }

    pub fn is_connected(&self) -> bool {
        !self.disconnect.is_cancelled()
    }

    /// Token fired on disconnect from either side.
    pub fn disconnect_token(&self) -> CancellationToken {
        self.disconnect.clone()
    }
}

impl Drop for RemotePort {
    fn drop(&mut self) {
        self.disconnect.cancel();
    }
}
