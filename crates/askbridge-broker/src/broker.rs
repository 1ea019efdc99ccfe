//! Broker — accepts ports and one-shot messages, supervises sessions.

use std::sync::Arc;

use askbridge_core::{Error, Result};
use askbridge_providers::{ProviderSource, Resolver};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::message::{FeedbackSink, OptionsLauncher, RuntimeMessage};
use crate::port::{Port, RemotePort};
use crate::session::ConnectionSession;

/// Services one-shot messages are routed to.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<dyn Resolver>,
    pub feedback: Arc<dyn FeedbackSink>,
    pub launcher: Arc<dyn OptionsLauncher>,
}

struct Envelope {
    message: Value,
    reply: oneshot::Sender<Result<Option<Value>>>,
}

/// Unstarted broker. [`Broker::start`] spawns its supervisor task.
pub struct Broker {
    source: Arc<dyn ProviderSource>,
    services: Collaborators,
}

impl Broker {
    pub fn new(source: Arc<dyn ProviderSource>, services: Collaborators) -> Self {
        Self { source, services }
    }

    /// Start serving on the current tokio runtime.
    pub fn start(self) -> BrokerHandle {
        let (connections_tx, connections_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(Arc::new(self).supervise(
            connections_rx,
            messages_rx,
            shutdown.clone(),
        ));

        BrokerHandle {
            client: BrokerClient {
                connections: connections_tx,
                messages: messages_tx,
            },
            shutdown,
            task,
        }
    }

    async fn supervise(
        self: Arc<Self>,
        mut connections: mpsc::UnboundedReceiver<Port>,
        mut messages: mpsc::UnboundedReceiver<Envelope>,
        shutdown: CancellationToken,
    ) {
        info!("Broker started");
        let mut tasks = JoinSet::new();
        let mut connections_open = true;
        let mut messages_open = true;

        while connections_open || messages_open {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                port = connections.recv(), if connections_open => match port {
                    Some(port) => {
                        debug!("Port {} connected", port.id());
                        tasks.spawn(self.clone().serve_port(port, shutdown.child_token()));
                    }
                    None => connections_open = false,
                },
                envelope = messages.recv(), if messages_open => match envelope {
                    Some(envelope) => {
                        tasks.spawn(self.clone().answer(envelope, shutdown.child_token()));
                    }
                    None => messages_open = false,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Broker task failed: {}", e);
                    }
                }
            }
        }

        shutdown.cancel();
        let live = tasks.len();
        if live > 0 {
            info!("Broker stopping, waiting for {} task(s)", live);
        }
        while tasks.join_next().await.is_some() {}
        info!("Broker stopped");
    }

    /// One port: the first inbound message opens the session, later ones are
    /// ignored.
    async fn serve_port(self: Arc<Self>, mut port: Port, shutdown: CancellationToken) {
        let first = tokio::select! {
            message = port.recv() => message,
            _ = shutdown.cancelled() => None,
        };
        let Some(message) = first else {
            debug!("Port {} closed before asking", port.id());
            return;
        };

        let session = ConnectionSession::new(
            port.sender().clone(),
            self.source.clone(),
            shutdown.clone(),
        );
        let run = session.run(message);
        tokio::pin!(run);

        let mut inbound_open = true;
        loop {
            tokio::select! {
                _ = &mut run => break,
                extra = port.recv(), if inbound_open => match extra {
                    Some(_) => warn!("Port {}: session already started, ignoring message", port.id()),
                    None => inbound_open = false,
                },
            }
        }

        // Keep the port readable until it goes away so late questions are
        // logged rather than silently queued.
        while inbound_open {
            let extra = tokio::select! {
                message = port.recv() => message,
                _ = shutdown.cancelled() => None,
            };
            match extra {
                Some(_) => warn!("Port {}: session already finished, ignoring message", port.id()),
                None => inbound_open = false,
            }
        }
        debug!("Port {} released", port.id());
    }

    async fn answer(self: Arc<Self>, envelope: Envelope, shutdown: CancellationToken) {
        let Envelope { message, reply } = envelope;
        let result = tokio::select! {
            result = self.handle_message(message) => result,
            _ = shutdown.cancelled() => Err(Error::ChannelClosed),
        };
        if let Err(e) = &result {
            warn!("One-shot message failed: {}", e);
        }
        if reply.send(result).is_err() {
            debug!("One-shot caller went away before the reply");
        }
    }

    async fn handle_message(&self, raw: Value) -> Result<Option<Value>> {
        match RuntimeMessage::parse(raw)? {
            RuntimeMessage::Feedback { data } => {
                let token = self.services.resolver.get_access_token().await?;
                self.services.feedback.send_feedback(&token, &data).await?;
                Ok(None)
            }
            RuntimeMessage::OpenOptionsPage => {
                self.services.launcher.open_options_page()?;
                Ok(None)
            }
            RuntimeMessage::GetAccessToken => {
                let token = self.services.resolver.get_access_token().await?;
                Ok(Some(Value::String(token)))
            }
            RuntimeMessage::Unknown => {
                debug!("Ignoring unknown one-shot message");
                Ok(None)
            }
        }
    }
}

/// Cloneable entry point to a running broker.
#[derive(Clone)]
pub struct BrokerClient {
    connections: mpsc::UnboundedSender<Port>,
    messages: mpsc::UnboundedSender<Envelope>,
}

impl BrokerClient {
    /// Hand a port to the broker; it gets its own session.
    pub fn connect(&self, port: Port) -> Result<()> {
        self.connections.send(port).map_err(|_| Error::ChannelClosed)
    }

    /// Open a new port and return its remote end.
    pub fn open_port(&self) -> Result<RemotePort> {
        let (port, remote) = Port::pair();
        self.connect(port)?;
        Ok(remote)
    }

    /// Route a one-shot message and wait for its response, if any.
    pub async fn send_message(&self, message: Value) -> Result<Option<Value>> {
        let (reply, response) = oneshot::channel();
        self.messages
            .send(Envelope { message, reply })
            .map_err(|_| Error::ChannelClosed)?;
        response.await.map_err(|_| Error::ChannelClosed)?
    }
}

/// Owner handle of a running broker.
pub struct BrokerHandle {
    client: BrokerClient,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl BrokerHandle {
    pub fn client(&self) -> BrokerClient {
        self.client.clone()
    }

    pub fn connect(&self, port: Port) -> Result<()> {
        self.client.connect(port)
    }

    pub fn open_port(&self) -> Result<RemotePort> {
        self.client.open_port()
    }

    pub async fn send_message(&self, message: Value) -> Result<Option<Value>> {
        self.client.send_message(message).await
    }

    /// Cancel every live session, release their disposers and wait for the
    /// supervisor to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!("Broker supervisor ended abnormally: {}", e);
        }
    }
}
