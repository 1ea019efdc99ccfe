//! Per-connection session: question in, ordered answer stream out.
//!
//! ```text
//! Idle ──question──▶ AwaitingProviderSelection ──provider──▶ Streaming
//!   │                          │                               │
//!   └──────── Failed ◀─────────┴───────────────────────────────┤
//!                              Cancelled ◀── disconnect ───────┤
//!                                              Completed ◀─ DONE
//! ```
//!
//! Terminal states are absorbing; events that arrive after one are dropped.

use std::fmt;
use std::sync::Arc;

use askbridge_core::{Error, Result};
use askbridge_providers::{AnswerEvent, AnswerRequest, EventSink, ProviderSource};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cleanup::CleanupSlot;
use crate::message::QuestionMessage;
use crate::port::{PortMessage, PortSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    AwaitingProviderSelection,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    fn can_become(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, AwaitingProviderSelection) => true,
            (AwaitingProviderSelection, Streaming) => true,
            (Streaming, Completed) => true,
            (Idle | AwaitingProviderSelection | Streaming, Cancelled | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct Shared {
    id: Uuid,
    port: PortSender,
    state: watch::Sender<SessionState>,
    /// Passed to the provider; fired on disconnect or shutdown.
    signal: CancellationToken,
    slot: CleanupSlot,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move to `next` if allowed from the current state.
    fn transition(&self, next: SessionState) -> bool {
        let mut from = None;
        let changed = self.state.send_if_modified(|state| {
            if state.can_become(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });
        if let Some(from) = from {
            debug!("Session {}: {} -> {}", self.id, from, next);
        }
        changed
    }

    fn forward(&self, event: AnswerEvent) {
        match event {
            AnswerEvent::Chunk(payload) => {
                if self.state() != SessionState::Streaming {
                    debug!("Session {}: dropping chunk in {}", self.id, self.state());
                    return;
                }
                if self.port.post(PortMessage::Payload(payload)).is_err() {
                    debug!("Session {}: port closed, chunk dropped", self.id);
                }
            }
            AnswerEvent::Done => {
                if !self.transition(SessionState::Completed) {
                    debug!("Session {}: ignoring DONE in {}", self.id, self.state());
                    return;
                }
                let _ = self.port.post(PortMessage::Done);
                self.slot.finish();
            }
        }
    }

    fn fail(&self, error: Error) {
        if !self.transition(SessionState::Failed) {
            debug!(
                "Session {}: ignoring error in {}: {}",
                self.id,
                self.state(),
                error
            );
            return;
        }
        warn!("Session {} failed: {}", self.id, error);
        if self.port.is_connected() {
            let _ = self.port.post(PortMessage::Error(error.to_string()));
        }
        self.slot.finish();
    }

    fn cancel(&self) {
        if !self.transition(SessionState::Cancelled) {
            return;
        }
        info!("Session {}: port disconnected, cancelling", self.id);
        self.signal.cancel();
        self.slot.cancel();
    }
}

/// Drives one question on one port from receipt to a terminal state.
pub struct ConnectionSession {
    shared: Arc<Shared>,
    source: Arc<dyn ProviderSource>,
    shutdown: CancellationToken,
}

impl ConnectionSession {
    pub fn new(
        port: PortSender,
        source: Arc<dyn ProviderSource>,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let shared = Arc::new(Shared {
            id: port.id(),
            port,
            state,
            signal: CancellationToken::new(),
            slot: CleanupSlot::new(),
        });
        Self {
            shared,
            source,
            shutdown,
        }
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Handle `message` (expected to be a question) and return the terminal
    /// state the session ends in.
    pub async fn run(self, message: Value) -> SessionState {
        let shared = self.shared;
        let finished = CancellationToken::new();

        // Registered before the provider is called, so a disconnect at any
        // point after this reaches the cleanup slot.
        let watcher = tokio::spawn(watch_disconnect(
            shared.clone(),
            self.shutdown.clone(),
            finished.clone(),
        ));

        if let Err(error) = drive(&shared, self.source.as_ref(), message).await {
            shared.fail(error);
        }

        finished.cancel();
        if let Err(e) = watcher.await {
            warn!("Session {}: disconnect watcher failed: {}", shared.id, e);
        }

        let state = shared.state();
        info!("Session {} finished: {}", shared.id, state);
        state
    }
}

async fn watch_disconnect(shared: Arc<Shared>, shutdown: CancellationToken, finished: CancellationToken) {
    tokio::select! {
        _ = finished.cancelled() => return,
        _ = shared.port.disconnected() => {}
        _ = shutdown.cancelled() => {
            shared.port.disconnect();
        }
    }
    shared.cancel();
}

async fn drive(shared: &Arc<Shared>, source: &dyn ProviderSource, message: Value) -> Result<()> {
    let question = QuestionMessage::parse(&message)?.question;
    if !shared.transition(SessionState::AwaitingProviderSelection) {
        return Ok(());
    }

    let provider = tokio::select! {
        biased;
        _ = shared.signal.cancelled() => return Ok(()),
        provider = source.select() => provider?,
    };
    debug!("Session {}: selected provider {}", shared.id, provider.name());

    if !shared.transition(SessionState::Streaming) || !shared.slot.arm() {
        return Ok(());
    }

    let sink = {
        let shared = shared.clone();
        EventSink::new(move |event| shared.forward(event))
    };
    let request = AnswerRequest {
        prompt: question,
        signal: shared.signal.clone(),
        on_event: sink,
    };

    match provider.generate_answer(request).await {
        Ok(disposer) => shared.slot.resolve(disposer),
        Err(error) => {
            shared.slot.finish();
            return Err(error);
        }
    }

    // A provider may resolve before its stream ends.
    let mut state = shared.state.subscribe();
    loop {
        if state.borrow_and_update().is_terminal() {
            break;
        }
        if state.changed().await.is_err() {
            break;
        }
    }
    Ok(())
}
