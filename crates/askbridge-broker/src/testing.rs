//! Scripted providers and collaborators for broker tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use askbridge_core::{Error, Result};
use askbridge_providers::{
    AnswerEvent, AnswerProvider, AnswerRequest, Disposer, ProviderConfigs, ProviderSource,
    Resolver,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::message::{FeedbackSink, OptionsLauncher};
use crate::port::{PortMessage, RemotePort};

#[derive(Debug, Clone)]
pub enum Step {
    Chunk(&'static str),
    Done,
    Sleep(u64),
    /// Wait until the request signal fires.
    AwaitCancel,
    Fail(&'static str),
}

#[derive(Default)]
pub struct Tracker {
    pub calls: AtomicUsize,
    pub disposed: AtomicUsize,
    pub saw_cancel: AtomicBool,
}

impl Tracker {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn saw_cancel(&self) -> bool {
        self.saw_cancel.load(Ordering::SeqCst)
    }
}

/// Plays a step list, chosen by prompt, then resolves its disposer after
/// `disposer_delay`.
#[derive(Clone)]
pub struct ScriptedProvider {
    scripts: Arc<HashMap<String, Vec<Step>>>,
    fallback: Arc<Vec<Step>>,
    disposer_delay: Duration,
    tracker: Arc<Tracker>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            scripts: Arc::new(HashMap::new()),
            fallback: Arc::new(steps),
            disposer_delay: Duration::ZERO,
            tracker: Arc::new(Tracker::default()),
        }
    }

    pub fn with_script(mut self, prompt: &str, steps: Vec<Step>) -> Self {
        Arc::make_mut(&mut self.scripts).insert(prompt.to_string(), steps);
        self
    }

    pub fn with_disposer_delay(mut self, delay: Duration) -> Self {
        self.disposer_delay = delay;
        self
    }

    pub fn tracker(&self) -> Arc<Tracker> {
        self.tracker.clone()
    }

    async fn play(&self, request: AnswerRequest) -> Result<Disposer> {
        self.tracker.calls.fetch_add(1, Ordering::SeqCst);
        let steps = self
            .scripts
            .get(&request.prompt)
            .unwrap_or(&*self.fallback)
            .clone();

        for step in steps {
            match step {
                Step::Chunk(text) => request.on_event.emit(AnswerEvent::Chunk(json!(text))),
                Step::Done => request.on_event.emit(AnswerEvent::Done),
                Step::Sleep(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
                Step::AwaitCancel => {
                    request.signal.cancelled().await;
                    self.tracker.saw_cancel.store(true, Ordering::SeqCst);
                }
                Step::Fail(message) => return Err(Error::Provider(message.into())),
            }
        }

        if !self.disposer_delay.is_zero() {
            tokio::time::sleep(self.disposer_delay).await;
        }
        let tracker = self.tracker.clone();
        Ok(Disposer::new("scripted", move || {
            tracker.disposed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

impl AnswerProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn generate_answer(&self, request: AnswerRequest) -> BoxFuture<'_, Result<Disposer>> {
        Box::pin(self.play(request))
    }
}

/// Hands out the same scripted provider, or a selection error.
pub struct ScriptedSource {
    provider: ScriptedProvider,
    failure: Option<Error>,
    pub selections: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(provider: ScriptedProvider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            failure: None,
            selections: AtomicUsize::new(0),
        })
    }

    pub fn failing(provider: ScriptedProvider, failure: Error) -> Arc<Self> {
        Arc::new(Self {
            provider,
            failure: Some(failure),
            selections: AtomicUsize::new(0),
        })
    }
}

impl ProviderSource for ScriptedSource {
    fn select(&self) -> BoxFuture<'_, Result<Box<dyn AnswerProvider>>> {
        Box::pin(async move {
            self.selections.fetch_add(1, Ordering::SeqCst);
            match &self.failure {
                Some(Error::Credential(message)) => Err(Error::Credential(message.clone())),
                Some(Error::Configuration(message)) => Err(Error::Configuration(message.clone())),
                Some(other) => Err(Error::Provider(other.to_string())),
                None => Ok(Box::new(self.provider.clone()) as Box<dyn AnswerProvider>),
            }
        })
    }
}

/// Resolver with a fixed token outcome.
pub struct StaticResolver {
    pub token: std::result::Result<String, String>,
    pub token_calls: AtomicUsize,
}

impl StaticResolver {
    pub fn new(token: std::result::Result<&str, &str>) -> Arc<Self> {
        Arc::new(Self {
            token: token.map(String::from).map_err(String::from),
            token_calls: AtomicUsize::new(0),
        })
    }
}

impl Resolver for StaticResolver {
    fn get_provider_configs(&self) -> BoxFuture<'_, Result<ProviderConfigs>> {
        Box::pin(async move {
            Ok(ProviderConfigs {
                provider: "chatgpt".into(),
                configs: Default::default(),
            })
        })
    }

    fn get_access_token(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            self.token.clone().map_err(Error::Credential)
        })
    }
}

#[derive(Default)]
pub struct RecordingFeedback {
    pub sent: Mutex<Vec<(String, Value)>>,
}

impl FeedbackSink for RecordingFeedback {
    fn send_feedback<'a>(&'a self, token: &'a str, data: &'a Value) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.sent.lock().push((token.to_string(), data.clone()));
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct CountingLauncher {
    pub opened: AtomicUsize,
}

impl OptionsLauncher for CountingLauncher {
    fn open_options_page(&self) -> Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Collect messages until a terminal one arrives or `within` elapses.
pub async fn collect_until_terminal(remote: &mut RemotePort, within: Duration) -> Vec<Value> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(within, async {
        while let Some(message) = remote.recv().await {
            let terminal = message.is_terminal();
            seen.push(message.to_json());
            if terminal {
                break;
            }
        }
    })
    .await;
    seen
}

/// Drain whatever is buffered without waiting.
pub fn drain(remote: &mut RemotePort) -> Vec<PortMessage> {
    let mut seen = Vec::new();
    while let Some(message) = remote.try_recv() {
        seen.push(message);
    }
    seen
}
