//! Provider contract types and provider selection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use askbridge_core::Error;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// One incremental output of a provider invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEvent {
    /// Opaque payload; its shape is defined by the provider.
    Chunk(serde_json::Value),
    /// Terminal event of a successful invocation.
    Done,
}

/// Callback receiving a provider's events in production order.
#[derive(Clone)]
pub struct EventSink(Arc<dyn Fn(AnswerEvent) + Send + Sync>);

impl EventSink {
    pub fn new(f: impl Fn(AnswerEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn emit(&self, event: AnswerEvent) {
        (self.0)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// Input of [`crate::AnswerProvider::generate_answer`].
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub prompt: String,
    /// Fired once when the caller abandons the request.
    pub signal: CancellationToken,
    pub on_event: EventSink,
}

/// Backend identifier as stored in the provider configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    #[serde(rename = "chatgpt")]
    ChatGpt,
    #[serde(rename = "gpt3")]
    Gpt3,
}

impl ProviderType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatGpt => "chatgpt",
            Self::Gpt3 => "gpt3",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chatgpt" => Ok(Self::ChatGpt),
            "gpt3" => Ok(Self::Gpt3),
            other => Err(Error::Configuration(format!("Unknown provider {}", other))),
        }
    }
}

/// GPT-3 completions settings.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gpt3Config {
    #[serde(default, rename = "apiKey")]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
}

impl fmt::Debug for Gpt3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gpt3Config")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

/// Per-provider settings keyed by provider name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfigMap {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpt3: Option<Gpt3Config>,
}

/// What the resolver reports as the active selection.
///
/// `provider` stays a raw string so an unrecognized value surfaces as a
/// configuration error at selection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfigs {
    pub provider: String,
    #[serde(default)]
    pub configs: ProviderConfigMap,
}

impl ProviderConfigs {
    pub fn provider_type(&self) -> Result<ProviderType, Error> {
        self.provider.parse()
    }

    /// GPT-3 settings, rejecting a missing entry or an empty key.
    pub fn gpt3(&self) -> Result<&Gpt3Config, Error> {
        let config = self
            .configs
            .gpt3
            .as_ref()
            .ok_or_else(|| Error::Configuration("GPT-3 provider is not configured".into()))?;
        if config.api_key.trim().is_empty() {
            return Err(Error::Configuration("GPT-3 API key is not configured".into()));
        }
        if config.model.trim().is_empty() {
            return Err(Error::Configuration("GPT-3 model is not configured".into()));
        }
        Ok(config)
    }
}

/// Active provider plus the credentials it needs for one request.
#[derive(Clone, PartialEq, Eq)]
pub enum ProviderSelection {
    ChatGpt { access_token: String },
    Gpt3 { api_key: String, model: String },
}

impl ProviderSelection {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::ChatGpt { .. } => ProviderType::ChatGpt,
            Self::Gpt3 { .. } => ProviderType::Gpt3,
        }
    }
}

impl fmt::Debug for ProviderSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChatGpt { access_token } => f
                .debug_struct("ChatGpt")
                .field("access_token", &redact(access_token))
                .finish(),
            Self::Gpt3 { api_key, model } => f
                .debug_struct("Gpt3")
                .field("api_key", &redact(api_key))
                .field("model", model)
                .finish(),
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}
