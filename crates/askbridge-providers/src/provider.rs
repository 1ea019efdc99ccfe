//! The provider capability and its closed set of backends.

use askbridge_core::{Endpoints, Result};
use futures::future::BoxFuture;
use reqwest::Client;

use crate::chatgpt::{ChatGptClient, ChatGptProvider};
use crate::disposer::Disposer;
use crate::openai::Gpt3Provider;
use crate::types::{AnswerRequest, ProviderSelection, ProviderType};

/// Turns a prompt into a stream of answer events.
///
/// Implementations emit zero or more `Chunk` events followed by exactly one
/// `Done` through `request.on_event`, or return an error instead of `Done`.
/// Once `request.signal` fires they stop emitting, drop their transport, and
/// still resolve a [`Disposer`].
pub trait AnswerProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate_answer(&self, request: AnswerRequest) -> BoxFuture<'_, Result<Disposer>>;
}

/// The backends a selection can resolve to.
#[derive(Debug, Clone)]
pub enum Provider {
    ChatGpt(ChatGptProvider),
    Gpt3(Gpt3Provider),
}

impl Provider {
    /// Build the provider named by `selection`.
    pub fn from_selection(selection: ProviderSelection, http: &Client, endpoints: &Endpoints) -> Self {
        match selection {
            ProviderSelection::ChatGpt { access_token } => Self::ChatGpt(ChatGptProvider::new(
                ChatGptClient::new(http.clone(), &endpoints.chatgpt_base_url),
                access_token,
            )),
            ProviderSelection::Gpt3 { api_key, model } => Self::Gpt3(Gpt3Provider::new(
                http.clone(),
                &endpoints.openai_base_url,
                api_key,
                model,
            )),
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::ChatGpt(_) => ProviderType::ChatGpt,
            Self::Gpt3(_) => ProviderType::Gpt3,
        }
    }
}

impl AnswerProvider for Provider {
    fn name(&self) -> &'static str {
        self.provider_type().name()
    }

    fn generate_answer(&self, request: AnswerRequest) -> BoxFuture<'_, Result<Disposer>> {
        match self {
            Self::ChatGpt(p) => p.generate_answer(request),
            Self::Gpt3(p) => p.generate_answer(request),
        }
    }
}
