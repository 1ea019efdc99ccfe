//! Answer providers for the askbridge broker.
//!
//! A provider turns a prompt into a stream of [`AnswerEvent`]s and hands back
//! a [`Disposer`] for whatever it left behind upstream. Two backends exist:
//! the ChatGPT web backend (session access token) and the OpenAI completions
//! API (API key + model). Which one runs is decided per request by a
//! [`Resolver`] through [`ResolverSource`].

pub mod chatgpt;
pub mod config;
pub mod disposer;
pub mod openai;
pub mod provider;
pub mod resolver;
mod sse;
pub mod types;

pub use chatgpt::{ChatGptClient, ChatGptProvider};
pub use config::ProviderConfigFile;
pub use disposer::Disposer;
pub use openai::Gpt3Provider;
pub use provider::{AnswerProvider, Provider};
pub use resolver::{ConfigFileResolver, ProviderSource, Resolver, ResolverSource};
pub use types::*;
