//! Provider selection: the resolver collaborator and the per-request
//! provider source built on top of it.

use std::path::PathBuf;
use std::sync::Arc;

use askbridge_core::{Endpoints, Result};
use futures::future::BoxFuture;
use reqwest::Client;
use tracing::debug;

use crate::chatgpt::ChatGptClient;
use crate::config::ProviderConfigFile;
use crate::provider::{AnswerProvider, Provider};
use crate::types::{ProviderConfigs, ProviderSelection, ProviderType};

/// Supplies the active provider selection and credentials.
///
/// Both calls are made fresh for every use and must be safe to call
/// concurrently; results are never cached by the broker.
pub trait Resolver: Send + Sync {
    fn get_provider_configs(&self) -> BoxFuture<'_, Result<ProviderConfigs>>;

    fn get_access_token(&self) -> BoxFuture<'_, Result<String>>;
}

/// Resolver backed by `provider-config.json` and the ChatGPT session
/// endpoint.
pub struct ConfigFileResolver {
    path: PathBuf,
    chatgpt: ChatGptClient,
}

impl ConfigFileResolver {
    pub fn new(path: impl Into<PathBuf>, chatgpt: ChatGptClient) -> Self {
        Self {
            path: path.into(),
            chatgpt,
        }
    }
}

impl Resolver for ConfigFileResolver {
    fn get_provider_configs(&self) -> BoxFuture<'_, Result<ProviderConfigs>> {
        Box::pin(async move {
            let file = ProviderConfigFile::load_async(&self.path).await?;
            Ok(file.provider_configs())
        })
    }

    fn get_access_token(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let file = ProviderConfigFile::load_async(&self.path).await?;
            self.chatgpt
                .fetch_access_token(file.session_token.as_deref())
                .await
        })
    }
}

/// Produces the provider for one request.
pub trait ProviderSource: Send + Sync {
    fn select(&self) -> BoxFuture<'_, Result<Box<dyn AnswerProvider>>>;
}

/// Selects a [`Provider`] from what a [`Resolver`] reports.
pub struct ResolverSource {
    resolver: Arc<dyn Resolver>,
    http: Client,
    endpoints: Endpoints,
}

impl ResolverSource {
    pub fn new(resolver: Arc<dyn Resolver>, http: Client, endpoints: Endpoints) -> Self {
        Self {
            resolver,
            http,
            endpoints,
        }
    }

    /// Resolve the selection and credentials for one request.
    ///
    /// The provider value is validated before any credential is fetched, so
    /// an unrecognized provider never causes a network call.
    pub async fn resolve_selection(&self) -> Result<ProviderSelection> {
        let configs = self.resolver.get_provider_configs().await?;
        let selection = match configs.provider_type()? {
            ProviderType::ChatGpt => ProviderSelection::ChatGpt {
                access_token: self.resolver.get_access_token().await?,
            },
            ProviderType::Gpt3 => {
                let gpt3 = configs.gpt3()?;
                ProviderSelection::Gpt3 {
                    api_key: gpt3.api_key.clone(),
                    model: gpt3.model.clone(),
                }
            }
        };
        debug!("Resolved provider selection: {:?}", selection);
        Ok(selection)
    }
}

impl ProviderSource for ResolverSource {
    fn select(&self) -> BoxFuture<'_, Result<Box<dyn AnswerProvider>>> {
        Box::pin(async move {
            let selection = self.resolve_selection().await?;
            let provider = Provider::from_selection(selection, &self.http, &self.endpoints);
            Ok(Box::new(provider) as Box<dyn AnswerProvider>)
        })
    }
}
