//! Provider configuration file (`provider-config.json`).
//!
//! The file is owned by the options surface; the broker only reads it, and
//! re-reads it for every request.

use std::path::Path;

use askbridge_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::types::{Gpt3Config, ProviderConfigMap, ProviderConfigs, ProviderType};

pub const DEFAULT_GPT3_MODEL: &str = "text-davinci-003";

pub const GPT3_MODELS: &[&str] = &[
    "text-davinci-003",
    "text-curie-001",
    "text-babbage-001",
    "text-ada-001",
    "text-chat-davinci-002-20221122",
];

/// Stored provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigFile {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub configs: ProviderConfigMap,
    /// Web session cookie used to obtain ChatGPT access tokens.
    #[serde(default, skip_serializing)]
    pub session_token: Option<String>,
}

fn default_provider() -> String {
    ProviderType::ChatGpt.name().into()
}

impl Default for ProviderConfigFile {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            configs: ProviderConfigMap::default(),
            session_token: None,
        }
    }
}

impl ProviderConfigFile {
    /// Load config from file, falling back to env vars and defaults.
    ///
    /// A missing file means defaults; a file that is present but unreadable
    /// as JSON is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Self::parse(raw.as_deref(), path)
    }

    /// Async variant of [`ProviderConfigFile::load`].
    pub async fn load_async(path: &Path) -> Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Self::parse(raw.as_deref(), path)
    }

    fn parse(raw: Option<&str>, path: &Path) -> Result<Self> {
        let mut config: ProviderConfigFile = match raw {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(raw).map_err(|e| {
                Error::Configuration(format!("Invalid provider config {}: {}", path.display(), e))
            })?,
            _ => ProviderConfigFile::default(),
        };

        // Env vars as fallback for credentials
        if config.session_token.is_none() {
            config.session_token = std::env::var("CHATGPT_SESSION_TOKEN").ok();
        }
        let gpt3 = config.configs.gpt3.get_or_insert_with(Gpt3Config::default);
        if gpt3.api_key.is_empty() {
            gpt3.api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        }
        if gpt3.model.is_empty() {
            gpt3.model = DEFAULT_GPT3_MODEL.into();
        }

        Ok(config)
    }

    /// The selection part handed to the broker (no session cookie).
    pub fn provider_configs(&self) -> ProviderConfigs {
        ProviderConfigs {
            provider: self.provider.clone(),
            configs: self.configs.clone(),
        }
    }
}
