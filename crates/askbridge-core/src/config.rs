//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 3017;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_CHATGPT_BASE_URL: &str = "https://chat.openai.com";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Paths to the askbridge data directory contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Provider selection and credentials (`data/provider-config.json`).
    pub provider_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the root if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            provider_config_file: root.join("provider-config.json"),
            root,
        })
    }
}

/// Base URLs of the two backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    /// ChatGPT web backend (session auth, `backend-api/*`).
    pub chatgpt_base_url: String,
    /// OpenAI API (`v1/completions`).
    pub openai_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            chatgpt_base_url: DEFAULT_CHATGPT_BASE_URL.into(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.into(),
        }
    }
}

impl Endpoints {
    /// Endpoints honoring `CHATGPT_BASE_URL` / `OPENAI_BASE_URL`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            chatgpt_base_url: env_url("CHATGPT_BASE_URL").unwrap_or(defaults.chatgpt_base_url),
            openai_base_url: env_url("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
        }
    }

    /// Endpoints pointing both backends at one base URL (mock servers).
    pub fn single(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        Self {
            chatgpt_base_url: base.clone(),
            openai_base_url: base,
        }
    }
}

fn env_url(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
}

/// Top-level askbridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Interface the server binds to.
    pub host: String,
    /// HTTP server port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Backend base URLs.
    pub endpoints: Endpoints,
    /// URL opened for `OPEN_OPTIONS_PAGE`.
    pub options_url: String,
}

impl BridgeConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let host = std::env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.into());
        let options_url = std::env::var("ASKBRIDGE_OPTIONS_URL")
            .unwrap_or_else(|_| format!("http://{}:{}/options", host, port));

        Ok(Self {
            host,
            port,
            data_paths: DataPaths::new(data_dir)?,
            endpoints: Endpoints::from_env(),
            options_url,
        })
    }

    /// `host:port` string for the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
