//! askbridge server — exposes the streaming broker over HTTP and WebSocket.

pub mod check;
pub mod launcher;
pub mod routes;
pub mod state;

use std::sync::Arc;

use askbridge_broker::{Broker, BrokerHandle, Collaborators};
use askbridge_core::BridgeConfig;
use askbridge_providers::{ChatGptClient, ConfigFileResolver, ResolverSource};

pub use launcher::BrowserLauncher;
pub use state::AppState;

/// Wire the production broker: file-backed resolver, ChatGPT feedback sink,
/// browser launcher.
pub fn start_broker(config: &BridgeConfig) -> BrokerHandle {
    let http = reqwest::Client::new();
    let chatgpt = ChatGptClient::new(http.clone(), &config.endpoints.chatgpt_base_url);
    let resolver = Arc::new(ConfigFileResolver::new(
        &config.data_paths.provider_config_file,
        chatgpt.clone(),
    ));
    let source = Arc::new(ResolverSource::new(
        resolver.clone(),
        http,
        config.endpoints.clone(),
    ));

    let services = Collaborators {
        resolver,
        feedback: Arc::new(chatgpt),
        launcher: Arc::new(BrowserLauncher::new(config.options_url.clone())),
    };
    Broker::new(source, services).start()
}
