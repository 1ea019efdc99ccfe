//! Shared application state.

use askbridge_broker::BrokerClient;
use askbridge_core::BridgeConfig;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: BridgeConfig,
    pub broker: BrokerClient,
}

impl AppState {
    pub fn new(config: BridgeConfig, broker: BrokerClient) -> Self {
        Self { config, broker }
    }
}
