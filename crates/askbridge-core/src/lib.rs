//! askbridge core — error taxonomy and runtime configuration.

pub mod config;
pub mod error;

pub use config::{BridgeConfig, DataPaths, Endpoints};
pub use error::{Error, Result};
