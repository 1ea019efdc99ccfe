//! Error types for askbridge.

use thiserror::Error;

/// Errors surfaced by the broker and its providers.
///
/// The four request-fatal variants (`Configuration`, `Credential`,
/// `Provider`, `Protocol`) display their bare message: that text is what a
/// channel receives in its `{error}` terminal message.
#[derive(Error, Debug)]
pub enum Error {
    /// Unrecognized or incomplete provider selection.
    #[error("{0}")]
    Configuration(String),

    /// Access token or API key could not be retrieved.
    #[error("{0}")]
    Credential(String),

    /// Transport or authentication failure while talking to a backend.
    #[error("{0}")]
    Provider(String),

    /// Upstream data could not be understood.
    #[error("{0}")]
    Protocol(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
