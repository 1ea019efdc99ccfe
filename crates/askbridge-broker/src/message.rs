//! Inbound message shapes and the collaborators one-shot messages reach.

use askbridge_core::{Error, Result};
use askbridge_providers::ChatGptClient;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

/// The only message a port accepts: `{"question": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionMessage {
    pub question: String,
}

impl QuestionMessage {
    pub fn parse(raw: &Value) -> Result<Self> {
        let message = Self::deserialize(raw)
            .map_err(|e| Error::InvalidRequest(format!("expected {{\"question\": string}}: {}", e)))?;
        if message.question.trim().is_empty() {
            return Err(Error::InvalidRequest("question is empty".into()));
        }
        Ok(message)
    }
}

/// A stateless request/response message, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum RuntimeMessage {
    #[serde(rename = "FEEDBACK")]
    Feedback {
        #[serde(default)]
        data: Value,
    },
    #[serde(rename = "OPEN_OPTIONS_PAGE")]
    OpenOptionsPage,
    #[serde(rename = "GET_ACCESS_TOKEN")]
    GetAccessToken,
    #[serde(other)]
    Unknown,
}

impl RuntimeMessage {
    pub fn parse(raw: Value) -> Result<Self> {
        serde_json::from_value(raw).map_err(|e| Error::InvalidRequest(e.to_string()))
    }
}

/// Delivers answer feedback upstream.
pub trait FeedbackSink: Send + Sync {
    fn send_feedback<'a>(&'a self, token: &'a str, data: &'a Value) -> BoxFuture<'a, Result<()>>;
}

impl FeedbackSink for ChatGptClient {
    fn send_feedback<'a>(&'a self, token: &'a str, data: &'a Value) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.send_message_feedback(token, data))
    }
}

/// Opens the provider settings surface.
pub trait OptionsLauncher: Send + Sync {
    fn open_options_page(&self) -> Result<()>;
}
