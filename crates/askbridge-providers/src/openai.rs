//! OpenAI completions backend (API key + model).

use askbridge_core::{Error, Result};
use futures::future::BoxFuture;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::disposer::Disposer;
use crate::provider::AnswerProvider;
use crate::sse::{self, StreamEnd};
use crate::types::{AnswerEvent, AnswerRequest};

pub const MAX_TOKENS: u32 = 2048;

/// Control tokens some chat-tuned completion models stream back.
const CONTROL_TOKENS: &[&str] = &["<|im_end|>", "<|im_sep|>"];

/// Streams completions from `/v1/completions`.
#[derive(Clone)]
pub struct Gpt3Provider {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for Gpt3Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gpt3Provider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Gpt3Provider {
    pub fn new(http: Client, base_url: &str, api_key: String, model: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    /// Wrap the prompt for chat-tuned completion models.
    pub fn build_prompt(&self, prompt: &str) -> String {
        if self.model.starts_with("text-chat-davinci") {
            format!(
                "Respond conversationally.<|im_end|>\n\nUser: {}<|im_sep|>\nChatGPT:",
                prompt
            )
        } else {
            prompt.to_string()
        }
    }

    async fn stream_answer(&self, request: AnswerRequest) -> Result<Disposer> {
        let AnswerRequest {
            prompt,
            signal,
            on_event,
        } = request;

        let body = json!({
            "model": self.model,
            "prompt": self.build_prompt(&prompt),
            "stream": true,
            "max_tokens": MAX_TOKENS,
        });

        debug!("Streaming completions with model {}", self.model);

        let request = self
            .http
            .post(format!("{}/v1/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let response = match sse::send_cancellable(request, &signal).await? {
            Some(response) => response,
            None => return Ok(Disposer::noop("gpt3")),
        };
        if !response.status().is_success() {
            return match sse::error_unless_cancelled(response, &signal).await {
                Some(error) => Err(error),
                None => Ok(Disposer::noop("gpt3")),
            };
        }

        let mut answer = String::new();
        let end = sse::consume(response, &signal, |data| {
            let value: Value = serde_json::from_str(data)
                .map_err(|e| Error::Protocol(format!("Malformed completion event: {}", e)))?;
            if let Some(chunk) = accumulate_completion(&mut answer, &value) {
                on_event.emit(AnswerEvent::Chunk(chunk));
            }
            Ok(())
        })
        .await?;

        if end == StreamEnd::Done {
            on_event.emit(AnswerEvent::Done);
        }
        Ok(Disposer::noop("gpt3"))
    }
}

impl AnswerProvider for Gpt3Provider {
    fn name(&self) -> &'static str {
        "gpt3"
    }

    fn generate_answer(&self, request: AnswerRequest) -> BoxFuture<'_, Result<Disposer>> {
        Box::pin(self.stream_answer(request))
    }
}

/// Append one completion event to `answer` and build the chunk payload.
///
/// Returns `None` for events without text and for control tokens.
pub fn accumulate_completion(answer: &mut String, value: &Value) -> Option<Value> {
    let text = value["choices"][0]["text"].as_str()?;
    if CONTROL_TOKENS.contains(&text) {
        return None;
    }
    answer.push_str(text);
    let id = value["id"].as_str().unwrap_or_default();
    Some(json!({
        "text": answer.as_str(),
        "messageId": id,
        "conversationId": id,
    }))
}
