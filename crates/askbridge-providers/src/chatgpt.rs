//! ChatGPT web backend: access tokens, conversation streaming and cleanup.

use askbridge_core::{Error, Result};
use futures::future::BoxFuture;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::disposer::Disposer;
use crate::provider::AnswerProvider;
use crate::sse::{self, StreamEnd};
use crate::types::{AnswerEvent, AnswerRequest};

/// Model used when the model list cannot be fetched.
pub const DEFAULT_CHATGPT_MODEL: &str = "text-davinci-002-render";

/// Cookie carrying the web session.
pub const SESSION_COOKIE: &str = "__Secure-next-auth.session-token";

#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(rename = "accessToken")]
    access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub slug: String,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// HTTP client for the ChatGPT web backend.
#[derive(Debug, Clone)]
pub struct ChatGptClient {
    http: Client,
    base_url: String,
}

impl ChatGptClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn backend_url(&self, path: &str) -> String {
        format!("{}/backend-api{}", self.base_url, path)
    }

    /// Exchange the web session for a fresh access token.
    ///
    /// HTTP 403 means the request was stopped by Cloudflare; a session
    /// without `accessToken` means the user is logged out.
    pub async fn fetch_access_token(&self, session_token: Option<&str>) -> Result<String> {
        let mut request = self.http.get(format!("{}/api/auth/session", self.base_url));
        if let Some(session) = session_token {
            request = request.header(
                reqwest::header::COOKIE,
                format!("{}={}", SESSION_COOKIE, session),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Credential(format!("Session request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Credential("CLOUDFLARE".into()));
        }

        let session: Option<SessionResponse> = response.json().await.ok();
        session
            .and_then(|s| s.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Credential("UNAUTHORIZED".into()))
    }

    async fn request(
        &self,
        token: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response> {
        let mut request = self
            .http
            .request(method, self.backend_url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(sse::transport_error)?;
        if !response.status().is_success() {
            return Err(sse::error_from_response(response).await);
        }
        Ok(response)
    }

    pub async fn fetch_models(&self, token: &str) -> Result<Vec<ModelInfo>> {
        let response = self.request(token, Method::GET, "/models", None).await?;
        let parsed: ModelsResponse = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("Malformed model list: {}", e)))?;
        Ok(parsed.models)
    }

    /// First advertised model, or [`DEFAULT_CHATGPT_MODEL`].
    pub async fn model_name(&self, token: &str) -> String {
        match self.fetch_models(token).await {
            Ok(models) => match models.into_iter().next() {
                Some(model) => model.slug,
                None => DEFAULT_CHATGPT_MODEL.to_string(),
            },
            Err(e) => {
                warn!("Failed to fetch ChatGPT models, using default: {}", e);
                DEFAULT_CHATGPT_MODEL.to_string()
            }
        }
    }

    pub async fn send_message_feedback(&self, token: &str, data: &Value) -> Result<()> {
        self.request(token, Method::POST, "/conversation/message_feedback", Some(data))
            .await?;
        Ok(())
    }

    pub async fn set_conversation_property(
        &self,
        token: &str,
        conversation_id: &str,
        properties: &Value,
    ) -> Result<()> {
        let path = format!("/conversation/{}", conversation_id);
        self.request(token, Method::PATCH, &path, Some(properties))
            .await?;
        Ok(())
    }
}

/// Streams answers from the ChatGPT web backend with a session access token.
#[derive(Debug, Clone)]
pub struct ChatGptProvider {
    client: ChatGptClient,
    access_token: String,
}

impl ChatGptProvider {
    pub fn new(client: ChatGptClient, access_token: String) -> Self {
        Self {
            client,
            access_token,
        }
    }

    async fn stream_answer(&self, request: AnswerRequest) -> Result<Disposer> {
        let AnswerRequest {
            prompt,
            signal,
            on_event,
        } = request;

        let model = tokio::select! {
            biased;
            _ = signal.cancelled() => return Ok(self.cleanup(None)),
            model = self.client.model_name(&self.access_token) => model,
        };

        let body = json!({
            "action": "next",
            "messages": [{
                "id": Uuid::new_v4().to_string(),
                "role": "user",
                "content": {
                    "content_type": "text",
                    "parts": [prompt],
                },
            }],
            "model": model,
            "parent_message_id": Uuid::new_v4().to_string(),
        });

        debug!("Streaming ChatGPT conversation with model {}", model);

        let request = self
            .client
            .http
            .post(self.client.backend_url("/conversation"))
            .bearer_auth(&self.access_token)
            .json(&body);

        let response = match sse::send_cancellable(request, &signal).await? {
            Some(response) => response,
            None => return Ok(self.cleanup(None)),
        };
        if !response.status().is_success() {
            return match sse::error_unless_cancelled(response, &signal).await {
                Some(error) => Err(error),
                None => Ok(self.cleanup(None)),
            };
        }

        let mut conversation_id: Option<String> = None;
        let end = sse::consume(response, &signal, |data| {
            let value: Value = serde_json::from_str(data)
                .map_err(|e| Error::Protocol(format!("Malformed conversation event: {}", e)))?;
            if let Some(chunk) = parse_conversation_event(&value) {
                if let Some(id) = &chunk.conversation_id {
                    conversation_id = Some(id.clone());
                }
                on_event.emit(AnswerEvent::Chunk(chunk.into_json()));
            }
            Ok(())
        })
        .await?;

        if end == StreamEnd::Done {
            on_event.emit(AnswerEvent::Done);
        }
        Ok(self.cleanup(conversation_id))
    }

    /// Hides the conversation this answer created, if any.
    fn cleanup(&self, conversation_id: Option<String>) -> Disposer {
        let Some(conversation_id) = conversation_id else {
            return Disposer::noop("chatgpt");
        };
        let client = self.client.clone();
        let token = self.access_token.clone();
        let runtime = tokio::runtime::Handle::current();

        Disposer::new("chatgpt", move || {
            runtime.spawn(async move {
                let hidden = json!({ "is_visible": false });
                match client
                    .set_conversation_property(&token, &conversation_id, &hidden)
                    .await
                {
                    Ok(()) => debug!("Hid ChatGPT conversation {}", conversation_id),
                    Err(e) => warn!("Failed to hide conversation {}: {}", conversation_id, e),
                }
            });
        })
    }
}

impl AnswerProvider for ChatGptProvider {
    fn name(&self) -> &'static str {
        "chatgpt"
    }

    fn generate_answer(&self, request: AnswerRequest) -> BoxFuture<'_, Result<Disposer>> {
        Box::pin(self.stream_answer(request))
    }
}

/// Answer text extracted from one conversation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationChunk {
    /// Whole answer so far (the backend resends the full text each time).
    pub text: String,
    pub message_id: String,
    /// Absent until the backend has assigned one.
    pub conversation_id: Option<String>,
}

impl ConversationChunk {
    pub fn into_json(self) -> Value {
        json!({
            "text": self.text,
            "messageId": self.message_id,
            "conversationId": self.conversation_id,
        })
    }
}

/// Extract the answer text from a conversation event, if it carries any.
pub fn parse_conversation_event(value: &Value) -> Option<ConversationChunk> {
    let text = value["message"]["content"]["parts"][0].as_str()?;
    if text.is_empty() {
        return None;
    }
    Some(ConversationChunk {
        text: text.to_string(),
        message_id: value["message"]["id"].as_str().unwrap_or_default().to_string(),
        conversation_id: value["conversation_id"]
            .as_str()
            .filter(|id| !id.is_empty())
            .map(String::from),
    })
}
