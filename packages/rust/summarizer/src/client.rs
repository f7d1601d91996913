//! Minimal client for OpenAI-compatible chat completions.

use std::time::Duration;

use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use linkdigest_shared::{LinkDigestError, Result};

/// Request timeout for a single completion call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors from a single completion call.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Connection failure or timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-2xx response.
    #[error("API error {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// Successful response without any generated text.
    #[error("response contained no choices")]
    EmptyResponse,

    /// Response body did not match the expected shape.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ChatError {
    /// Whether a later attempt can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::EmptyResponse => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Decode(_) => false,
        }
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Body of a `POST /chat/completions` call.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client. The API key is held per instance.
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LinkDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one completion and return the first choice's text.
    pub async fn complete(&self, request: &ChatRequest) -> std::result::Result<String, ChatError> {
        debug!(model = %request.model, max_tokens = request.max_tokens, "chat completion");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ChatError::EmptyResponse)
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(ChatError::Transport("reset".into()).is_retryable());
        assert!(ChatError::EmptyResponse.is_retryable());
        assert!(
            ChatError::Status {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            ChatError::Status {
                status: StatusCode::BAD_GATEWAY,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !ChatError::Status {
                status: StatusCode::UNAUTHORIZED,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!ChatError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn debug_output_hides_api_key() {
        let client = ChatClient::new("sk-secret", "https://api.example.com/v1/").unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("sk-secret"));
        assert_eq!(client.base_url(), "https://api.example.com/v1");
    }

    #[tokio::test]
    async fn complete_sends_bearer_and_reads_first_choice() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .and(wiremock::matchers::header("authorization", "Bearer sk-test"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": "hello"}}]
                }),
            ))
            .mount(&server)
            .await;

        let client = ChatClient::new("sk-test", server.uri()).unwrap();
        let request = ChatRequest {
            model: "gpt-4".into(),
            messages: vec![ChatMessage::user("hi")],
            max_tokens: 10,
            temperature: 0.7,
        };
        assert_eq!(client.complete(&request).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/chat/completions"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let client = ChatClient::new("sk-test", server.uri()).unwrap();
        let request = ChatRequest {
            model: "gpt-4".into(),
            messages: vec![],
            max_tokens: 10,
            temperature: 0.0,
        };
        assert!(matches!(
            client.complete(&request).await,
            Err(ChatError::EmptyResponse)
        ));
    }
}
