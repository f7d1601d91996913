//! Article summarization through an OpenAI-compatible chat completions API.
//!
//! Input text is truncated to the model's token budget before the request, transient API
//! failures are retried with exponential backoff, and every failure mode ends in `None`
//! rather than an error so one bad article never stops a save pass.

pub mod client;
pub mod retry;
pub mod tokens;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use linkdigest_shared::{Result, SummarizerConfig};

pub use client::{ChatClient, ChatError, ChatMessage, ChatRequest};
pub use retry::RetryPolicy;
pub use tokens::{BpeTokenizer, ContextTier, TokenBudget, Tokenizer};

/// Produces a short summary of article text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text`; `None` when no summary could be produced.
    async fn summarize(&self, text: &str) -> Option<String>;
}

/// System instruction sent with every request.
pub fn system_prompt(language: &str) -> String {
    format!(
        "As an experienced journalist and tech writer, you microblog about lifestyle and \
         cutting-edge technologies, topics that are of great interest to your audience of \
         software developers and engineering managers.\n\
         Provide a concise, business-focused summary blog post in {language} language based on \
         the following content.\n\
         Additionally, please include meta information such as author, tags, publication date \
         and source URL if available. Separate the meta information from the content with --- \
         (three dashes)."
    )
}

/// [`Summarizer`] backed by [`ChatClient`].
pub struct OpenAiSummarizer {
    client: ChatClient,
    model: String,
    system_prompt: String,
    budget: TokenBudget,
    temperature: f32,
    tokenizer: Arc<dyn Tokenizer>,
    retry: RetryPolicy,
}

impl OpenAiSummarizer {
    pub fn new(
        client: ChatClient,
        model: impl Into<String>,
        language: &str,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        let model = model.into();
        let defaults = SummarizerConfig::default();
        Self {
            budget: TokenBudget::for_model(
                &model,
                defaults.max_response_tokens,
                defaults.buffer_tokens,
            ),
            client,
            model,
            system_prompt: system_prompt(language),
            temperature: defaults.temperature,
            tokenizer,
            retry: RetryPolicy::default(),
        }
    }

    /// Build from configuration, using the model's BPE encoding.
    pub fn from_config(config: &SummarizerConfig, api_key: &str, language: &str) -> Result<Self> {
        let client = ChatClient::new(api_key, config.api_base.as_str())?;
        let tokenizer = Arc::new(BpeTokenizer::for_model(&config.model)?);
        Ok(Self::new(client, config.model.as_str(), language, tokenizer)
            .with_budget(TokenBudget::for_model(
                &config.model,
                config.max_response_tokens,
                config.buffer_tokens,
            ))
            .with_temperature(config.temperature)
            .with_retry(RetryPolicy::new(
                config.max_attempts,
                Duration::from_secs(config.backoff_base_secs),
            )))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_budget(mut self, budget: TokenBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    /// The request that would be sent for `text`, after truncation.
    pub fn build_request(&self, text: &str) -> ChatRequest {
        let limit = self.budget.max_input_tokens();
        let tokens = self.tokenizer.count(text);
        let content = if tokens > limit {
            debug!(tokens, limit, "input truncated to token budget");
            self.tokenizer.truncate(text, limit)
        } else {
            text.to_string()
        };

        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(self.system_prompt.as_str()),
                ChatMessage::user(content),
            ],
            max_tokens: self.budget.max_response_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    #[instrument(skip_all, fields(model = %self.model, chars = text.len()))]
    async fn summarize(&self, text: &str) -> Option<String> {
        let request = self.build_request(text);

        let outcome = self
            .retry
            .execute(|_| self.client.complete(&request), ChatError::is_retryable)
            .await;

        match outcome {
            Ok(content) => {
                let summary = content.trim();
                if summary.is_empty() {
                    warn!("model returned a blank summary");
                    None
                } else {
                    Some(summary.to_string())
                }
            }
            Err(e) => {
                warn!(error = %e, "summarization failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::tokens::test_support::WordTokenizer;
    use super::*;

    fn reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    fn summarizer(server: &MockServer, model: &str, attempts: u32) -> OpenAiSummarizer {
        let client = ChatClient::new("sk-test", server.uri()).unwrap();
        OpenAiSummarizer::new(client, model, "en", Arc::new(WordTokenizer))
            .with_retry(RetryPolicy::no_wait(attempts))
    }

    #[test]
    fn prompt_names_the_language() {
        let prompt = system_prompt("ru");
        assert!(prompt.contains("in ru language"));
        assert!(prompt.contains("---"));
    }

    #[tokio::test]
    async fn summarize_returns_trimmed_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4",
                "max_tokens": 1024,
                "messages": [
                    {"role": "system"},
                    {"role": "user", "content": "content: hello world, url: https://a.test"}
                ]
            })))
            .respond_with(reply("  A short summary.\n"))
            .expect(1)
            .mount(&server)
            .await;

        let result = summarizer(&server, "gpt-4", 3)
            .summarize("content: hello world, url: https://a.test")
            .await;
        assert_eq!(result.as_deref(), Some("A short summary."));
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/chat/completions"))
            .respond_with(reply("recovered"))
            .expect(1)
            .mount(&server)
            .await;

        let result = summarizer(&server, "gpt-4", 3).summarize("text").await;
        assert_eq!(result.as_deref(), Some("recovered"));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(summarizer(&server, "gpt-4", 3).summarize("text").await, None);
    }

    #[tokio::test]
    async fn exhausted_retries_yield_none() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        assert_eq!(summarizer(&server, "gpt-4", 3).summarize("text").await, None);
    }

    #[tokio::test]
    async fn blank_response_is_none() {
        let server = MockServer::start().await;
        Mock::given(path("/chat/completions"))
            .respond_with(reply("   \n "))
            .mount(&server)
            .await;

        assert_eq!(summarizer(&server, "gpt-4", 1).summarize("text").await, None);
    }

    #[test]
    fn request_input_is_truncated_to_budget() {
        let client = ChatClient::new("sk-test", "http://unused.test").unwrap();
        let summarizer = OpenAiSummarizer::new(client, "gpt-3.5-turbo", "en", Arc::new(WordTokenizer))
            .with_budget(TokenBudget {
                max_total_tokens: 10,
                max_response_tokens: 4,
                buffer_tokens: 2,
            });

        let text = "one two three four five six seven";
        let request = summarizer.build_request(text);
        assert_eq!(request.messages[1].content, "one two three four");
        assert_eq!(request.max_tokens, 4);
        assert_eq!(request.messages[0].role, "system");
    }

    #[test]
    fn from_config_uses_model_tier() {
        let config = SummarizerConfig {
            model: "gpt-3.5-turbo".into(),
            ..SummarizerConfig::default()
        };
        let summarizer = OpenAiSummarizer::from_config(&config, "sk-test", "en").unwrap();
        assert_eq!(summarizer.budget().max_input_tokens(), 2972);
    }
}
