//! OpenRouter API client implementation with automatic retry for transient errors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::LlmError;
use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient};
use crate::retry::RetryConfig;

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenRouter API client with automatic retry for transient errors.
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    endpoint: String,
    retry_config: RetryConfig,
}

impl OpenRouterClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, OPENROUTER_API_URL.to_string())
    }

    /// Point the client at another OpenAI-compatible chat completions endpoint.
    pub fn with_base_url(api_key: String, endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key,
            endpoint,
            retry_config: RetryConfig::default(),
        }
    }

    fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
        headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Execute a single request without retry.
    async fn execute_request(&self, request: &OpenRouterRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "stack-harmonizer")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network_error(format!("Request timeout: {}", e))
                } else if e.is_connect() {
                    LlmError::network_error(format!("Connection failed: {}", e))
                } else {
                    LlmError::network_error(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        let retry_after = Self::parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(LlmError::from_status(status.as_u16(), body, retry_after));
        }

        let parsed: OpenRouterResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::parse_error(format!("Failed to parse response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::parse_error("No choices in response".to_string()))?;

        Ok(ChatResponse {
            content: choice.message.content,
        })
    }

    async fn execute_with_retry(&self, request: &OpenRouterRequest) -> Result<ChatResponse, LlmError> {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            let error = match self.execute_request(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::debug!("LLM request succeeded after {} retries", attempt);
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !error.is_transient() || attempt >= self.retry_config.max_retries {
                tracing::warn!("LLM request failed after {} attempt(s): {}", attempt + 1, error);
                return Err(error);
            }

            let remaining = self
                .retry_config
                .max_retry_duration
                .saturating_sub(start.elapsed());
            let delay = error.suggested_delay(attempt, &self.retry_config).min(remaining);
            if delay.is_zero() {
                return Err(error);
            }

            tracing::debug!(
                "LLM attempt {} failed with {}, retrying in {:?}",
                attempt + 1,
                error.kind,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let request = OpenRouterRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        tracing::debug!("Sending request to OpenRouter: model={}", model);
        self.execute_with_retry(&request).await
    }
}

#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Vec<OpenRouterChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
}

#[derive(Debug, Deserialize)]
struct OpenRouterMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    #[test]
    fn test_request_omits_unset_options() {
        let request = OpenRouterRequest {
            model: "m".into(),
            messages: vec![ChatMessage::new(Role::User, "hi")],
            temperature: Some(0.0),
            max_tokens: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["temperature"], 0.0);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices":[{"message":{"content":"{\"category\":\"CRM\"}"},"finish_reason":"stop"}],"model":"x"}"#;
        let parsed: OpenRouterResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"category\":\"CRM\"}")
        );
    }
}
