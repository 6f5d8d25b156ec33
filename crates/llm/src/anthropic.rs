//! Anthropic `/v1/messages` adapter. Non-streaming: the source's
//! streaming-accumulation loop is generalized away since callers here only
//! need the final text and token counts.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{LlmClient, LlmError, LlmResponse};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Short names accepted as a convenience alongside full model identifiers.
fn normalize_model(model: &str) -> &str {
    match model {
        "opus" => "claude-opus-4-5-20251101",
        "sonnet" => "claude-sonnet-4-5-20250929",
        "haiku" => "claude-3-5-haiku-20241022",
        other => other,
    }
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl AnthropicClient {
    #[must_use]
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            default_model: default_model.into(),
        }
    }

    pub fn from_env(default_model: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        Ok(Self::new(api_key, default_model))
    }

    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn ask(
        &self,
        prompt: &str,
        max_tokens: u32,
        model: Option<&str>,
    ) -> Result<LlmResponse, LlmError> {
        let model = normalize_model(model.unwrap_or(&self.default_model));
        let request = AnthropicRequest {
            model: model.to_string(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            max_tokens,
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if !status.is_success() {
            if let Ok(error_body) = serde_json::from_str::<AnthropicErrorBody>(&body) {
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: format!("{}: {}", error_body.error.error_type, error_body.error.message),
                });
            }
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: AnthropicResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Request(e.to_string()))?;

        let text = parsed
            .content
            .into_iter()
            .find(|c| c.content_type == "text")
            .map(|c| c.text)
            .ok_or(LlmError::EmptyResponse)?;

        Ok(LlmResponse {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn normalizes_short_model_names() {
        assert_eq!(normalize_model("opus"), "claude-opus-4-5-20251101");
        assert_eq!(normalize_model("sonnet"), "claude-sonnet-4-5-20250929");
        assert_eq!(normalize_model("claude-3-opus-20240229"), "claude-3-opus-20240229");
    }

    #[tokio::test]
    async fn ask_parses_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "hello there"}],
                "model": "claude-sonnet-4-5-20250929",
                "usage": {"input_tokens": 12, "output_tokens": 4}
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::new("test-key", "sonnet").with_base_url(server.uri());
        let response = client.ask("hi", 100, None).await.unwrap();
        assert_eq!(response.text, "hello there");
        assert_eq!(response.input_tokens, 12);
        assert_eq!(response.output_tokens, 4);
    }

    #[tokio::test]
    async fn surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {"type": "rate_limit_error", "message": "slow down"}
            })))
            .mount(&server)
            .await;

        let client = AnthropicClient::new("test-key", "sonnet").with_base_url(server.uri());
        let err = client.ask("hi", 100, None).await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 429, .. }));
    }
}
