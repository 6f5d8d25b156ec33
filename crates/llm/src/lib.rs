//! LLM client abstraction, Anthropic reference adapter, cost computation,
//! and engine-side JSON extraction from free-form model output.

pub mod anthropic;
pub mod json_extract;
pub mod pricing;

use async_trait::async_trait;
use thiserror::Error;

pub use anthropic::AnthropicClient;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("no API key configured")]
    MissingApiKey,
    #[error("response contained no text content")]
    EmptyResponse,
    /// Not a call failure: a safety gate (cost budget or rate limit)
    /// declined to admit this call. Callers should treat this as a soft
    /// stall rather than a stage failure.
    #[error("call not admitted: {0}")]
    NotAdmitted(String),
}

impl LlmError {
    #[must_use]
    pub fn is_not_admitted(&self) -> bool {
        matches!(self, Self::NotAdmitted(_))
    }
}

/// A completed LLM call's text and token accounting.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn ask(
        &self,
        prompt: &str,
        max_tokens: u32,
        model: Option<&str>,
    ) -> Result<LlmResponse, LlmError>;
}
