use async_trait::async_trait;
use thiserror::Error;

use super::types::{ChatCompletion, ChatRequest};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to hosted model failed: {0}")]
    Transport(String),
    #[error("hosted model returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response from hosted model: {0}")]
    Malformed(String),
}

/// The hosted model: chat completions with optional tool calling, plus
/// the embedding endpoint used by vector lookup.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// provider name for logs
    fn name(&self) -> &str;

    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion, LlmError>;

    async fn embed(&self, input: &str) -> Result<Vec<f32>, LlmError>;
}
