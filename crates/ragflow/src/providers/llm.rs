//! Completion provider trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Token usage reported by the completion service
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A structured completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Fixed system instructions
    pub system: String,
    /// User prompt (context passages plus question)
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Completion service response
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    /// Model identifier reported by the service
    pub model_id: String,
    pub usage: TokenUsage,
}

/// Trait for LLM-backed answer generation
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion for the request
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Configured model identifier
    fn model(&self) -> &str;
}
