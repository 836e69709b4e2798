//! OpenAI-compatible embedding and completion clients
//!
//! Both clients speak the widely implemented `/v1/embeddings` and
//! `/v1/chat/completions` wire formats over a shared reqwest client with a
//! hard request timeout. Transient failures are retried with backoff and
//! jitter; auth and malformed-input failures surface immediately.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::retry::retry_with_backoff;

use super::embedding::EmbeddingProvider;
use super::llm::{CompletionProvider, CompletionRequest, CompletionResponse, TokenUsage};

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

/// Embedding client for OpenAI-style services
pub struct OpenAiEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

impl OpenAiEmbedder {
    /// Create a new embedder; the request timeout is fixed at construction
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build embedding client: {e}")))?;

        Ok(Self { client, config: config.clone() })
    }

    /// One embeddings call for the given inputs, without retry
    async fn request_embeddings(&self, inputs: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.config.base_url);
        let expected = inputs.len();

        let mut request = self.client.post(&url).json(&EmbeddingsRequest {
            model: &self.config.model,
            input: inputs,
        });
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await.map_err(|e| Error::from_reqwest("embedding", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status("embedding", status, body));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| Error::fatal("embedding", format!("malformed response: {e}")))?;

        if parsed.data.len() != expected {
            return Err(Error::fatal(
                "embedding",
                format!("expected {} vectors, got {}", expected, parsed.data.len()),
            ));
        }

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();

        // Dimensionality mismatch means the deployment is pointed at the
        // wrong model or collection; retrying cannot fix it.
        for vector in &vectors {
            if vector.len() != self.config.dimensions {
                return Err(Error::fatal(
                    "embedding",
                    format!(
                        "dimension mismatch: service returned {}, collection expects {}",
                        vector.len(),
                        self.config.dimensions
                    ),
                ));
            }
        }

        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::fatal("embedding", "cannot embed empty text"));
        }

        let vectors = retry_with_backoff("embedding", self.config.max_retries, || {
            self.request_embeddings(vec![text])
        })
        .await?;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::fatal("embedding", "service returned no vectors"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let inputs: Vec<&str> = batch.iter().map(String::as_str).collect();
            let vectors = retry_with_backoff("embedding", self.config.max_retries, || {
                self.request_embeddings(inputs.clone())
            })
            .await?;
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "openai-embeddings"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Completion client for OpenAI-style chat services
pub struct OpenAiLlm {
    client: Client,
    config: LlmConfig,
}

impl OpenAiLlm {
    /// Create a new completion client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build completion client: {e}")))?;

        Ok(Self { client, config: config.clone() })
    }

    async fn request_completion(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut http_request = self.client.post(&url).json(&body);
        if !self.config.api_key.is_empty() {
            http_request = http_request.bearer_auth(&self.config.api_key);
        }

        let response = http_request.send().await.map_err(|e| Error::from_reqwest("completion", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status("completion", status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::fatal("completion", format!("malformed response: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::fatal("completion", "service returned no choices"))?;

        let usage = parsed.usage.map_or(TokenUsage::default(), |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        Ok(CompletionResponse { text, model_id: parsed.model, usage })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        retry_with_backoff("completion", self.config.max_retries, || {
            self.request_completion(request)
        })
        .await
    }

    fn name(&self) -> &str {
        "openai-chat"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
