//! Deterministic in-process providers for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::llm::{CompletionProvider, CompletionRequest, CompletionResponse, TokenUsage};
use super::vector_store::{VectorSearchHit, VectorSearchProvider};

/// Embedding provider that derives a deterministic vector from the input
pub struct MockEmbedder {
    dimensions: usize,
    /// When set, every call fails with a transient error
    fail_transient: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, fail_transient: false, calls: AtomicUsize::new(0) }
    }

    /// Make every call fail with a transient error
    pub fn failing(dimensions: usize) -> Self {
        Self { dimensions, fail_transient: true, calls: AtomicUsize::new(0) }
    }

    /// Number of embed calls made
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_transient {
            return Err(Error::transient("embedding", "mock timeout"));
        }
        // Cheap deterministic vector: seeded from the byte sum
        let seed = text.bytes().map(|b| b as f32).sum::<f32>();
        Ok((0..self.dimensions).map(|i| ((seed + i as f32) % 97.0) / 97.0).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock-embedder"
    }
}

/// Vector search provider that returns a preset hit list
pub struct MockVectorSearch {
    hits: Mutex<Vec<VectorSearchHit>>,
    calls: AtomicUsize,
}

impl MockVectorSearch {
    pub fn new(hits: Vec<VectorSearchHit>) -> Self {
        Self { hits: Mutex::new(hits), calls: AtomicUsize::new(0) }
    }

    /// Provider that finds nothing
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorSearchProvider for MockVectorSearch {
    async fn search(
        &self,
        _collection: &str,
        _query_vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<VectorSearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hits = self.hits.lock();
        Ok(hits
            .iter()
            .filter(|h| h.score >= min_score)
            .take(top_k)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "mock-vector-search"
    }
}

/// Completion provider that returns a canned answer
pub struct MockLlm {
    answer: String,
    fail_transient: bool,
    calls: AtomicUsize,
    /// Last prompt received, for assertions on prompt composition
    last_prompt: Mutex<Option<String>>,
}

impl MockLlm {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            fail_transient: false,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Make every call fail with a transient error
    pub fn failing() -> Self {
        Self {
            answer: String::new(),
            fail_transient: true,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_transient {
            return Err(Error::transient("completion", "mock timeout"));
        }
        *self.last_prompt.lock() = Some(request.prompt.clone());
        Ok(CompletionResponse {
            text: self.answer.clone(),
            model_id: "mock-model".to_string(),
            usage: TokenUsage { prompt_tokens: 100, completion_tokens: 50 },
        })
    }

    fn name(&self) -> &str {
        "mock-llm"
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
