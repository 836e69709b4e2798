//! Embedding provider trait

use async_trait::async_trait;

use crate::error::Result;

/// Trait for generating text embeddings
///
/// Single-item mode is used for query-time encoding where latency matters;
/// batch mode amortizes call overhead at ingestion time.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts
    ///
    /// Default implementation calls `embed` sequentially; implementations
    /// with native batch endpoints should override it.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Vector dimensionality this provider produces
    fn dimensions(&self) -> usize;

    /// Provider name for logging
    fn name(&self) -> &str;
}
