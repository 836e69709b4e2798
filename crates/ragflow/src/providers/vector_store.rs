//! Vector similarity service trait

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// A single nearest-neighbour hit returned by the vector store
#[derive(Debug, Clone)]
pub struct VectorSearchHit {
    pub chunk_id: Uuid,
    /// Similarity score in [0, 1], higher is more similar
    pub score: f32,
}

/// Trait for nearest-neighbour search against an external vector store
///
/// Implementations must return hits in the store's native order (best
/// first); callers rely on that order being stable for equal scores.
#[async_trait]
pub trait VectorSearchProvider: Send + Sync {
    /// Search `collection` for the `top_k` nearest neighbours of
    /// `query_vector`, dropping hits below `min_score`
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<VectorSearchHit>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
