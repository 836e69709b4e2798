//! Chunk retrieval: nearest-neighbour search joined with stored chunk text

use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::providers::VectorSearchProvider;
use crate::storage::Database;
use crate::types::RetrievalResult;

/// Retrieves relevant chunks for a query vector
pub struct Retriever {
    vector_search: Arc<dyn VectorSearchProvider>,
    database: Arc<Database>,
}

impl Retriever {
    pub fn new(vector_search: Arc<dyn VectorSearchProvider>, database: Arc<Database>) -> Self {
        Self { vector_search, database }
    }

    /// Retrieve up to `top_k` chunks for the query vector, scoped to
    /// `collection` and filtered by `min_score`.
    ///
    /// Hits keep the vector store's native ordering; equal scores are never
    /// re-sorted with a secondary key. A hit whose chunk row is missing from
    /// storage (data drift) is dropped and logged instead of failing the
    /// whole retrieval. Ranks are assigned 1..N over the surviving results.
    /// An empty result set is a normal outcome, not an error.
    pub async fn retrieve(
        &self,
        query_id: Uuid,
        query_vector: &[f32],
        collection: &str,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<RetrievalResult>> {
        let hits = self
            .vector_search
            .search(collection, query_vector, top_k, min_score)
            .await?;

        tracing::debug!(
            "vector store returned {} hits for query {} in '{}'",
            hits.len(),
            query_id,
            collection
        );

        let mut results = Vec::with_capacity(hits.len());
        let mut rank = 0u32;

        for hit in hits {
            // The store-side threshold is enforced locally as well
            if hit.score < min_score {
                continue;
            }

            match self.database.get_chunk(hit.chunk_id)? {
                Some(chunk) => {
                    rank += 1;
                    results.push(RetrievalResult {
                        query_id,
                        chunk_id: hit.chunk_id,
                        similarity: hit.score,
                        rank,
                        rerank_score: None,
                        content: chunk.content,
                    });
                }
                None => {
                    tracing::warn!(
                        "chunk {} returned by vector store but missing from storage, dropping",
                        hit.chunk_id
                    );
                }
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockVectorSearch;
    use crate::providers::VectorSearchHit;
    use crate::types::Chunk;

    fn seeded_db(chunk_ids: &[Uuid]) -> Arc<Database> {
        let db = Database::in_memory().unwrap();
        for (i, id) in chunk_ids.iter().enumerate() {
            let mut chunk = Chunk::new(
                Uuid::new_v4(),
                format!("chunk text {i}"),
                i as u32,
                0,
                12,
            );
            chunk.id = *id;
            db.insert_chunk(&chunk).unwrap();
        }
        Arc::new(db)
    }

    #[tokio::test]
    async fn test_ranks_contiguous_and_order_preserved() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let hits = vec![
            VectorSearchHit { chunk_id: ids[0], score: 0.9 },
            VectorSearchHit { chunk_id: ids[1], score: 0.8 },
            VectorSearchHit { chunk_id: ids[2], score: 0.8 },
        ];
        let retriever = Retriever::new(Arc::new(MockVectorSearch::new(hits)), seeded_db(&ids));

        let results = retriever
            .retrieve(Uuid::new_v4(), &[0.1; 4], "docs", 10, 0.0)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.rank, i as u32 + 1);
        }
        // Equal scores keep the store's order
        assert_eq!(results[1].chunk_id, ids[1]);
        assert_eq!(results[2].chunk_id, ids[2]);
    }

    #[tokio::test]
    async fn test_missing_chunk_dropped_not_fatal() {
        let known = Uuid::new_v4();
        let missing = Uuid::new_v4();
        let hits = vec![
            VectorSearchHit { chunk_id: missing, score: 0.95 },
            VectorSearchHit { chunk_id: known, score: 0.85 },
        ];
        let retriever = Retriever::new(Arc::new(MockVectorSearch::new(hits)), seeded_db(&[known]));

        let results = retriever
            .retrieve(Uuid::new_v4(), &[0.1; 4], "docs", 10, 0.0)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, known);
        assert_eq!(results[0].rank, 1);
    }

    #[tokio::test]
    async fn test_below_threshold_filtered() {
        let ids: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();
        let hits = vec![
            VectorSearchHit { chunk_id: ids[0], score: 0.9 },
            VectorSearchHit { chunk_id: ids[1], score: 0.2 },
        ];
        let retriever = Retriever::new(Arc::new(MockVectorSearch::new(hits)), seeded_db(&ids));

        let results = retriever
            .retrieve(Uuid::new_v4(), &[0.1; 4], "docs", 10, 0.5)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, ids[0]);
    }

    #[tokio::test]
    async fn test_empty_retrieval_is_ok() {
        let retriever = Retriever::new(Arc::new(MockVectorSearch::empty()), seeded_db(&[]));
        let results = retriever
            .retrieve(Uuid::new_v4(), &[0.1; 4], "docs", 10, 0.5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
