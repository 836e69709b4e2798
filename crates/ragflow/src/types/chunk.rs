//! Chunk record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded segment of source-document text
///
/// Chunks are created during ingestion and only read by the query pipeline.
/// The embedding vector lives in the external vector store; the relational
/// row carries the text and its position within the parent document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Chunk text content
    pub content: String,
    /// Sequence position within the parent document (0-based)
    pub seq: u32,
    /// Token count of the content
    pub token_count: u32,
    /// Character offset where the chunk starts in the source document
    pub char_start: usize,
    /// Character offset where the chunk ends
    pub char_end: usize,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// Create a chunk with token count estimated from the content
    pub fn new(document_id: Uuid, content: String, seq: u32, char_start: usize, char_end: usize) -> Self {
        let token_count = crate::generation::prompt::estimate_tokens(&content) as u32;
        Self {
            id: Uuid::new_v4(),
            document_id,
            content,
            seq,
            token_count,
            char_start,
            char_end,
            created_at: Utc::now(),
        }
    }
}
