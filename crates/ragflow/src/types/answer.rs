//! Answer and retrieval-result records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of the post-generation answer safety check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerValidation {
    /// Answer passed all checks
    Passed,
    /// Answer produced from input that required PII redaction
    Warnings,
    /// Answer tripped the safety check and was replaced with a refusal
    Failed,
}

impl AnswerValidation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Warnings => "warnings",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "passed" => Some(Self::Passed),
            "warnings" => Some(Self::Warnings),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A retrieved chunk linked to a query with relevance scoring
///
/// Ranks are 1-indexed, contiguous, and unique per query; rank 1 is the most
/// similar result. Ordering preserves the vector store's native order for
/// equal scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query_id: Uuid,
    pub chunk_id: Uuid,
    /// Cosine similarity in [0, 1]
    pub similarity: f32,
    pub rank: u32,
    pub rerank_score: Option<f32>,
    /// Chunk text, joined from the relational store
    pub content: String,
}

/// A generated response to a query, created exactly once
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub query_id: Uuid,
    pub answer_text: String,
    /// Composite confidence in [0, 1]
    pub confidence: f32,
    /// Model identifier reported by the completion service
    pub model_id: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
    /// Whether the answer came from the cache without running the pipeline
    pub cache_hit: bool,
    /// Whether the query was escalated to a human
    pub escalated: bool,
    pub validation_status: AnswerValidation,
    pub created_at: DateTime<Utc>,
}
