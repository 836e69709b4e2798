//! Query record and its lifecycle states

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Escalated,
}

impl QueryStatus {
    /// Whether this status is terminal; terminal queries are never mutated
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Escalated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }
}

/// Pipeline stage, persisted after every transition so a crash mid-pipeline
/// leaves an inspectable record of where processing stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Validating,
    Embedding,
    Retrieving,
    Generating,
    Scoring,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::Generating => "generating",
            Self::Scoring => "scoring",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(Self::Received),
            "validating" => Some(Self::Validating),
            "embedding" => Some(Self::Embedding),
            "retrieving" => Some(Self::Retrieving),
            "generating" => Some(Self::Generating),
            "scoring" => Some(Self::Scoring),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// A user question moving through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    /// Original question text as submitted
    pub raw_text: String,
    /// Question text after guardrail sanitization; set once validation runs
    pub sanitized_text: Option<String>,
    /// Language code from the job envelope
    pub language: String,
    /// Collection searched for this query
    pub collection: String,
    pub submitted_at: DateTime<Utc>,
    pub status: QueryStatus,
    pub stage: PipelineStage,
    /// Correlation id for tracing across services
    pub correlation_id: Option<String>,
    /// Structured reason recorded when the query fails
    pub failure_reason: Option<String>,
}

impl Query {
    /// Create a new pending query
    pub fn new(id: Uuid, raw_text: String, collection: String, language: String) -> Self {
        Self {
            id,
            raw_text,
            sanitized_text: None,
            language,
            collection,
            submitted_at: Utc::now(),
            status: QueryStatus::Pending,
            stage: PipelineStage::Received,
            correlation_id: None,
            failure_reason: None,
        }
    }

    /// Set the correlation id
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}
