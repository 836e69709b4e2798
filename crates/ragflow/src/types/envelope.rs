//! Broker message envelope for query jobs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A serialized query job pulled from the broker queue
///
/// The envelope is validated on receipt; a message that cannot be
/// deserialized into this shape is negatively acknowledged and eventually
/// dead-lettered rather than retried forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryJob {
    /// Unique message id, distinct from the query id
    pub message_id: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub query_id: Uuid,
    pub query_text: String,
    pub collection: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Override for the configured top_k
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Override for the configured minimum similarity score
    #[serde(default)]
    pub min_score: Option<f32>,
}

impl QueryJob {
    /// Create an envelope for a question against a collection
    pub fn new(query_id: Uuid, query_text: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            message_id: format!("msg_{}", Uuid::new_v4()),
            submitted_at: Utc::now(),
            correlation_id: None,
            query_id,
            query_text: query_text.into(),
            collection: collection.into(),
            language: None,
            top_k: None,
            min_score: None,
        }
    }

    /// Set the correlation id
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_round_trip() {
        let job = QueryJob::new(Uuid::new_v4(), "Quais são as reclamações mais comuns?", "reviews")
            .with_correlation_id("sess_abc");
        let raw = serde_json::to_string(&job).unwrap();
        let parsed: QueryJob = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.query_id, job.query_id);
        assert_eq!(parsed.collection, "reviews");
        assert_eq!(parsed.correlation_id.as_deref(), Some("sess_abc"));
    }

    #[test]
    fn test_envelope_rejects_missing_fields() {
        let raw = r#"{"message_id":"msg_1","query_text":"hello"}"#;
        assert!(serde_json::from_str::<QueryJob>(raw).is_err());
    }
}
