//! Configuration for the query-processing worker

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main worker configuration
///
/// Every component receives the section it needs at construction time; no
/// component reads process-wide state, so tests can override values per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagflowConfig {
    /// Guardrails (input validation) configuration
    #[serde(default)]
    pub guardrails: GuardrailsConfig,
    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Vector similarity service configuration
    #[serde(default)]
    pub vector_search: VectorSearchConfig,
    /// Completion (LLM) service configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Confidence scoring configuration
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Answer cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Queue consumer / dispatcher configuration
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Relational store configuration
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl RagflowConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.as_ref().display())))
    }
}

/// Input validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailsConfig {
    /// Maximum question length in characters; longer input is rejected,
    /// never truncated
    pub max_query_length: usize,
    /// Minimum question length in characters
    pub min_query_length: usize,
    /// Enable PII detection and redaction
    #[serde(default = "default_true")]
    pub enable_pii_detection: bool,
    /// Enable prompt injection detection
    #[serde(default = "default_true")]
    pub enable_injection_detection: bool,
}

impl Default for GuardrailsConfig {
    fn default() -> Self {
        Self {
            max_query_length: 1000,
            min_query_length: 3,
            enable_pii_detection: true,
            enable_injection_detection: true,
        }
    }
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service
    pub base_url: String,
    /// API key (empty for unauthenticated local services)
    #[serde(default)]
    pub api_key: String,
    /// Model identifier
    pub model: String,
    /// Expected vector dimensionality; a mismatch with the service response
    /// is a fatal configuration error
    pub dimensions: usize,
    /// Batch size for ingestion-time embedding
    pub batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retry attempts for transient failures
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 100,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Vector similarity service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchConfig {
    /// Base URL of the vector store
    pub base_url: String,
    /// API key (empty for unauthenticated local services)
    #[serde(default)]
    pub api_key: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retry attempts for transient failures
    pub max_retries: u32,
}

impl Default for VectorSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:6333".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// Completion (LLM) service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the completion service
    pub base_url: String,
    /// API key (empty for unauthenticated local services)
    #[serde(default)]
    pub api_key: String,
    /// Generation model identifier
    pub model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tokens for the generated answer
    pub max_answer_tokens: u32,
    /// Token budget for the whole prompt (context is truncated by passage
    /// rank to stay within it)
    pub context_token_budget: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Generate a fallback answer when retrieval returned nothing; when
    /// false, generation is skipped on empty retrieval
    #[serde(default = "default_true")]
    pub answer_on_empty_retrieval: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8082".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_answer_tokens: 500,
            context_token_budget: 3000,
            timeout_secs: 60,
            max_retries: 3,
            answer_on_empty_retrieval: true,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default collection to search
    pub default_collection: String,
    /// Maximum chunks to retrieve per query
    pub top_k: usize,
    /// Minimum similarity score; results below it are discarded
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_collection: "documents".to_string(),
            top_k: 10,
            min_score: 0.0,
        }
    }
}

/// Confidence scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Queries scoring below this threshold are escalated to a human
    pub escalation_threshold: f32,
    /// Number of top retrieval results averaged for the similarity signal
    pub top_n: usize,
    /// Weight of the mean retrieval similarity signal
    pub similarity_weight: f32,
    /// Weight of the claim-coverage signal
    pub coverage_weight: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: 0.7,
            top_n: 5,
            similarity_weight: 0.7,
            coverage_weight: 0.3,
        }
    }
}

/// Answer cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the exact-match answer cache
    #[serde(default)]
    pub enabled: bool,
    /// Time-to-live for cached answers in seconds
    pub ttl_secs: u64,
    /// Maximum cached entries
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 3600,
            max_entries: 1000,
        }
    }
}

/// Queue consumer / dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum orchestrator runs in flight at once (the prefetch ceiling);
    /// polling stops while the ceiling is reached
    pub concurrency: usize,
    /// Delivery attempts before a job is dead-lettered
    pub max_delivery_attempts: u32,
    /// Poll interval in milliseconds when the queue is empty
    pub poll_interval_ms: u64,
    /// Worker identifier used in audit records
    #[serde(default = "default_worker_id")]
    pub worker_id: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_delivery_attempts: 3,
            poll_interval_ms: 250,
            worker_id: default_worker_id(),
        }
    }
}

/// Relational store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
    /// Connection pool size; sized to the dispatcher concurrency so each
    /// in-flight run holds one connection
    pub pool_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ragflow.db"),
            pool_size: 10,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_worker_id() -> String {
    format!("query-worker-{}", std::process::id())
}
