//! ragflow: queue-driven question answering over an ingested document corpus
//!
//! This crate implements the query-processing pipeline of a RAG system: a
//! worker pulls query jobs from a durable queue, validates and sanitizes the
//! question, embeds it, retrieves semantically relevant chunks from an
//! external vector store, asks an external completion service for a grounded
//! answer, scores confidence, and either completes the query or escalates it
//! to a human. External services are reached through provider traits so the
//! pipeline stays independent of any one backend.

pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod guardrails;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod retry;
pub mod scoring;
pub mod storage;
pub mod types;

pub use config::RagflowConfig;
pub use error::{Error, Result};
pub use processing::{PipelineOutcome, QueryConsumer, QueryPipeline};
pub use types::{Answer, Query, QueryJob, QueryStatus};
