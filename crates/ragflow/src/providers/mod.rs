//! Provider abstractions for the external embedding, completion, and
//! vector-similarity services
//!
//! Trait seams keep the pipeline independent of any one backend and let
//! tests substitute deterministic mocks.

pub mod embedding;
pub mod llm;
pub mod mock;
pub mod openai;
pub mod qdrant;
pub mod vector_store;

pub use embedding::EmbeddingProvider;
pub use llm::{CompletionProvider, CompletionRequest, CompletionResponse, TokenUsage};
pub use openai::{OpenAiEmbedder, OpenAiLlm};
pub use qdrant::QdrantSearch;
pub use vector_store::{VectorSearchHit, VectorSearchProvider};
