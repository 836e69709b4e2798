//! Grounded answer generation

pub mod prompt;
pub mod safety;

use std::sync::Arc;
use std::time::Instant;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::providers::{CompletionProvider, CompletionRequest, TokenUsage};
use crate::types::RetrievalResult;

use prompt::PromptBuilder;
use safety::validate_answer_safety;

/// Outcome of one generation call
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub answer_text: String,
    pub model_id: String,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    /// Whether the answer tripped the post-generation safety check and was
    /// replaced with a refusal
    pub safety_tripped: bool,
    /// Number of context passages that fit the token budget
    pub passages_used: usize,
}

/// Generates grounded answers from retrieved context
///
/// The generator owns prompt composition and the post-generation safety
/// check. It never decides escalation; that is the scorer's job.
pub struct Generator {
    llm: Arc<dyn CompletionProvider>,
    config: LlmConfig,
}

impl Generator {
    pub fn new(llm: Arc<dyn CompletionProvider>, config: &LlmConfig) -> Self {
        Self { llm, config: config.clone() }
    }

    /// Whether a fallback answer should be generated when retrieval found
    /// nothing
    pub fn answers_on_empty_retrieval(&self) -> bool {
        self.config.answer_on_empty_retrieval
    }

    /// Generate an answer for the question from the ordered context passages.
    ///
    /// Transient service failures are retried inside the provider client; an
    /// exhausted retry budget surfaces here as `GenerationFailed` rather than
    /// a fabricated answer.
    pub async fn generate(
        &self,
        question: &str,
        passages: &[RetrievalResult],
    ) -> Result<GenerationOutcome> {
        let builder = PromptBuilder::new(self.config.context_token_budget);
        let (context, passages_used) = builder.build_context(passages);

        if passages_used < passages.len() {
            tracing::debug!(
                "context truncated to top {} of {} passages to fit the token budget",
                passages_used,
                passages.len()
            );
        }

        let request = CompletionRequest {
            system: PromptBuilder::system_prompt(),
            prompt: PromptBuilder::user_prompt(question, &context),
            temperature: self.config.temperature,
            max_tokens: self.config.max_answer_tokens,
        };

        let start = Instant::now();
        let response = match self.llm.complete(&request).await {
            Ok(response) => response,
            Err(Error::Transient { message, .. }) => {
                return Err(Error::GenerationFailed {
                    attempts: self.config.max_retries + 1,
                    message,
                });
            }
            Err(e) => return Err(e),
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        let answer_text = response.text.trim().to_string();
        if answer_text.is_empty() {
            return Err(Error::GenerationFailed {
                attempts: 1,
                message: "completion service returned an empty answer".to_string(),
            });
        }

        // Second line of defense: the answer itself must not leak system
        // internals even if the prompt rules were bypassed.
        let (answer_text, safety_tripped) = match validate_answer_safety(&answer_text) {
            Ok(()) => (answer_text, false),
            Err(reason) => {
                tracing::warn!("generated answer failed safety validation: {reason}");
                (safety::refusal_text().to_string(), true)
            }
        };

        Ok(GenerationOutcome {
            answer_text,
            model_id: response.model_id,
            usage: response.usage,
            latency_ms,
            safety_tripped,
            passages_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockLlm;
    use uuid::Uuid;

    fn passage(rank: u32, text: &str) -> RetrievalResult {
        RetrievalResult {
            query_id: Uuid::new_v4(),
            chunk_id: Uuid::new_v4(),
            similarity: 0.9,
            rank,
            rerank_score: None,
            content: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_generates_answer_with_context() {
        let llm = Arc::new(MockLlm::new("Delivery delays are the top complaint."));
        let generator = Generator::new(llm.clone(), &LlmConfig::default());

        let passages = vec![passage(1, "Many reviews mention late deliveries.")];
        let outcome = generator.generate("What do customers complain about?", &passages).await.unwrap();

        assert_eq!(outcome.answer_text, "Delivery delays are the top complaint.");
        assert!(!outcome.safety_tripped);
        assert_eq!(outcome.passages_used, 1);

        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("late deliveries"));
        assert!(prompt.contains("What do customers complain about?"));
    }

    #[tokio::test]
    async fn test_transient_exhaustion_is_generation_failure() {
        let generator = Generator::new(Arc::new(MockLlm::failing()), &LlmConfig::default());
        let result = generator.generate("question?", &[]).await;
        assert!(matches!(result, Err(Error::GenerationFailed { .. })));
    }

    #[tokio::test]
    async fn test_leaky_answer_replaced_with_refusal() {
        let llm = Arc::new(MockLlm::new("As an AI language model, my system prompt says..."));
        let generator = Generator::new(llm, &LlmConfig::default());

        let outcome = generator.generate("who are you?", &[passage(1, "text")]).await.unwrap();
        assert!(outcome.safety_tripped);
        assert_eq!(outcome.answer_text, safety::refusal_text());
    }
}
