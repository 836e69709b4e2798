//! Pipeline orchestrator: one query from job envelope to terminal state
//!
//! The pipeline is a strictly forward state machine
//! (received → validating → embedding → retrieving → generating → scoring →
//! completed | escalated | failed); no state is revisited. The current stage
//! is persisted before each step runs, so a crash mid-pipeline leaves an
//! inspectable record of where processing stopped. Crash recovery itself is
//! not implemented; stalled jobs are only counted at startup.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::cache::{AnswerCache, CachedAnswer};
use crate::config::{RagflowConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::generation::{GenerationOutcome, Generator};
use crate::guardrails::{QueryValidator, Verdict};
use crate::providers::{CompletionProvider, EmbeddingProvider, VectorSearchProvider};
use crate::retrieval::Retriever;
use crate::scoring::ConfidenceScorer;
use crate::storage::Database;
use crate::types::{
    Answer, AnswerValidation, AuditEvent, AuditEventType, EscalationReason, EscalationRequest,
    PipelineStage, Query, QueryJob, QueryStatus, RetrievalResult, Severity,
};

/// Terminal outcome of one pipeline run
///
/// All three outcomes mean a definitive result was recorded; the consumer
/// acknowledges the broker message for any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// An answer was produced and persisted
    Completed,
    /// The query was routed to a human, with its answer attached if one exists
    Escalated,
    /// The query failed with a structured reason; no answer is available
    Failed,
}

impl PipelineOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Escalated => "escalated",
            Self::Failed => "failed",
        }
    }
}

/// State value threaded through the runner
///
/// Each variant carries exactly the data the next step needs; component
/// failures collapse into `Terminal` with the structured reason already
/// persisted on the query row.
enum Step {
    Validating,
    Embedding {
        sanitized: String,
        redacted: bool,
    },
    Retrieving {
        sanitized: String,
        redacted: bool,
        vector: Vec<f32>,
    },
    Generating {
        sanitized: String,
        redacted: bool,
        results: Vec<RetrievalResult>,
        retrieval_ms: u64,
    },
    Scoring {
        sanitized: String,
        redacted: bool,
        results: Vec<RetrievalResult>,
        retrieval_ms: u64,
        generation: Option<GenerationOutcome>,
    },
    Terminal(PipelineOutcome),
}

/// Orchestrates the processing of one query
///
/// Every component receives its configuration section at construction; the
/// pipeline itself holds no mutable state, so one instance serves any number
/// of concurrent runs.
pub struct QueryPipeline {
    database: Arc<Database>,
    validator: QueryValidator,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    generator: Generator,
    scorer: ConfidenceScorer,
    cache: Arc<AnswerCache>,
    retrieval: RetrievalConfig,
    worker_id: String,
}

impl QueryPipeline {
    pub fn new(
        database: Arc<Database>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_search: Arc<dyn VectorSearchProvider>,
        llm: Arc<dyn CompletionProvider>,
        cache: Arc<AnswerCache>,
        config: &RagflowConfig,
    ) -> Self {
        Self {
            validator: QueryValidator::new(&config.guardrails),
            retriever: Retriever::new(vector_search, database.clone()),
            generator: Generator::new(llm, &config.llm),
            scorer: ConfidenceScorer::new(&config.scoring),
            retrieval: config.retrieval.clone(),
            worker_id: config.worker.worker_id.clone(),
            database,
            embedder,
            cache,
        }
    }

    /// Run one query job to a terminal state.
    ///
    /// Component failures are absorbed into a `Failed` outcome with the
    /// reason persisted; an `Err` from this function means the worker itself
    /// could not record state and the job should be negatively acknowledged.
    pub async fn process(&self, job: &QueryJob) -> Result<PipelineOutcome> {
        let started = Instant::now();
        let language = job.language.clone().unwrap_or_else(|| "pt-BR".to_string());
        let query = Query::new(job.query_id, job.query_text.clone(), job.collection.clone(), language)
            .with_correlation_id(job.correlation_id.clone());
        self.database.upsert_query(&query)?;

        let mut step = Step::Validating;
        loop {
            step = self.advance(job, started, step).await?;
            if let Step::Terminal(outcome) = step {
                tracing::info!(
                    "query {} reached terminal state '{}' in {}ms",
                    job.query_id,
                    outcome.as_str(),
                    started.elapsed().as_millis()
                );
                return Ok(outcome);
            }
        }
    }

    async fn advance(&self, job: &QueryJob, started: Instant, step: Step) -> Result<Step> {
        match step {
            Step::Validating => self.validate(job, started),
            Step::Embedding { sanitized, redacted } => self.embed(job, sanitized, redacted).await,
            Step::Retrieving { sanitized, redacted, vector } => {
                self.retrieve(job, sanitized, redacted, vector).await
            }
            Step::Generating { sanitized, redacted, results, retrieval_ms } => {
                self.generate(job, sanitized, redacted, results, retrieval_ms).await
            }
            Step::Scoring { sanitized, redacted, results, retrieval_ms, generation } => {
                self.score(job, started, sanitized, redacted, results, retrieval_ms, generation)
            }
            terminal @ Step::Terminal(_) => Ok(terminal),
        }
    }

    fn validate(&self, job: &QueryJob, started: Instant) -> Result<Step> {
        self.database
            .update_query_stage(job.query_id, QueryStatus::Processing, PipelineStage::Validating)?;

        let outcome = self.validator.validate(&job.query_text);
        if let Verdict::Rejected(reason) = outcome.verdict {
            let event_type = if reason.contains("prompt injection") {
                AuditEventType::PromptInjectionDetected
            } else {
                AuditEventType::ValidationFailed
            };
            self.audit(
                AuditEvent::for_query(
                    event_type,
                    &self.worker_id,
                    job.query_id,
                    Severity::Warning,
                    json!({ "reason": reason }),
                )
                .with_error(&reason),
            );
            tracing::warn!("query {} rejected by guardrails: {reason}", job.query_id);
            let error = Error::InputRejected(reason);
            self.database.mark_query_terminal(
                job.query_id,
                QueryStatus::Failed,
                Some(&error.to_string()),
            )?;
            return Ok(Step::Terminal(PipelineOutcome::Failed));
        }

        let Some(sanitized) = outcome.sanitized else {
            let error = Error::InputRejected("no sanitized text produced".to_string());
            self.database.mark_query_terminal(
                job.query_id,
                QueryStatus::Failed,
                Some(&error.to_string()),
            )?;
            return Ok(Step::Terminal(PipelineOutcome::Failed));
        };
        let redacted = !outcome.redactions.is_empty();

        self.database.set_sanitized_text(job.query_id, &sanitized)?;
        for redaction in &outcome.redactions {
            self.audit(AuditEvent::for_query(
                AuditEventType::PiiRedacted,
                &self.worker_id,
                job.query_id,
                Severity::Warning,
                json!({ "placeholder": redaction.placeholder, "count": redaction.count }),
            ));
        }

        // A cache hit short-circuits everything downstream of validation
        if let Some(hit) = self.cache.get(&job.collection, &sanitized) {
            return self.complete_from_cache(job, started, hit, redacted);
        }

        Ok(Step::Embedding { sanitized, redacted })
    }

    fn complete_from_cache(
        &self,
        job: &QueryJob,
        started: Instant,
        hit: CachedAnswer,
        redacted: bool,
    ) -> Result<Step> {
        let validation_status = if redacted && hit.validation_status == AnswerValidation::Passed {
            AnswerValidation::Warnings
        } else {
            hit.validation_status
        };

        let answer = Answer {
            id: Uuid::new_v4(),
            query_id: job.query_id,
            answer_text: hit.answer_text,
            confidence: hit.confidence,
            model_id: hit.model_id,
            prompt_tokens: 0,
            completion_tokens: 0,
            retrieval_ms: 0,
            generation_ms: 0,
            total_ms: started.elapsed().as_millis() as u64,
            cache_hit: true,
            escalated: false,
            validation_status,
            created_at: Utc::now(),
        };
        self.database.insert_answer(&answer)?;
        self.audit(AuditEvent::for_query(
            AuditEventType::CacheHit,
            &self.worker_id,
            job.query_id,
            Severity::Info,
            json!({ "collection": job.collection, "hit_count": hit.hit_count }),
        ));
        self.database.mark_query_terminal(job.query_id, QueryStatus::Completed, None)?;
        tracing::debug!("query {} answered from cache", job.query_id);
        Ok(Step::Terminal(PipelineOutcome::Completed))
    }

    async fn embed(&self, job: &QueryJob, sanitized: String, redacted: bool) -> Result<Step> {
        self.database
            .update_query_stage(job.query_id, QueryStatus::Processing, PipelineStage::Embedding)?;

        match self.embedder.embed(&sanitized).await {
            Ok(vector) => Ok(Step::Retrieving { sanitized, redacted, vector }),
            Err(e) => self.fail(job.query_id, &e),
        }
    }

    async fn retrieve(
        &self,
        job: &QueryJob,
        sanitized: String,
        redacted: bool,
        vector: Vec<f32>,
    ) -> Result<Step> {
        self.database
            .update_query_stage(job.query_id, QueryStatus::Processing, PipelineStage::Retrieving)?;

        let top_k = job.top_k.unwrap_or(self.retrieval.top_k);
        let min_score = job.min_score.unwrap_or(self.retrieval.min_score);

        let timer = Instant::now();
        match self
            .retriever
            .retrieve(job.query_id, &vector, &job.collection, top_k, min_score)
            .await
        {
            Ok(results) => {
                let retrieval_ms = timer.elapsed().as_millis() as u64;
                self.database.insert_retrieval_results(&results)?;
                Ok(Step::Generating { sanitized, redacted, results, retrieval_ms })
            }
            Err(e) => self.fail(job.query_id, &e),
        }
    }

    async fn generate(
        &self,
        job: &QueryJob,
        sanitized: String,
        redacted: bool,
        results: Vec<RetrievalResult>,
        retrieval_ms: u64,
    ) -> Result<Step> {
        self.database
            .update_query_stage(job.query_id, QueryStatus::Processing, PipelineStage::Generating)?;

        if results.is_empty() && !self.generator.answers_on_empty_retrieval() {
            tracing::info!(
                "no evidence found for query {} and fallback generation is disabled, skipping",
                job.query_id
            );
            return Ok(Step::Scoring { sanitized, redacted, results, retrieval_ms, generation: None });
        }

        match self.generator.generate(&sanitized, &results).await {
            Ok(generation) => Ok(Step::Scoring {
                sanitized,
                redacted,
                results,
                retrieval_ms,
                generation: Some(generation),
            }),
            Err(e) => self.fail(job.query_id, &e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn score(
        &self,
        job: &QueryJob,
        started: Instant,
        sanitized: String,
        redacted: bool,
        results: Vec<RetrievalResult>,
        retrieval_ms: u64,
        generation: Option<GenerationOutcome>,
    ) -> Result<Step> {
        self.database
            .update_query_stage(job.query_id, QueryStatus::Processing, PipelineStage::Scoring)?;

        let confidence = self.scorer.score(&results, generation.as_ref());
        let validation_status = match &generation {
            Some(g) if g.safety_tripped => AnswerValidation::Failed,
            _ if redacted => AnswerValidation::Warnings,
            _ => AnswerValidation::Passed,
        };
        let escalate = self.scorer.should_escalate(confidence, validation_status);
        let total_ms = started.elapsed().as_millis() as u64;

        let answer = generation.as_ref().map(|g| Answer {
            id: Uuid::new_v4(),
            query_id: job.query_id,
            answer_text: g.answer_text.clone(),
            confidence,
            model_id: g.model_id.clone(),
            prompt_tokens: g.usage.prompt_tokens,
            completion_tokens: g.usage.completion_tokens,
            retrieval_ms,
            generation_ms: g.latency_ms,
            total_ms,
            cache_hit: false,
            escalated: escalate,
            validation_status,
            created_at: Utc::now(),
        });
        if let Some(answer) = &answer {
            self.database.insert_answer(answer)?;
        }

        if escalate {
            let reason = if validation_status == AnswerValidation::Failed {
                EscalationReason::ValidationFailure
            } else {
                EscalationReason::LowConfidence
            };
            let escalation = EscalationRequest::new(
                job.query_id,
                answer.as_ref().map(|a| a.id),
                reason,
                Some(confidence),
            );
            self.database.insert_escalation(&escalation)?;
            self.audit(AuditEvent::for_query(
                AuditEventType::EscalationCreated,
                &self.worker_id,
                job.query_id,
                Severity::Warning,
                json!({
                    "reason": reason.as_str(),
                    "confidence": confidence,
                    "priority": escalation.priority,
                }),
            ));
            tracing::info!(
                "query {} escalated ({}, confidence {confidence:.3})",
                job.query_id,
                reason.as_str()
            );
            self.database.mark_query_terminal(job.query_id, QueryStatus::Escalated, None)?;
            return Ok(Step::Terminal(PipelineOutcome::Escalated));
        }

        if let Some(answer) = &answer {
            self.cache.put(
                &job.collection,
                &sanitized,
                CachedAnswer {
                    answer_text: answer.answer_text.clone(),
                    confidence,
                    model_id: answer.model_id.clone(),
                    validation_status,
                    hit_count: 0,
                },
            );
        }
        self.audit(AuditEvent::for_query(
            AuditEventType::QueryProcessed,
            &self.worker_id,
            job.query_id,
            Severity::Info,
            json!({
                "confidence": confidence,
                "results": results.len(),
                "retrieval_ms": retrieval_ms,
                "total_ms": total_ms,
            }),
        ));
        self.database.mark_query_terminal(job.query_id, QueryStatus::Completed, None)?;
        Ok(Step::Terminal(PipelineOutcome::Completed))
    }

    /// Record a component failure as the query's terminal state
    fn fail(&self, query_id: Uuid, error: &Error) -> Result<Step> {
        tracing::error!("query {query_id} failed: {error}");
        self.audit(
            AuditEvent::for_query(
                AuditEventType::QueryFailed,
                &self.worker_id,
                query_id,
                Severity::Error,
                json!({}),
            )
            .with_error(error.to_string()),
        );
        self.database
            .mark_query_terminal(query_id, QueryStatus::Failed, Some(&error.to_string()))?;
        Ok(Step::Terminal(PipelineOutcome::Failed))
    }

    /// Audit records are best-effort; a failed insert must not fail the query
    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.database.insert_audit_event(&event) {
            tracing::error!("failed to record audit event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::{MockEmbedder, MockLlm, MockVectorSearch};
    use crate::providers::VectorSearchHit;
    use crate::types::Chunk;

    fn build(
        config: &RagflowConfig,
        database: &Arc<Database>,
        embedder: &Arc<MockEmbedder>,
        vector_search: &Arc<MockVectorSearch>,
        llm: &Arc<MockLlm>,
    ) -> QueryPipeline {
        QueryPipeline::new(
            database.clone(),
            embedder.clone(),
            vector_search.clone(),
            llm.clone(),
            Arc::new(AnswerCache::new(&config.cache)),
            config,
        )
    }

    fn seed_chunks(database: &Database, count: usize, content: &str) -> Vec<VectorSearchHit> {
        (0..count)
            .map(|i| {
                let chunk = Chunk::new(Uuid::new_v4(), content.to_string(), i as u32, 0, content.len());
                database.insert_chunk(&chunk).unwrap();
                VectorSearchHit { chunk_id: chunk.id, score: 0.85 }
            })
            .collect()
    }

    const REVIEW_CHUNK: &str =
        "As avaliações negativas citam atrasos na entrega e embalagens danificadas";
    const REVIEW_ANSWER: &str =
        "Os principais motivos de avaliações negativas são atrasos na entrega e embalagens danificadas.";

    #[tokio::test]
    async fn test_grounded_question_completes_with_high_confidence() {
        let config = RagflowConfig::default();
        let database = Arc::new(Database::in_memory().unwrap());
        let hits = seed_chunks(&database, 5, REVIEW_CHUNK);
        let embedder = Arc::new(MockEmbedder::new(8));
        let vector_search = Arc::new(MockVectorSearch::new(hits));
        let llm = Arc::new(MockLlm::new(REVIEW_ANSWER));
        let pipeline = build(&config, &database, &embedder, &vector_search, &llm);

        let job = QueryJob::new(
            Uuid::new_v4(),
            "Quais são os principais motivos de avaliações negativas?",
            "reviews",
        );
        let outcome = pipeline.process(&job).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Completed);

        let query = database.get_query(job.query_id).unwrap().unwrap();
        assert_eq!(query.status, QueryStatus::Completed);
        assert_eq!(query.stage, PipelineStage::Done);

        let answer = database.get_answer_for_query(job.query_id).unwrap().unwrap();
        assert!(answer.confidence >= 0.7, "confidence {} below threshold", answer.confidence);
        assert!(!answer.escalated);
        assert!(!answer.cache_hit);

        let ranks: Vec<u32> = database
            .get_retrieval_results(job.query_id)
            .unwrap()
            .iter()
            .map(|(_, _, rank)| *rank)
            .collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_over_length_question_fails_without_downstream_calls() {
        let config = RagflowConfig::default();
        let database = Arc::new(Database::in_memory().unwrap());
        let embedder = Arc::new(MockEmbedder::new(8));
        let vector_search = Arc::new(MockVectorSearch::empty());
        let llm = Arc::new(MockLlm::new("unused"));
        let pipeline = build(&config, &database, &embedder, &vector_search, &llm);

        let long_question = "por que ".repeat(300);
        let job = QueryJob::new(Uuid::new_v4(), long_question, "reviews");
        let outcome = pipeline.process(&job).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::Failed);
        let query = database.get_query(job.query_id).unwrap().unwrap();
        assert_eq!(query.status, QueryStatus::Failed);
        assert!(query.failure_reason.unwrap().contains("rejected"));

        // Rejection is terminal before any external service is touched
        assert_eq!(embedder.call_count(), 0);
        assert_eq!(vector_search.call_count(), 0);
        assert_eq!(llm.call_count(), 0);
        assert!(database.get_answer_for_query(job.query_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_retrieval_escalates_with_low_confidence() {
        let config = RagflowConfig::default();
        let database = Arc::new(Database::in_memory().unwrap());
        let embedder = Arc::new(MockEmbedder::new(8));
        let vector_search = Arc::new(MockVectorSearch::empty());
        let llm = Arc::new(MockLlm::new(
            "I could not find this information in the available documents.",
        ));
        let pipeline = build(&config, &database, &embedder, &vector_search, &llm);

        let job = QueryJob::new(Uuid::new_v4(), "O que dizem sobre o produto descontinuado?", "reviews");
        let outcome = pipeline.process(&job).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::Escalated);
        let query = database.get_query(job.query_id).unwrap().unwrap();
        assert_eq!(query.status, QueryStatus::Escalated);

        // The fallback answer exists but can never appear confident
        let answer = database.get_answer_for_query(job.query_id).unwrap().unwrap();
        assert!(answer.confidence < 0.7);
        assert!(answer.escalated);

        let escalation = database.get_escalation_for_query(job.query_id).unwrap().unwrap();
        assert_eq!(escalation.reason, EscalationReason::LowConfidence);
        assert_eq!(escalation.answer_id, Some(answer.id));
    }

    #[tokio::test]
    async fn test_empty_retrieval_with_generation_disabled() {
        let mut config = RagflowConfig::default();
        config.llm.answer_on_empty_retrieval = false;
        let database = Arc::new(Database::in_memory().unwrap());
        let embedder = Arc::new(MockEmbedder::new(8));
        let vector_search = Arc::new(MockVectorSearch::empty());
        let llm = Arc::new(MockLlm::new("unused"));
        let pipeline = build(&config, &database, &embedder, &vector_search, &llm);

        let job = QueryJob::new(Uuid::new_v4(), "Qual a política de trocas?", "reviews");
        let outcome = pipeline.process(&job).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::Escalated);
        assert_eq!(llm.call_count(), 0);
        assert!(database.get_answer_for_query(job.query_id).unwrap().is_none());

        let escalation = database.get_escalation_for_query(job.query_id).unwrap().unwrap();
        assert_eq!(escalation.answer_id, None);
        assert_eq!(escalation.confidence, Some(0.0));
    }

    #[tokio::test]
    async fn test_pii_redacted_before_downstream_with_audit_trail() {
        let config = RagflowConfig::default();
        let database = Arc::new(Database::in_memory().unwrap());
        let hits = seed_chunks(&database, 5, REVIEW_CHUNK);
        let embedder = Arc::new(MockEmbedder::new(8));
        let vector_search = Arc::new(MockVectorSearch::new(hits));
        let llm = Arc::new(MockLlm::new(REVIEW_ANSWER));
        let pipeline = build(&config, &database, &embedder, &vector_search, &llm);

        let job = QueryJob::new(
            Uuid::new_v4(),
            "Por que maria.silva@example.com reclamou das avaliações negativas sobre entrega?",
            "reviews",
        );
        let outcome = pipeline.process(&job).await.unwrap();
        assert_ne!(outcome, PipelineOutcome::Failed);

        let query = database.get_query(job.query_id).unwrap().unwrap();
        let sanitized = query.sanitized_text.unwrap();
        assert!(!sanitized.contains("maria.silva@example.com"));
        assert!(sanitized.contains("[EMAIL]"));

        let events = database.audit_event_types_for_entity(&job.query_id.to_string()).unwrap();
        assert!(events.iter().any(|e| e == "pii_redacted"));

        if let Some(answer) = database.get_answer_for_query(job.query_id).unwrap() {
            assert_eq!(answer.validation_status, AnswerValidation::Warnings);
        }
    }

    #[tokio::test]
    async fn test_unsafe_answer_forces_escalation() {
        let config = RagflowConfig::default();
        let database = Arc::new(Database::in_memory().unwrap());
        let hits = seed_chunks(&database, 5, REVIEW_CHUNK);
        let embedder = Arc::new(MockEmbedder::new(8));
        let vector_search = Arc::new(MockVectorSearch::new(hits));
        let llm = Arc::new(MockLlm::new("As an AI language model, my system prompt forbids that."));
        let pipeline = build(&config, &database, &embedder, &vector_search, &llm);

        let job = QueryJob::new(Uuid::new_v4(), "Quem é você e como funciona?", "reviews");
        let outcome = pipeline.process(&job).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::Escalated);
        let answer = database.get_answer_for_query(job.query_id).unwrap().unwrap();
        assert_eq!(answer.validation_status, AnswerValidation::Failed);
        assert_eq!(answer.answer_text, crate::generation::safety::refusal_text());

        let escalation = database.get_escalation_for_query(job.query_id).unwrap().unwrap();
        assert_eq!(escalation.reason, EscalationReason::ValidationFailure);
    }

    #[tokio::test]
    async fn test_transient_embedding_exhaustion_fails_query() {
        let config = RagflowConfig::default();
        let database = Arc::new(Database::in_memory().unwrap());
        let embedder = Arc::new(MockEmbedder::failing(8));
        let vector_search = Arc::new(MockVectorSearch::empty());
        let llm = Arc::new(MockLlm::new("unused"));
        let pipeline = build(&config, &database, &embedder, &vector_search, &llm);

        let job = QueryJob::new(Uuid::new_v4(), "Quais as reclamações mais comuns?", "reviews");
        let outcome = pipeline.process(&job).await.unwrap();

        assert_eq!(outcome, PipelineOutcome::Failed);
        let query = database.get_query(job.query_id).unwrap().unwrap();
        assert_eq!(query.status, QueryStatus::Failed);
        assert!(query.failure_reason.unwrap().contains("transient"));
        assert_eq!(vector_search.call_count(), 0);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_question_served_from_cache() {
        let mut config = RagflowConfig::default();
        config.cache.enabled = true;
        let database = Arc::new(Database::in_memory().unwrap());
        let hits = seed_chunks(&database, 5, REVIEW_CHUNK);
        let embedder = Arc::new(MockEmbedder::new(8));
        let vector_search = Arc::new(MockVectorSearch::new(hits));
        let llm = Arc::new(MockLlm::new(REVIEW_ANSWER));
        let pipeline = build(&config, &database, &embedder, &vector_search, &llm);

        let question = "Quais são os principais motivos de avaliações negativas?";
        let first = QueryJob::new(Uuid::new_v4(), question, "reviews");
        assert_eq!(pipeline.process(&first).await.unwrap(), PipelineOutcome::Completed);

        let second = QueryJob::new(Uuid::new_v4(), question, "reviews");
        assert_eq!(pipeline.process(&second).await.unwrap(), PipelineOutcome::Completed);

        // The second run never touched the external services
        assert_eq!(embedder.call_count(), 1);
        assert_eq!(llm.call_count(), 1);

        let cached = database.get_answer_for_query(second.query_id).unwrap().unwrap();
        assert!(cached.cache_hit);

        let events = database.audit_event_types_for_entity(&second.query_id.to_string()).unwrap();
        assert!(events.iter().any(|e| e == "cache_hit"));
    }
}
