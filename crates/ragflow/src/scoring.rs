//! Confidence scoring and the escalation decision

use crate::config::ScoringConfig;
use crate::generation::GenerationOutcome;
use crate::types::{AnswerValidation, RetrievalResult};

/// Margin below the escalation threshold applied when retrieval returned no
/// evidence; an answer built on nothing must never appear confident
const ZERO_EVIDENCE_MARGIN: f32 = 0.05;

/// Cap factor applied when the answer itself expresses uncertainty
const UNCERTAINTY_CAP: f32 = 0.3;

/// Phrases indicating the model declined to answer from the context
const UNCERTAINTY_PHRASES: &[&str] = &[
    "não tenho informações",
    "não há informações",
    "contexto não contém",
    "não posso responder",
    "could not find this information",
    "not available in the provided documents",
    "no information available",
];

/// Combines retrieval and generation signals into a single confidence value
///
/// Scoring is a pure function of its inputs: identical inputs always produce
/// identical confidence.
pub struct ConfidenceScorer {
    config: ScoringConfig,
}

impl ConfidenceScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self { config: config.clone() }
    }

    /// The configured escalation threshold
    pub fn escalation_threshold(&self) -> f32 {
        self.config.escalation_threshold
    }

    /// Compute confidence in [0, 1] for a generation outcome.
    ///
    /// The primary signal is the mean similarity of the top-N retrieval
    /// results, combined with a heuristic coverage term estimating what
    /// fraction of the answer's sentences are attributable to the retrieved
    /// passages. Zero retrieval results force the score strictly below the
    /// escalation threshold regardless of the other signals. A missing
    /// generation outcome scores 0.
    pub fn score(&self, results: &[RetrievalResult], generation: Option<&GenerationOutcome>) -> f32 {
        let generation = match generation {
            Some(g) => g,
            None => return 0.0,
        };

        let mean_similarity = self.mean_top_n_similarity(results);
        let coverage = claim_coverage(&generation.answer_text, results);

        let answer_lower = generation.answer_text.to_lowercase();
        let uncertain = UNCERTAINTY_PHRASES.iter().any(|p| answer_lower.contains(p));

        let raw = if uncertain {
            mean_similarity * UNCERTAINTY_CAP
        } else {
            mean_similarity * self.config.similarity_weight + coverage * self.config.coverage_weight
        };

        let raw = raw.clamp(0.0, 1.0);

        if results.is_empty() {
            let ceiling = (self.config.escalation_threshold - ZERO_EVIDENCE_MARGIN).max(0.0);
            return raw.min(ceiling);
        }

        raw
    }

    /// Escalate when confidence falls below the threshold or the answer
    /// failed its safety validation
    pub fn should_escalate(&self, confidence: f32, validation: AnswerValidation) -> bool {
        confidence < self.config.escalation_threshold || validation == AnswerValidation::Failed
    }

    fn mean_top_n_similarity(&self, results: &[RetrievalResult]) -> f32 {
        if results.is_empty() {
            return 0.0;
        }
        let n = self.config.top_n.min(results.len());
        let sum: f32 = results.iter().take(n).map(|r| r.similarity).sum();
        sum / n as f32
    }
}

/// Fraction of answer sentences whose content words are mostly present in
/// the retrieved passages. Heuristic, not exact attribution.
fn claim_coverage(answer: &str, results: &[RetrievalResult]) -> f32 {
    if results.is_empty() {
        return 0.0;
    }

    let context_words: std::collections::HashSet<String> = results
        .iter()
        .flat_map(|r| content_words(&r.content))
        .collect();

    let sentences: Vec<&str> = answer
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return 0.0;
    }

    let attributed = sentences
        .iter()
        .filter(|sentence| {
            let words = content_words(sentence);
            if words.is_empty() {
                return true;
            }
            let matched = words.iter().filter(|w| context_words.contains(*w)).count();
            matched * 2 >= words.len()
        })
        .count();

    attributed as f32 / sentences.len() as f32
}

/// Lowercased words of four or more characters; short function words carry
/// no attribution signal
fn content_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 4)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::TokenUsage;
    use uuid::Uuid;

    fn result(similarity: f32, content: &str) -> RetrievalResult {
        RetrievalResult {
            query_id: Uuid::nil(),
            chunk_id: Uuid::new_v4(),
            similarity,
            rank: 1,
            rerank_score: None,
            content: content.to_string(),
        }
    }

    fn outcome(answer: &str) -> GenerationOutcome {
        GenerationOutcome {
            answer_text: answer.to_string(),
            model_id: "test".to_string(),
            usage: TokenUsage::default(),
            latency_ms: 10,
            safety_tripped: false,
            passages_used: 1,
        }
    }

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::new(&ScoringConfig::default())
    }

    #[test]
    fn test_high_similarity_grounded_answer_clears_threshold() {
        let results: Vec<_> = (0..5)
            .map(|_| result(0.85, "customers complain about delivery delays and damaged packaging"))
            .collect();
        let generation = outcome("Customers complain about delivery delays and damaged packaging");

        let confidence = scorer().score(&results, Some(&generation));
        assert!(confidence >= 0.7, "confidence {confidence} below threshold");
    }

    #[test]
    fn test_zero_results_forced_below_threshold() {
        let generation = outcome("Here is a perfectly fluent answer about delivery problems");
        let confidence = scorer().score(&[], Some(&generation));
        assert!(confidence < scorer().escalation_threshold());
    }

    #[test]
    fn test_missing_generation_scores_zero() {
        let results = vec![result(0.9, "text")];
        assert_eq!(scorer().score(&results, None), 0.0);
    }

    #[test]
    fn test_uncertainty_phrase_caps_confidence() {
        let results: Vec<_> = (0..5).map(|_| result(0.9, "delivery delays everywhere")).collect();
        let confident = scorer().score(&results, Some(&outcome("Delivery delays everywhere")));
        let uncertain = scorer().score(
            &results,
            Some(&outcome("I could not find this information in the available documents.")),
        );
        assert!(uncertain < confident);
        assert!(uncertain < scorer().escalation_threshold());
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let results: Vec<_> = (0..3).map(|i| result(0.8 - i as f32 * 0.1, "shipment arrived broken")).collect();
        let generation = outcome("The shipment arrived broken");

        let first = scorer().score(&results, Some(&generation));
        let second = scorer().score(&results, Some(&generation));
        assert_eq!(first, second);
    }

    #[test]
    fn test_ungrounded_answer_scores_lower() {
        let results: Vec<_> = (0..5).map(|_| result(0.8, "reviews mention slow shipping")).collect();
        let grounded = scorer().score(&results, Some(&outcome("Reviews mention slow shipping")));
        let fabricated = scorer().score(
            &results,
            Some(&outcome("Quantum flux capacitors misbehave during thunderstorms")),
        );
        assert!(fabricated < grounded);
    }

    #[test]
    fn test_escalation_decision() {
        let s = scorer();
        assert!(s.should_escalate(0.69, AnswerValidation::Passed));
        assert!(!s.should_escalate(0.71, AnswerValidation::Passed));
        assert!(s.should_escalate(0.95, AnswerValidation::Failed));
    }
}
