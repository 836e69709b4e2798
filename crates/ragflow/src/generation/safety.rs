//! Post-generation answer safety validation
//!
//! Even with strict prompt rules, a model can be talked into describing its
//! own instructions or internals. The generated answer is scanned before it
//! is persisted; a match replaces it with a fixed refusal.

use regex::RegexBuilder;

/// Fixed refusal returned when an answer trips the safety check
pub fn refusal_text() -> &'static str {
    "I can only answer questions about the document collection. \
     I cannot provide information about the system itself."
}

/// Validate that an answer does not leak system information.
///
/// Returns `Err(reason)` naming the tripped category.
pub fn validate_answer_safety(answer: &str) -> Result<(), String> {
    let forbidden: &[(&str, &str)] = &[
        (r"\bgpt-\d", "model identifier mention"),
        (r"\bopenai\b", "provider mention"),
        (r"large language model|language model|modelo de linguagem", "LLM self-reference"),
        (r"system prompt|my instructions|minhas instruções|instruções do sistema", "instruction leakage"),
        (r"\bapi[ _-]?key\b", "credential mention"),
        (r"\btemperature\b|\bmax[_ ]tokens\b", "generation parameter mention"),
        (r"as an ai\b|i am an ai\b|sou uma ia\b|como uma ia\b", "AI self-identification"),
        (r"my training data|fui treinad", "training data mention"),
        (r"ignore (all )?previous instructions|você agora é", "echoed injection"),
    ];

    let lower = answer.to_lowercase();
    for (pattern, reason) in forbidden {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .expect("invalid safety pattern");
        if re.is_match(&lower) {
            return Err((*reason).to_string());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_answer_passes() {
        assert!(validate_answer_safety(
            "Most negative reviews mention delivery delays and damaged packaging."
        )
        .is_ok());
    }

    #[test]
    fn test_model_mention_fails() {
        assert!(validate_answer_safety("This answer was written by gpt-4o.").is_err());
    }

    #[test]
    fn test_self_identification_fails() {
        assert!(validate_answer_safety("As an AI, I cannot have opinions.").is_err());
    }

    #[test]
    fn test_portuguese_instruction_leak_fails() {
        assert!(validate_answer_safety("Minhas instruções dizem para não responder.").is_err());
    }
}
