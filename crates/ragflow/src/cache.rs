//! Exact-match answer cache
//!
//! Keyed on the collection and the normalized question so repeated questions
//! skip the whole pipeline. Disabled by default; entries expire after a TTL
//! and the oldest entry is evicted once the capacity is reached.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::types::AnswerValidation;

/// A cached answer
#[derive(Debug, Clone)]
pub struct CachedAnswer {
    pub answer_text: String,
    pub confidence: f32,
    pub model_id: String,
    pub validation_status: AnswerValidation,
    pub hit_count: u64,
}

struct Entry {
    answer: CachedAnswer,
    inserted_at: Instant,
}

/// In-process answer cache
pub struct AnswerCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    max_entries: usize,
    enabled: bool,
}

impl AnswerCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries.max(1),
            enabled: config.enabled,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a fresh cached answer, bumping its hit count
    pub fn get(&self, collection: &str, question: &str) -> Option<CachedAnswer> {
        if !self.enabled {
            return None;
        }
        let key = cache_key(collection, question);
        let mut entries = self.entries.write();

        match entries.get_mut(&key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => {
                entry.answer.hit_count += 1;
                Some(entry.answer.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Cache an answer for the normalized question
    pub fn put(&self, collection: &str, question: &str, answer: CachedAnswer) {
        if !self.enabled {
            return;
        }
        let key = cache_key(collection, question);
        let mut entries = self.entries.write();

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            // Evict the oldest entry to stay within capacity
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(key, Entry { answer, inserted_at: Instant::now() });
    }
}

fn cache_key(collection: &str, question: &str) -> String {
    let normalized = question
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    format!("{collection}::{normalized}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> CacheConfig {
        CacheConfig { enabled: true, ttl_secs: 3600, max_entries: 2 }
    }

    fn answer(text: &str) -> CachedAnswer {
        CachedAnswer {
            answer_text: text.to_string(),
            confidence: 0.9,
            model_id: "test".to_string(),
            validation_status: AnswerValidation::Passed,
            hit_count: 0,
        }
    }

    #[test]
    fn test_hit_on_normalized_question() {
        let cache = AnswerCache::new(&enabled_config());
        cache.put("reviews", "What about   delays?", answer("delays answer"));

        let hit = cache.get("reviews", "what ABOUT delays?").unwrap();
        assert_eq!(hit.answer_text, "delays answer");
        assert_eq!(hit.hit_count, 1);
    }

    #[test]
    fn test_miss_on_other_collection() {
        let cache = AnswerCache::new(&enabled_config());
        cache.put("reviews", "question?", answer("a"));
        assert!(cache.get("orders", "question?").is_none());
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let cache = AnswerCache::new(&CacheConfig::default());
        cache.put("reviews", "question?", answer("a"));
        assert!(cache.get("reviews", "question?").is_none());
    }

    #[test]
    fn test_capacity_eviction() {
        let cache = AnswerCache::new(&enabled_config());
        cache.put("c", "one", answer("1"));
        cache.put("c", "two", answer("2"));
        cache.put("c", "three", answer("3"));

        let present = ["one", "two", "three"]
            .iter()
            .filter(|q| cache.get("c", q).is_some())
            .count();
        assert_eq!(present, 2);
    }
}
