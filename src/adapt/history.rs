use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// How a stale element was re-located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AdaptationStrategy {
    AiReacquisition,
    StructuralSimilarity,
    FuzzyText,
    /// Every strategy failed.
    None,
}

impl AdaptationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdaptationStrategy::AiReacquisition => "ai-reacquisition",
            AdaptationStrategy::StructuralSimilarity => "structural-similarity",
            AdaptationStrategy::FuzzyText => "fuzzy-text",
            AdaptationStrategy::None => "none",
        }
    }
}

impl fmt::Display for AdaptationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const ALL_STRATEGIES_FAILED: &str = "All strategies failed";

/// One adaptation attempt. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationAttempt {
    pub timestamp: u64,
    pub original_selector: String,
    pub new_selector: Option<String>,
    pub strategy: AdaptationStrategy,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AdaptationAttempt {
    pub fn succeeded(
        timestamp: u64,
        original_selector: &str,
        new_selector: &str,
        strategy: AdaptationStrategy,
    ) -> Self {
        Self {
            timestamp,
            original_selector: original_selector.to_string(),
            new_selector: Some(new_selector.to_string()),
            strategy,
            success: true,
            error: None,
        }
    }

    pub fn failed(timestamp: u64, original_selector: &str) -> Self {
        Self {
            timestamp,
            original_selector: original_selector.to_string(),
            new_selector: None,
            strategy: AdaptationStrategy::None,
            success: false,
            error: Some(ALL_STRATEGIES_FAILED.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationStats {
    pub total_attempts: usize,
    pub successful_adaptations: usize,
    pub failed_adaptations: usize,
    /// Successful adaptations per strategy.
    pub strategies_used: BTreeMap<String, usize>,
}

/// Append-only attempt log keyed by `(original selector, page url)`, with a
/// hard cap on records per key.
#[derive(Debug, Clone)]
pub struct AdaptationHistory {
    attempts: HashMap<(String, String), Vec<AdaptationAttempt>>,
    max_attempts: usize,
}

impl AdaptationHistory {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            attempts: HashMap::new(),
            max_attempts,
        }
    }

    fn key(selector: &str, page_url: &str) -> (String, String) {
        (selector.to_string(), page_url.to_string())
    }

    pub fn attempts_for(&self, selector: &str, page_url: &str) -> &[AdaptationAttempt] {
        self.attempts
            .get(&Self::key(selector, page_url))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_exhausted(&self, selector: &str, page_url: &str) -> bool {
        self.attempts_for(selector, page_url).len() >= self.max_attempts
    }

    /// Append `attempt`. Returns `false` (and records nothing) once the
    /// budget for this pair is spent.
    pub fn record(&mut self, page_url: &str, attempt: AdaptationAttempt) -> bool {
        let entry = self
            .attempts
            .entry(Self::key(&attempt.original_selector, page_url))
            .or_default();
        if entry.len() >= self.max_attempts {
            return false;
        }
        entry.push(attempt);
        true
    }

    pub fn stats(&self) -> AdaptationStats {
        let mut stats = AdaptationStats::default();
        for attempt in self.attempts.values().flatten() {
            stats.total_attempts += 1;
            if attempt.success {
                stats.successful_adaptations += 1;
                *stats
                    .strategies_used
                    .entry(attempt.strategy.to_string())
                    .or_default() += 1;
            } else {
                stats.failed_adaptations += 1;
            }
        }
        stats
    }

    pub fn clear(&mut self) {
        self.attempts.clear();
    }
}
