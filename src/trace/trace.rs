use serde::Serialize;

use crate::adapt::cache::now_ms;
use crate::adapt::history::{AdaptationAttempt, AdaptationStrategy};

/// One JSONL record per adaptation attempt.
#[derive(Debug, Serialize)]
pub struct TraceEvent {
    pub timestamp_ms: u64,
    pub page_url: String,

    pub original_selector: String,
    pub new_selector: Option<String>,

    pub strategy: AdaptationStrategy,
    pub success: bool,

    pub score: Option<f64>,
    pub error: Option<String>,
}

impl TraceEvent {
    pub fn now(page_url: &str, original_selector: &str) -> Self {
        Self {
            timestamp_ms: now_ms(),
            page_url: page_url.to_string(),
            original_selector: original_selector.to_string(),
            new_selector: None,
            strategy: AdaptationStrategy::None,
            success: false,
            score: None,
            error: None,
        }
    }

    pub fn from_attempt(page_url: &str, attempt: &AdaptationAttempt) -> Self {
        Self {
            timestamp_ms: attempt.timestamp,
            new_selector: attempt.new_selector.clone(),
            strategy: attempt.strategy,
            success: attempt.success,
            error: attempt.error.clone(),
            ..Self::now(page_url, &attempt.original_selector)
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}
