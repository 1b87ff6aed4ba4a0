use serde::{Deserialize, Serialize};

use crate::detector::error::DetectionError;

/// Tuning knobs for a detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Below this many AI-path elements the fallback paths run.
    pub min_ai_results: usize,
    /// An `unknown` element is retyped only when the observer is more
    /// confident than this.
    pub classification_confidence: f64,
    /// Observations kept per query.
    pub max_observations_per_query: usize,
    /// Keep AI-path and sweep elements that are not visible.
    pub include_hidden: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_ai_results: 3,
            classification_confidence: 0.7,
            max_observations_per_query: 50,
            include_hidden: false,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !(0.0..=1.0).contains(&self.classification_confidence) {
            return Err(DetectionError::Config(format!(
                "classification_confidence must be within [0, 1], got {}",
                self.classification_confidence
            )));
        }
        if self.max_observations_per_query == 0 {
            return Err(DetectionError::Config(
                "max_observations_per_query must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
