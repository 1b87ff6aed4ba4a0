use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::browser::page::Page;
use crate::detector::queries::classification_instruction;
use crate::element::element_model::{ElementType, Observation};
use crate::element::taxonomy::infer_type_from_description;

#[derive(Debug, Error)]
pub enum ObserverError {
    /// No AI session could be established for the page
    #[error("Observer unavailable: {0}")]
    Unavailable(String),

    #[error("Observer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Observer timed out: {0}")]
    Timeout(String),

    #[error("Observer returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The model answered, but not with anything we can use
    #[error("Malformed observer payload: {0}")]
    Malformed(String),

    #[error("Observer rejected instruction: {0}")]
    Rejected(String),
}

impl ObserverError {
    /// Split transport failures into timeouts and everything else.
    pub fn from_request(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ObserverError::Timeout(error.to_string())
        } else {
            ObserverError::Request(error)
        }
    }
}

/// Result of asking the observer what kind of element a selector points at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub element_type: ElementType,
    pub confidence: f64,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            element_type: ElementType::Unknown,
            confidence: 0.0,
        }
    }
}

/// Natural-language element observation capability.
///
/// One observer serves one page session: `attach` binds it, `close` releases
/// it. Implementations may fail any call; callers treat failures as empty
/// contributions.
#[async_trait(?Send)]
pub trait ElementObserver {
    async fn attach(&mut self, _page: &dyn Page) -> Result<(), ObserverError> {
        Ok(())
    }

    async fn observe(&self, instruction: &str) -> Result<Vec<Observation>, ObserverError>;

    /// Ask which kind of element `selector` is. The default issues one
    /// targeted observation and reads the type from its description.
    async fn classify(&self, selector: &str, context: &str) -> Result<Classification, ObserverError> {
        let instruction = classification_instruction(selector, context);
        let observations = self.observe(&instruction).await?;

        let Some(top) = observations.first() else {
            return Ok(Classification::unknown());
        };

        let element_type = infer_type_from_description(&top.description);
        if element_type.is_unknown() {
            return Ok(Classification::unknown());
        }

        let confidence = if top.selector == selector { 0.9 } else { 0.5 };
        Ok(Classification {
            element_type,
            confidence,
        })
    }

    async fn close(&mut self) {}
}

// ============================================================================
// Payload validation
// ============================================================================

/// Validate a loosely-typed observer payload into strict observations.
///
/// Accepts a bare array or an object wrapping one under `elements` /
/// `observations`. Entries without a non-empty string `selector` and a
/// string `description` are dropped individually.
pub fn validate_observations(raw: &Value) -> Result<Vec<Observation>, ObserverError> {
    let items = match raw {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("elements").or_else(|| map.get("observations")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ObserverError::Malformed(
                    "expected an array of {selector, description}".into(),
                ));
            }
        },
        other => {
            return Err(ObserverError::Malformed(format!(
                "expected an array, got {}",
                type_name(other)
            )));
        }
    };

    let observations = items
        .iter()
        .filter_map(|item| {
            let selector = item.get("selector").and_then(Value::as_str).map(str::trim);
            let description = item.get("description").and_then(Value::as_str);
            match (selector, description) {
                (Some(s), Some(d)) if !s.is_empty() => Some(Observation::new(s, d.trim())),
                _ => {
                    debug!(entry = %item, "rejecting malformed observation");
                    None
                }
            }
        })
        .collect();

    Ok(observations)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn malformed_entries_are_dropped_individually() {
        let raw = json!([
            {"selector": "#ok", "description": "Submit button"},
            {"selector": "", "description": "empty selector"},
            {"selector": 42, "description": "numeric selector"},
            {"description": "no selector"},
            {"selector": "#nodesc"},
            {"selector": "  #trimmed ", "description": " Link "}
        ]);
        let obs = validate_observations(&raw).unwrap();
        assert_eq!(
            obs,
            vec![
                Observation::new("#ok", "Submit button"),
                Observation::new("#trimmed", "Link"),
            ]
        );
    }

    #[test]
    fn wrapped_arrays_are_accepted() {
        let raw = json!({"elements": [{"selector": "a", "description": "link"}]});
        assert_eq!(validate_observations(&raw).unwrap().len(), 1);
    }

    #[test]
    fn non_array_payloads_are_malformed() {
        assert!(matches!(
            validate_observations(&json!("nope")),
            Err(ObserverError::Malformed(_))
        ));
        assert!(matches!(
            validate_observations(&json!({"items": []})),
            Err(ObserverError::Malformed(_))
        ));
    }
}
