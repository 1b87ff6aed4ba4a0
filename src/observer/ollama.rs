use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::browser::page::{DomNode, Page};
use crate::detector::heuristics::{INTERACTIVE_THRESHOLD, interactivity_score, synthesize_selector};
use crate::detector::queries::classification_instruction;
use crate::element::element_model::Observation;
use crate::element::taxonomy::parse_type_name;
use crate::observer::observer::{
    Classification, ElementObserver, ObserverError, validate_observations,
};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_MODEL: &str = "qwen2.5:1.5b";

/// Cap on digest lines sent per prompt.
const MAX_DIGEST_LINES: usize = 200;

/// Observer backed by an Ollama `/api/generate` endpoint.
///
/// `attach` captures a digest of the page's candidate elements; every
/// `observe` call asks the model to pick from that digest.
pub struct OllamaObserver {
    pub endpoint: String,
    pub model: String,
    client: reqwest::Client,
    digest: Option<String>,
    page_url: String,
}

impl Default for OllamaObserver {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_MODEL)
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct ClassificationResponse {
    #[serde(rename = "type")]
    element_type: String,
    #[serde(default)]
    confidence: Option<f64>,
}

impl OllamaObserver {
    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
            digest: None,
            page_url: String::new(),
        }
    }

    /// Bound every request to `timeout`. Expired requests fail with
    /// `ObserverError::Timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ObserverError> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ObserverError::Request)?;
        Ok(self)
    }

    /// One line per candidate: `selector | <tag role> "text" [attrs]`.
    fn build_digest(nodes: &[DomNode]) -> String {
        nodes
            .iter()
            .filter(|n| n.visible && interactivity_score(n) >= INTERACTIVE_THRESHOLD)
            .take(MAX_DIGEST_LINES)
            .map(|n| {
                let selector = synthesize_selector(nodes, n.index);
                let mut line = format!("{} | <{}", selector, n.tag);
                if let Some(role) = n.role() {
                    line.push_str(&format!(" role={}", role));
                }
                line.push('>');
                if let Some(text) = &n.text {
                    let short: String = text.chars().take(60).collect();
                    line.push_str(&format!(" \"{}\"", short));
                }
                for key in ["type", "name", "placeholder", "aria-label"] {
                    if let Some(v) = n.attr(key) {
                        line.push_str(&format!(" {}=\"{}\"", key, v));
                    }
                }
                if !n.context.is_empty() {
                    line.push_str(&format!(" in {}", n.context.join(" > ")));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn build_observe_prompt(&self, instruction: &str) -> String {
        format!(
            r#"You locate elements on a web page for a test recorder.

PAGE: {url}
CANDIDATE ELEMENTS (selector | summary):
{digest}

INSTRUCTION: {instruction}

Return ONLY a JSON array. Each item: {{"selector": "<selector copied from the list>", "description": "<short description naming the element kind, e.g. 'Submit button', 'Email text field'>"}}.
Return [] if nothing matches."#,
            url = self.page_url,
            digest = self.digest.as_deref().unwrap_or("(no candidates captured)"),
            instruction = instruction,
        )
    }

    async fn generate(&self, prompt: String) -> Result<String, ObserverError> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(ObserverError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ObserverError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaResponse = response.json().await.map_err(ObserverError::from_request)?;
        Ok(parsed.response)
    }
}

#[async_trait(?Send)]
impl ElementObserver for OllamaObserver {
    async fn attach(&mut self, page: &dyn Page) -> Result<(), ObserverError> {
        let nodes = page
            .dom_snapshot()
            .await
            .map_err(|e| ObserverError::Unavailable(e.to_string()))?;
        self.page_url = page.url();
        self.digest = Some(Self::build_digest(&nodes));
        debug!(model = %self.model, url = %self.page_url, "ollama observer attached");
        Ok(())
    }

    async fn observe(&self, instruction: &str) -> Result<Vec<Observation>, ObserverError> {
        let text = self.generate(self.build_observe_prompt(instruction)).await?;
        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| ObserverError::Malformed(format!("{} (response: {})", e, text)))?;
        validate_observations(&raw)
    }

    async fn classify(&self, selector: &str, context: &str) -> Result<Classification, ObserverError> {
        let prompt = format!(
            r#"{instruction}

CANDIDATE ELEMENTS:
{digest}

Return ONLY JSON: {{"type": "<one of button, link, text_input, password_input, email_input, number_input, search_input, checkbox, radio, select, dropdown, toggle, tab, menu_item, textarea, slider, unknown>", "confidence": <0.0-1.0>}}"#,
            instruction = classification_instruction(selector, context),
            digest = self.digest.as_deref().unwrap_or("(none)"),
        );

        let text = self.generate(prompt).await?;
        let parsed: ClassificationResponse = serde_json::from_str(&text)
            .map_err(|e| ObserverError::Malformed(format!("{} (response: {})", e, text)))?;

        Ok(Classification {
            element_type: parse_type_name(&parsed.element_type),
            confidence: parsed.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        })
    }

    async fn close(&mut self) {
        self.digest = None;
    }
}
