use std::collections::HashSet;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::browser::error::PageError;
use crate::browser::page::{DomNode, ElementHandle, Page};
use crate::detector::config::DetectionConfig;
use crate::detector::error::DetectionError;
use crate::detector::heuristics::{sweep, synthesize_selector, xpath};
use crate::detector::queries::{DETECTION_QUERIES, FALLBACK_QUERY};
use crate::element::element_model::{
    DetectionErrorEntry, DetectionResult, ElementMetadata, ElementType, InteractiveElement,
    Observation, join_context,
};
use crate::element::taxonomy::{element_id, infer_type_from_description, normalize_text};
use crate::observer::observer::ElementObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AiState {
    Uninitialized,
    Ready,
    /// No observer, or it failed to attach. Permanent for this detector.
    Unavailable,
}

/// An AI-path element plus the non-fatal problem hit while reading it, if any.
pub type Resolved = (InteractiveElement, Option<DetectionErrorEntry>);

/// Finds interactive elements through the observer, falling back to the
/// deterministic DOM sweep when the AI path comes up short.
pub struct PrimaryDetector {
    observer: Option<Box<dyn ElementObserver>>,
    state: AiState,
    config: DetectionConfig,
}

impl PrimaryDetector {
    /// Deterministic-only detector.
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            observer: None,
            state: AiState::Unavailable,
            config,
        }
    }

    pub fn with_observer(observer: Box<dyn ElementObserver>, config: DetectionConfig) -> Self {
        Self {
            observer: Some(observer),
            state: AiState::Uninitialized,
            config,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn ai_available(&self) -> bool {
        self.state == AiState::Ready
    }

    /// The observer, only while it is attached.
    pub fn observer(&self) -> Option<&dyn ElementObserver> {
        if self.ai_available() {
            self.observer.as_deref()
        } else {
            None
        }
    }

    /// Bind the observer to `page`. Failure is logged and leaves the detector
    /// in deterministic-only mode.
    pub async fn initialize(&mut self, page: &dyn Page) {
        if self.state != AiState::Uninitialized {
            return;
        }

        let Some(observer) = self.observer.as_mut() else {
            self.state = AiState::Unavailable;
            return;
        };

        match observer.attach(page).await {
            Ok(()) => {
                info!(url = %page.url(), "observer attached");
                self.state = AiState::Ready;
            }
            Err(e) => {
                warn!(error = %e, "observer unavailable, using DOM heuristics only");
                self.state = AiState::Unavailable;
            }
        }
    }

    /// Re-attach the observer to `page` so what it sees matches the page being
    /// worked on. Returns whether the observer may be used for this call; a
    /// failed refresh is logged and skips it without retiring it.
    pub async fn rebind(&mut self, page: &dyn Page) -> bool {
        if self.state != AiState::Ready {
            return false;
        }
        let Some(observer) = self.observer.as_mut() else {
            return false;
        };
        match observer.attach(page).await {
            Ok(()) => true,
            Err(e) => {
                warn!(url = %page.url(), error = %e, "observer refresh failed, skipping it for this page");
                false
            }
        }
    }

    /// Release the observer session. Safe to call repeatedly.
    pub async fn cleanup(&mut self) {
        if self.state == AiState::Ready {
            if let Some(observer) = self.observer.as_mut() {
                observer.close().await;
            }
            self.state = AiState::Uninitialized;
            debug!("observer released");
        }
    }

    #[instrument(name = "detect", skip_all, fields(page_url = %page.url()))]
    pub async fn detect_interactive_elements(
        &mut self,
        page: &dyn Page,
    ) -> Result<DetectionResult, DetectionError> {
        let started = Instant::now();
        let ai_ready = match self.state {
            AiState::Uninitialized => {
                self.initialize(page).await;
                self.ai_available()
            }
            AiState::Ready => self.rebind(page).await,
            AiState::Unavailable => false,
        };

        let page_url = page.url();
        let mut errors = Vec::new();
        let mut ai_elements = Vec::new();
        let mut snapshot = None;

        if ai_ready {
            let nodes = settle(page.dom_snapshot().await)?.unwrap_or_default();
            let observations = self.run_queries().await;
            debug!(count = observations.len(), "observations collected");
            self.resolve_all(page, &observations, &nodes, &mut ai_elements, &mut errors)
                .await?;

            if ai_elements.len() < self.config.min_ai_results {
                debug!(found = ai_elements.len(), "few AI results, re-querying");
                let retry = self.observe_capped(FALLBACK_QUERY).await;
                self.resolve_all(page, &retry, &nodes, &mut ai_elements, &mut errors)
                    .await?;
            }
            if !nodes.is_empty() {
                snapshot = Some(nodes);
            }
        }

        let mut fallback = Vec::new();
        if ai_elements.len() < self.config.min_ai_results {
            let nodes = match snapshot {
                Some(nodes) => nodes,
                None => page.dom_snapshot().await?,
            };
            fallback = sweep(&nodes, &page_url, self.config.include_hidden);
            debug!(count = fallback.len(), "DOM sweep complete");
        }

        let mut elements = merge(ai_elements, fallback);

        if ai_ready {
            self.classify_unknowns(&page_url, &mut elements).await;
        }

        let detection_time = started.elapsed().as_millis() as u64;
        info!(
            url = %page_url,
            found = elements.len(),
            errors = errors.len(),
            ms = detection_time,
            "detection complete"
        );

        Ok(DetectionResult {
            total_found: elements.len(),
            elements,
            detection_time,
            errors,
        })
    }

    /// Fan out every detection query at once. Failed queries contribute nothing.
    async fn run_queries(&self) -> Vec<Observation> {
        let batches = join_all(DETECTION_QUERIES.iter().map(|q| self.observe_capped(q))).await;
        batches.into_iter().flatten().collect()
    }

    async fn observe_capped(&self, instruction: &str) -> Vec<Observation> {
        let Some(observer) = self.observer() else {
            return Vec::new();
        };
        match observer.observe(instruction).await {
            Ok(mut observations) => {
                observations.truncate(self.config.max_observations_per_query);
                observations
            }
            Err(e) => {
                warn!(query = instruction, error = %e, "observer query failed");
                Vec::new()
            }
        }
    }

    async fn resolve_all(
        &self,
        page: &dyn Page,
        observations: &[Observation],
        nodes: &[DomNode],
        elements: &mut Vec<InteractiveElement>,
        errors: &mut Vec<DetectionErrorEntry>,
    ) -> Result<(), PageError> {
        for observation in observations {
            if let Some((element, problem)) =
                resolve_observation(page, observation, nodes, self.config.include_hidden).await?
            {
                elements.push(element);
                errors.extend(problem);
            }
        }
        Ok(())
    }

    async fn classify_unknowns(&self, page_url: &str, elements: &mut [InteractiveElement]) {
        let Some(observer) = self.observer() else {
            return;
        };

        for element in elements.iter_mut().filter(|e| e.element_type.is_unknown()) {
            let context = element.metadata.context.clone().unwrap_or_default();
            match observer.classify(&element.selector, &context).await {
                Ok(c) if c.confidence > self.config.classification_confidence
                    && !c.element_type.is_unknown() =>
                {
                    debug!(
                        selector = %element.selector,
                        element_type = %c.element_type,
                        confidence = c.confidence,
                        "reclassified"
                    );
                    element.element_type = c.element_type;
                    element.id = element_id(
                        page_url,
                        element.element_type,
                        &element.selector,
                        element.text.as_deref(),
                    );
                }
                Ok(c) => {
                    debug!(selector = %element.selector, confidence = c.confidence, "classification below threshold");
                }
                Err(e) => {
                    warn!(selector = %element.selector, error = %e, "classification failed");
                }
            }
        }
    }
}

/// Sort a `PageError` into "give up on the whole pass" or "skip this read".
fn settle<T>(result: Result<T, PageError>) -> Result<Option<T>, PageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            debug!(error = %e, "element read failed");
            Ok(None)
        }
    }
}

/// Resolve one observation to a live element.
///
/// The selector must match exactly one node. When `nodes` (a snapshot of the
/// same page) holds a single node that reads the same as the match, the
/// element takes that node's synthesized selector, so two observations of
/// one node end up with the same selector.
///
/// `Ok(None)` means the selector did not resolve to one element (or resolved
/// to something hidden); only page-level failures are returned as errors. An
/// element whose attributes cannot be read is kept with an empty attribute
/// map, and the failure is reported alongside it.
pub async fn resolve_observation(
    page: &dyn Page,
    observation: &Observation,
    nodes: &[DomNode],
    include_hidden: bool,
) -> Result<Option<Resolved>, PageError> {
    let selector = observation.selector.as_str();
    let Some(mut handles) = settle(page.query_all(selector).await)? else {
        return Ok(None);
    };
    if handles.len() != 1 {
        debug!(selector, matches = handles.len(), "observation does not name exactly one element");
        return Ok(None);
    }
    let Some(handle) = handles.pop() else {
        return Ok(None);
    };

    let Some(visible) = settle(handle.is_visible().await)? else {
        return Ok(None);
    };
    if !visible && !include_hidden {
        return Ok(None);
    }

    let page_url = page.url();
    let element_type = infer_type_from_description(&observation.description);
    let (mut element, problem) =
        element_from_handle(&page_url, selector, handle.as_ref(), element_type, visible).await?;

    if problem.is_none() {
        if let Some(index) = snapshot_match(nodes, &element) {
            canonicalize(&mut element, nodes, index, &page_url);
        }
    }
    Ok(Some((element, problem)))
}

/// The snapshot node `element` was read from: the only one with the same
/// attributes, text, context trail and visibility.
fn snapshot_match(nodes: &[DomNode], element: &InteractiveElement) -> Option<usize> {
    let mut matching = nodes.iter().filter(|n| {
        n.visible == element.is_visible
            && n.attributes == element.attributes
            && n.text == element.text
            && join_context(&n.context) == element.metadata.context
    });
    let first = matching.next()?;
    matching.next().is_none().then_some(first.index)
}

fn canonicalize(element: &mut InteractiveElement, nodes: &[DomNode], index: usize, page_url: &str) {
    let selector = synthesize_selector(nodes, index);
    if selector.is_empty() {
        return;
    }
    if selector != element.selector {
        debug!(from = %element.selector, to = %selector, "observation selector canonicalized");
    }
    element.selector = selector;
    element.xpath = Some(xpath(nodes, index));
    element.id = element_id(
        page_url,
        element.element_type,
        &element.selector,
        element.text.as_deref(),
    );
}

pub async fn element_from_handle(
    page_url: &str,
    selector: &str,
    handle: &dyn ElementHandle,
    element_type: ElementType,
    is_visible: bool,
) -> Result<Resolved, PageError> {
    let is_enabled = settle(handle.is_enabled().await)?.unwrap_or(true);
    let bounding_box = settle(handle.bounding_box().await)?.flatten();
    let text = settle(handle.text_content().await)?
        .flatten()
        .and_then(|t| normalize_text(&t));

    let (info, problem) = match handle.describe().await {
        Ok(info) => (info, None),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(selector, error = %e, "attribute read failed, keeping element");
            let entry = DetectionErrorEntry {
                selector: selector.to_string(),
                error: e.to_string(),
            };
            (Default::default(), Some(entry))
        }
    };

    let attr = |name: &str| info.attributes.get(name).cloned();
    let metadata = ElementMetadata {
        label: attr("aria-label"),
        placeholder: attr("placeholder"),
        required: info.attributes.contains_key("required"),
        context: join_context(&info.context),
        ai_detected: true,
        ..ElementMetadata::default()
    };

    let element = InteractiveElement {
        id: element_id(page_url, element_type, selector, text.as_deref()),
        element_type,
        selector: selector.to_string(),
        xpath: None,
        text,
        attributes: info.attributes,
        is_visible,
        is_enabled,
        bounding_box,
        parent_selector: None,
        children: Vec::new(),
        metadata,
    };
    Ok((element, problem))
}

/// Merge AI-path and fallback elements. Earlier entries win on an exact
/// `(selector, type, text, position)` match, and an `unknown` entry is
/// dropped when a typed entry shares its selector, text and position.
pub fn merge(
    ai_path: Vec<InteractiveElement>,
    fallback: Vec<InteractiveElement>,
) -> Vec<InteractiveElement> {
    let all: Vec<InteractiveElement> = ai_path.into_iter().chain(fallback).collect();

    let typed: HashSet<_> = all
        .iter()
        .filter(|e| !e.element_type.is_unknown())
        .map(|e| (e.selector.clone(), e.text.clone(), e.position()))
        .collect();

    let mut seen = HashSet::new();
    all.into_iter()
        .filter(|e| {
            !(e.element_type.is_unknown()
                && typed.contains(&(e.selector.clone(), e.text.clone(), e.position())))
        })
        .filter(|e| seen.insert(e.dedup_key()))
        .collect()
}
