use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::adapt::cache::{AdaptiveCache, DEFAULT_TTL_MS, cache_key, now_ms};
use crate::adapt::fuzzy::best_fuzzy_match;
use crate::adapt::history::{AdaptationAttempt, AdaptationHistory, AdaptationStats, AdaptationStrategy};
use crate::adapt::structural::best_structural_match;
use crate::browser::error::PageError;
use crate::browser::page::{DomNode, Page, probe_visible};
use crate::detector::error::DetectionError;
use crate::detector::heuristics::element_from_node;
use crate::detector::primary::{PrimaryDetector, merge, resolve_observation};
use crate::detector::queries::reacquisition_instruction;
use crate::element::element_model::{DetectionResult, InteractiveElement};
use crate::element::taxonomy::element_id;
use crate::trace::logger::TraceLogger;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    pub cache_ttl_ms: u64,
    /// Attempts recorded per (selector, page url) before giving up.
    pub max_attempts: usize,
    /// Structural candidates must score strictly above this.
    pub structural_threshold: u32,
    /// Fuzzy candidates must score strictly above this.
    pub fuzzy_threshold: f64,
    /// Try observer re-acquisition before the DOM strategies.
    pub enable_ai: bool,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: DEFAULT_TTL_MS,
            max_attempts: 3,
            structural_threshold: 3,
            fuzzy_threshold: 0.6,
            enable_ai: true,
        }
    }
}

impl AdaptationConfig {
    pub fn validate(&self) -> Result<(), DetectionError> {
        if self.max_attempts == 0 {
            return Err(DetectionError::Config("max_attempts must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.fuzzy_threshold) {
            return Err(DetectionError::Config(format!(
                "fuzzy_threshold must be within [0, 1), got {}",
                self.fuzzy_threshold
            )));
        }
        Ok(())
    }
}

/// A replacement found by one strategy.
struct Replacement {
    element: InteractiveElement,
    strategy: AdaptationStrategy,
    score: Option<f64>,
}

/// Keeps detected elements usable across UI changes.
///
/// Wraps a `PrimaryDetector`, caches what it finds, re-validates cached
/// elements against the live page and re-locates the ones whose selector
/// broke: observer re-acquisition first, then structural similarity, then
/// fuzzy text. Every adaptation attempt counts against a per-(selector, page)
/// budget.
pub struct AdaptationEngine {
    detector: PrimaryDetector,
    cache: AdaptiveCache,
    history: AdaptationHistory,
    config: AdaptationConfig,
    trace: Option<TraceLogger>,
}

impl AdaptationEngine {
    pub fn new(detector: PrimaryDetector, config: AdaptationConfig) -> Self {
        Self {
            detector,
            cache: AdaptiveCache::new(config.cache_ttl_ms),
            history: AdaptationHistory::new(config.max_attempts),
            config,
            trace: None,
        }
    }

    /// Write one JSONL record per adaptation attempt.
    pub fn with_trace(mut self, trace: TraceLogger) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn detector(&self) -> &PrimaryDetector {
        &self.detector
    }

    pub fn cache(&self) -> &AdaptiveCache {
        &self.cache
    }

    pub fn history(&self) -> &AdaptationHistory {
        &self.history
    }

    pub fn config(&self) -> &AdaptationConfig {
        &self.config
    }

    pub async fn initialize(&mut self, page: &dyn Page) {
        self.detector.initialize(page).await;
    }

    /// Detect, cache, and re-validate. Elements that no longer resolve are
    /// adapted; the ones that cannot be adapted are left out.
    pub async fn detect_interactive_elements(
        &mut self,
        page: &dyn Page,
    ) -> Result<DetectionResult, DetectionError> {
        let started = Instant::now();
        let detected = self.detector.detect_interactive_elements(page).await?;
        let page_url = page.url();

        let purged = self.cache.purge_expired();
        if purged > 0 {
            debug!(purged, "expired snapshots dropped");
        }
        for element in &detected.elements {
            self.cache.put(&page_url, element.clone());
        }

        let mut validated = Vec::with_capacity(detected.elements.len());
        let mut lost = 0;
        for element in detected.elements {
            if still_present(page, &element).await? {
                validated.push(element);
            } else if let Some(adapted) = self.get_adaptive_element(page, &element).await? {
                validated.push(adapted);
            } else {
                lost += 1;
                debug!(selector = %element.selector, "element lost");
            }
        }

        let elements = merge(validated, Vec::new());
        info!(
            url = %page_url,
            kept = elements.len(),
            lost,
            "detection validated"
        );

        Ok(DetectionResult {
            total_found: elements.len(),
            elements,
            detection_time: started.elapsed().as_millis() as u64,
            errors: detected.errors,
        })
    }

    /// Return a live version of `element`, adapting it if its selector no
    /// longer resolves to a visible node. `None` when every strategy failed
    /// or the attempt budget for this selector is spent.
    #[instrument(name = "adapt", skip_all, fields(page_url = %page.url(), selector = %element.selector))]
    pub async fn get_adaptive_element(
        &mut self,
        page: &dyn Page,
        element: &InteractiveElement,
    ) -> Result<Option<InteractiveElement>, DetectionError> {
        if probe_visible(page, &element.selector).await? {
            return Ok(Some(element.clone()));
        }

        let page_url = page.url();

        if let Some(snapshot) = self.cache.find_adapted(&page_url, &element.selector) {
            let cached = snapshot.element.clone();
            if probe_visible(page, &cached.selector).await? {
                debug!(from = %element.selector, to = %cached.selector, "reusing cached adaptation");
                return Ok(Some(cached));
            }
        }

        if self.history.is_exhausted(&element.selector, &page_url) {
            debug!(selector = %element.selector, "adaptation budget spent");
            return Ok(None);
        }

        let use_observer = self.config.enable_ai && self.detector.rebind(page).await;
        let replacement = self.find_replacement(page, element, use_observer).await?;
        let timestamp = now_ms();

        let attempt = match &replacement {
            Some(r) => AdaptationAttempt::succeeded(
                timestamp,
                &element.selector,
                &r.element.selector,
                r.strategy,
            ),
            None => AdaptationAttempt::failed(timestamp, &element.selector),
        };
        self.record(&page_url, element, attempt, replacement.as_ref().and_then(|r| r.score));

        let Some(replacement) = replacement else {
            warn!(selector = %element.selector, "all adaptation strategies failed");
            return Ok(None);
        };

        info!(
            from = %element.selector,
            to = %replacement.element.selector,
            strategy = %replacement.strategy,
            "element adapted"
        );
        self.cache.put(&page_url, replacement.element.clone());
        Ok(Some(replacement.element))
    }

    pub fn get_adaptation_stats(&self) -> AdaptationStats {
        self.history.stats()
    }

    /// Release the observer and forget everything. Safe to call repeatedly.
    pub async fn cleanup(&mut self) {
        self.detector.cleanup().await;
        self.cache.clear();
        self.history.clear();
    }

    fn record(
        &mut self,
        page_url: &str,
        element: &InteractiveElement,
        attempt: AdaptationAttempt,
        score: Option<f64>,
    ) {
        if let Some(trace) = &self.trace {
            trace.log_attempt(page_url, &attempt, score);
        }

        self.cache
            .record_attempt(&cache_key(page_url, element), attempt.clone());
        self.history.record(page_url, attempt);
    }

    async fn find_replacement(
        &self,
        page: &dyn Page,
        element: &InteractiveElement,
        use_observer: bool,
    ) -> Result<Option<Replacement>, PageError> {
        let nodes = page.dom_snapshot().await?;
        let page_url = page.url();

        if use_observer {
            if let Some(found) = self.reacquire(page, &nodes, element).await? {
                return Ok(Some(found));
            }
        }

        if let Some((index, score)) =
            best_structural_match(element, &nodes, self.config.structural_threshold)
        {
            debug!(selector = %element.selector, score, "structural match");
            return Ok(adapt_from_node(
                &nodes,
                index,
                &page_url,
                element,
                AdaptationStrategy::StructuralSimilarity,
                score as f64,
            ));
        }

        if let Some((index, score)) = best_fuzzy_match(element, &nodes, self.config.fuzzy_threshold) {
            debug!(selector = %element.selector, score, "fuzzy text match");
            return Ok(adapt_from_node(
                &nodes,
                index,
                &page_url,
                element,
                AdaptationStrategy::FuzzyText,
                score,
            ));
        }

        Ok(None)
    }

    /// Ask the observer where the element went and take the first hit that
    /// resolves to a single visible element other than the original.
    async fn reacquire(
        &self,
        page: &dyn Page,
        nodes: &[DomNode],
        element: &InteractiveElement,
    ) -> Result<Option<Replacement>, PageError> {
        let Some(observer) = self.detector.observer() else {
            return Ok(None);
        };

        let observations = match observer.observe(&reacquisition_instruction(element)).await {
            Ok(obs) => obs,
            Err(e) => {
                warn!(selector = %element.selector, error = %e, "re-acquisition query failed");
                return Ok(None);
            }
        };

        for observation in observations.iter().filter(|o| o.selector != element.selector) {
            let Some((mut found, _)) = resolve_observation(page, observation, nodes, false).await? else {
                continue;
            };
            if found.selector == element.selector {
                continue;
            }
            if found.element_type.is_unknown() {
                found.element_type = element.element_type;
            }
            let page_url = page.url();
            mark_adapted(&mut found, &page_url, element, AdaptationStrategy::AiReacquisition, None);
            return Ok(Some(Replacement {
                element: found,
                strategy: AdaptationStrategy::AiReacquisition,
                score: None,
            }));
        }

        Ok(None)
    }
}

/// Existence and visibility check for a freshly detected element. Elements
/// that were detected hidden only need to exist.
async fn still_present(page: &dyn Page, element: &InteractiveElement) -> Result<bool, PageError> {
    if element.is_visible {
        return probe_visible(page, &element.selector).await;
    }
    match page.query(&element.selector).await {
        Ok(found) => Ok(found.is_some()),
        Err(e) if e.is_fatal() => Err(e),
        Err(_) => Ok(false),
    }
}

fn adapt_from_node(
    nodes: &[DomNode],
    index: usize,
    page_url: &str,
    original: &InteractiveElement,
    strategy: AdaptationStrategy,
    score: f64,
) -> Option<Replacement> {
    let mut element = element_from_node(nodes, index, page_url)?;
    if element.element_type.is_unknown() {
        element.element_type = original.element_type;
    }
    mark_adapted(&mut element, page_url, original, strategy, Some(score));
    Some(Replacement {
        element,
        strategy,
        score: Some(score),
    })
}

fn mark_adapted(
    element: &mut InteractiveElement,
    page_url: &str,
    original: &InteractiveElement,
    strategy: AdaptationStrategy,
    score: Option<f64>,
) {
    element.metadata.adapted_from = Some(original.selector.clone());
    element.metadata.adaptation_strategy = Some(strategy);
    element.metadata.adaptation_score = score;
    element.id = element_id(
        page_url,
        element.element_type,
        &element.selector,
        element.text.as_deref(),
    );
}
