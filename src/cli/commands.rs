use serde::Serialize;
use tracing::info;

use crate::adapt::engine::AdaptationEngine;
use crate::adapt::history::AdaptationStats;
use crate::browser::html_page::HtmlPage;
use crate::browser::page::Page;
use crate::browser::session::SessionPage;
use crate::cli::config::{AppConfig, OllamaSettings};
use crate::detector::primary::PrimaryDetector;
use crate::element::element_model::{DetectionResult, InteractiveElement};
use crate::observer::observer::ElementObserver;
use crate::observer::ollama::OllamaObserver;
use crate::observer::scripted::ScriptedObserver;
use crate::trace::logger::TraceLogger;

/// Everything a command needs after CLI, config file and environment have
/// been merged.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: AppConfig,
    pub ollama: OllamaSettings,
    pub trace_path: Option<String>,
}

// ============================================================================
// detect subcommand
// ============================================================================

/// Where `detect` reads its page from.
#[derive(Debug, Clone, PartialEq)]
pub enum PageSource {
    File { path: String, url: String },
    Live { url: String, server_script: String },
}

pub async fn cmd_detect(
    source: &PageSource,
    observer_name: &str,
    settings: &Settings,
) -> Result<DetectionResult, Box<dyn std::error::Error>> {
    let mut engine = build_engine(observer_name, settings)?;

    let result = match source {
        PageSource::File { path, url } => {
            let page = load_html_page(path, url)?;
            run_detect(&mut engine, &page).await?
        }
        PageSource::Live { url, server_script } => {
            let page = SessionPage::open(server_script, url).await?;
            let result = run_detect(&mut engine, &page).await;
            page.close().await?;
            result?
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result)
}

async fn run_detect(
    engine: &mut AdaptationEngine,
    page: &dyn Page,
) -> Result<DetectionResult, Box<dyn std::error::Error>> {
    engine.initialize(page).await;
    let result = engine.detect_interactive_elements(page).await;
    engine.cleanup().await;
    Ok(result?)
}

// ============================================================================
// adapt subcommand
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptReport {
    /// Elements found on the new page, adapted or unchanged.
    pub elements: Vec<InteractiveElement>,
    /// Original selectors that could not be re-located.
    pub lost: Vec<String>,
    pub stats: AdaptationStats,
}

pub async fn cmd_adapt(
    before_path: &str,
    after_path: &str,
    url: &str,
    observer_name: &str,
    settings: &Settings,
) -> Result<AdaptReport, Box<dyn std::error::Error>> {
    let before = load_html_page(before_path, url)?;
    let after = load_html_page(after_path, url)?;

    let mut engine = build_engine(observer_name, settings)?;
    engine.initialize(&before).await;
    let detected = engine.detect_interactive_elements(&before).await?;
    info!(count = detected.total_found, "detected on original page");

    let mut elements = Vec::new();
    let mut lost = Vec::new();
    for element in &detected.elements {
        match engine.get_adaptive_element(&after, element).await? {
            Some(found) => elements.push(found),
            None => lost.push(element.selector.clone()),
        }
    }

    let report = AdaptReport {
        elements,
        lost,
        stats: engine.get_adaptation_stats(),
    };
    engine.cleanup().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report)
}

// ============================================================================
// Helpers
// ============================================================================

fn load_html_page(path: &str, url: &str) -> Result<HtmlPage, Box<dyn std::error::Error>> {
    let html = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    Ok(HtmlPage::parse(url, &html))
}

/// Build the observer named on the command line.
pub fn build_observer(
    name: &str,
    ollama: &OllamaSettings,
) -> Result<Option<Box<dyn ElementObserver>>, Box<dyn std::error::Error>> {
    match name {
        "none" => Ok(None),
        "mock" => Ok(Some(Box::new(ScriptedObserver::new()))),
        "ollama" => Ok(Some(Box::new(OllamaObserver::new(
            &ollama.endpoint,
            &ollama.model,
        )))),
        other => Err(format!("Unknown observer '{}' (expected none, mock or ollama)", other).into()),
    }
}

pub fn build_engine(
    observer_name: &str,
    settings: &Settings,
) -> Result<AdaptationEngine, Box<dyn std::error::Error>> {
    settings.config.detection.validate()?;
    settings.config.adaptation.validate()?;

    let detection = settings.config.detection.clone();
    let detector = match build_observer(observer_name, &settings.ollama)? {
        Some(observer) => PrimaryDetector::with_observer(observer, detection),
        None => PrimaryDetector::new(detection),
    };

    let engine = AdaptationEngine::new(detector, settings.config.adaptation.clone());
    Ok(match &settings.trace_path {
        Some(path) => engine.with_trace(TraceLogger::new(path)),
        None => engine,
    })
}
