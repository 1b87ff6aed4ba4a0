use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::adapt::engine::AdaptationConfig;
use crate::browser::session::DEFAULT_SERVER_SCRIPT;
use crate::detector::config::DetectionConfig;
use crate::observer::ollama::{DEFAULT_ENDPOINT, DEFAULT_MODEL};

pub const DEFAULT_CONFIG_FILE: &str = "element-detection.yaml";

// ============================================================================
// CLI Argument Parsing (clap derive)
// ============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "element-detection",
    version,
    about = "Self-healing interactive element detection"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Ollama API endpoint
    #[arg(long, global = true)]
    pub ollama_endpoint: Option<String>,

    /// Ollama model name
    #[arg(long, global = true)]
    pub ollama_model: Option<String>,

    /// Path to config file (default: element-detection.yaml in current dir)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Append one JSON line per adaptation attempt to this file
    #[arg(long, global = true)]
    pub trace: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect interactive elements on a saved page or a live URL
    Detect {
        /// Saved HTML file to scan
        #[arg(long, conflicts_with = "live", required_unless_present = "live")]
        file: Option<String>,

        /// Live URL to open in the browser server
        #[arg(long)]
        live: Option<String>,

        /// URL to report for a saved page
        #[arg(long, default_value = "about:blank")]
        url: String,

        /// Element observer: none, mock or ollama
        #[arg(long, default_value = "none")]
        observer: String,

        /// Browser server script for --live
        #[arg(long, default_value = DEFAULT_SERVER_SCRIPT)]
        server_script: String,
    },

    /// Detect on one page version and re-locate every element on another
    Adapt {
        /// HTML before the UI change
        #[arg(long)]
        before: String,

        /// HTML after the UI change
        #[arg(long)]
        after: String,

        /// URL both versions are served under
        #[arg(long, default_value = "about:blank")]
        url: String,

        /// Element observer: none, mock or ollama
        #[arg(long, default_value = "none")]
        observer: String,
    },
}

// ============================================================================
// Config File Model (optional YAML)
// ============================================================================

/// Optional YAML config file: `element-detection.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub adaptation: AdaptationConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OllamaConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TraceConfig {
    pub path: Option<String>,
}

// ============================================================================
// Config File Loading
// ============================================================================

/// Load config from a YAML file. Returns defaults if file is missing or malformed.
pub fn load_config(path: Option<&str>) -> AppConfig {
    let config_path = path.unwrap_or(DEFAULT_CONFIG_FILE);
    match std::fs::read_to_string(config_path) {
        Ok(content) => serde_yaml::from_str(&content).unwrap_or_else(|e| {
            warn!(path = config_path, error = %e, "malformed config file, using defaults");
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    }
}

// ============================================================================
// Setting Resolution
// ============================================================================

/// Resolved Ollama connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaSettings {
    pub endpoint: String,
    pub model: String,
}

/// CLI flag > config file > environment > built-in default.
pub fn resolve_ollama(
    cli_endpoint: Option<&str>,
    cli_model: Option<&str>,
    config: &OllamaConfig,
) -> OllamaSettings {
    let endpoint = cli_endpoint
        .map(str::to_string)
        .or_else(|| config.endpoint.clone())
        .or_else(|| std::env::var("OLLAMA_ENDPOINT").ok())
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let model = cli_model
        .map(str::to_string)
        .or_else(|| config.model.clone())
        .or_else(|| std::env::var("OLLAMA_MODEL").ok())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    OllamaSettings { endpoint, model }
}

/// CLI flag > config file.
pub fn resolve_trace_path(cli_trace: Option<&str>, config: &TraceConfig) -> Option<String> {
    cli_trace.map(str::to_string).or_else(|| config.path.clone())
}
