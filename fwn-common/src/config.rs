//! Configuration loading for the FireWatch node
//!
//! Philosophy: every field has a built-in default defined in code, so a
//! missing file or an empty TOML yields a fully working (simulated) node.
//! Resolution priority: command line > environment > TOML file > defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Complete node configuration, assembled at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub thresholds: RiskThresholds,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub fusion: FusionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// HTTP server bind settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Rule-engine thresholds
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RiskThresholds {
    /// Temperatures above this are a Warning (°C)
    #[serde(default = "default_temperature_threshold")]
    pub temperature: f32,
    /// Humidity below this is a Warning (%): very dry air is itself a risk
    #[serde(default = "default_humidity_low")]
    pub humidity_low: f32,
    /// Analog smoke-gas levels above this are a Danger (ADC counts)
    #[serde(default = "default_smoke_analog_threshold")]
    pub smoke_analog: u16,
}

/// Object detector settings
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    /// Path to an exported detector model; detector is disabled when unset
    /// or the file is missing
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Class table used to resolve labels from class ids
    #[serde(default = "default_class_names")]
    pub class_names: Vec<String>,
    /// Square model input size in pixels
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    /// Minimum time between detector passes; independent of the sampling tick
    #[serde(default = "default_detect_interval_ms")]
    pub detect_interval_ms: u64,
    /// Labels that count as a vision fire sighting for the rule engine
    #[serde(default = "default_fire_labels")]
    pub fire_labels: Vec<String>,
}

impl VisionConfig {
    pub fn detect_interval(&self) -> Duration {
        Duration::from_millis(self.detect_interval_ms)
    }
}

/// Fusion loop settings
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FusionConfig {
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Minimum time between automatic analysis triggers
    #[serde(default = "default_cooldown_secs")]
    pub analysis_cooldown_secs: u64,
    /// Answer Normal-risk analysis requests with a canned report instead of
    /// spending a service call
    #[serde(default = "default_true")]
    pub skip_analysis_when_normal: bool,
}

impl FusionConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn analysis_cooldown(&self) -> Duration {
        Duration::from_secs(self.analysis_cooldown_secs)
    }
}

/// External analysis service mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// OpenAI-compatible local endpoint (Ollama)
    #[default]
    Local,
    /// Hosted OpenAI-compatible endpoint; requires an API key
    Cloud,
}

/// External analysis service settings
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub mode: AnalysisMode,
    /// Endpoint base URL; defaults depend on `mode`
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key; also settable via `FWN_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model name; defaults depend on `mode`
    #[serde(default)]
    pub model: Option<String>,
    /// Hard timeout on the service call
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
    /// Longest image side sent to the service; larger frames are downscaled
    #[serde(default = "default_max_image_side")]
    pub max_image_side: u32,
    /// JPEG quality for the transmitted frame
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl AnalysisConfig {
    pub fn resolved_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match self.mode {
                AnalysisMode::Local => "http://localhost:11434/v1".to_string(),
                AnalysisMode::Cloud => "https://api.openai.com/v1".to_string(),
            },
        }
    }

    pub fn resolved_model(&self) -> String {
        match &self.model {
            Some(model) => model.clone(),
            None => match self.mode {
                AnalysisMode::Local => "moondream".to_string(),
                AnalysisMode::Cloud => "gpt-4o".to_string(),
            },
        }
    }

    /// API key to send. Local endpoints ignore the key but the protocol
    /// requires a placeholder.
    pub fn resolved_api_key(&self) -> String {
        match (&self.api_key, self.mode) {
            (Some(key), _) if !key.trim().is_empty() => key.clone(),
            (_, AnalysisMode::Local) => "ollama".to_string(),
            (_, AnalysisMode::Cloud) => String::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl NodeConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist and parse; with no path, the default
    /// location is tried and a missing file falls back to built-in defaults.
    /// Environment overrides (`FWN_PORT`, `FWN_API_KEY`) are applied last.
    pub fn load(path: Option<&Path>) -> Result<NodeConfig> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                let config = Self::from_toml(&content)?;
                info!("Configuration loaded from {}", path.display());
                config
            }
            None => match default_config_path() {
                Some(path) if path.exists() => {
                    let content = std::fs::read_to_string(&path).map_err(|e| {
                        Error::Config(format!("cannot read {}: {e}", path.display()))
                    })?;
                    let config = Self::from_toml(&content)?;
                    info!("Configuration loaded from {}", path.display());
                    config
                }
                _ => {
                    info!("No configuration file found, using built-in defaults");
                    NodeConfig::default()
                }
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a TOML document into a config, with all defaults applied.
    pub fn from_toml(content: &str) -> Result<NodeConfig> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid TOML: {e}")))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("FWN_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid FWN_PORT value: {port}"),
            }
        }
        if let Ok(key) = std::env::var("FWN_API_KEY") {
            if !key.trim().is_empty() {
                self.analysis.api_key = Some(key);
            }
        }
    }
}

/// Default configuration file path for the platform
/// (`~/.config/firewatch/config.toml` on Linux).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("firewatch").join("config.toml"))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            temperature: default_temperature_threshold(),
            humidity_low: default_humidity_low(),
            smoke_analog: default_smoke_analog_threshold(),
        }
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            class_names: default_class_names(),
            input_size: default_input_size(),
            confidence_threshold: default_confidence_threshold(),
            iou_threshold: default_iou_threshold(),
            detect_interval_ms: default_detect_interval_ms(),
            fire_labels: default_fire_labels(),
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_sample_interval_ms(),
            analysis_cooldown_secs: default_cooldown_secs(),
            skip_analysis_when_normal: default_true(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Local,
            base_url: None,
            api_key: None,
            model: None,
            timeout_secs: default_analysis_timeout_secs(),
            max_image_side: default_max_image_side(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8088
}

fn default_temperature_threshold() -> f32 {
    50.0
}

fn default_humidity_low() -> f32 {
    20.0
}

fn default_smoke_analog_threshold() -> u16 {
    300
}

fn default_class_names() -> Vec<String> {
    vec!["fire".to_string(), "smoke".to_string()]
}

fn default_input_size() -> u32 {
    320
}

fn default_confidence_threshold() -> f32 {
    0.4
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_detect_interval_ms() -> u64 {
    500
}

fn default_fire_labels() -> Vec<String> {
    vec!["fire".to_string(), "flame".to_string()]
}

fn default_sample_interval_ms() -> u64 {
    2000
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_analysis_timeout_secs() -> u64 {
    30
}

fn default_max_image_side() -> u32 {
    384
}

fn default_jpeg_quality() -> u8 {
    55
}
