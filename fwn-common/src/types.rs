//! Shared data model for the FireWatch node
//!
//! These types cross crate boundaries: the fusion engine writes them, the
//! HTTP layer serializes them, and the event system embeds them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete fire-risk level, ordered by severity.
///
/// `Normal < Warning < Danger` — the derived `Ord` relies on variant order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RiskLevel {
    #[default]
    Normal,
    Warning,
    Danger,
}

impl RiskLevel {
    /// Stable tag string, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Normal => "Normal",
            RiskLevel::Warning => "Warning",
            RiskLevel::Danger => "Danger",
        }
    }

    /// Parse a tag produced by us or claimed by an external service.
    ///
    /// Case-insensitive and whitespace-tolerant; returns `None` for anything
    /// outside the enumerated set so callers can substitute their own value.
    pub fn from_tag(tag: &str) -> Option<RiskLevel> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "normal" => Some(RiskLevel::Normal),
            "warning" => Some(RiskLevel::Warning),
            "danger" => Some(RiskLevel::Danger),
            _ => None,
        }
    }

    /// Whether this level should escalate to external analysis.
    pub fn is_elevated(&self) -> bool {
        *self > RiskLevel::Normal
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One round of environmental sensor readings.
///
/// Every field is optional: a `None` means the hardware read failed or the
/// sensor is absent, never a measured zero/false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Temperature in °C
    pub temperature: Option<f32>,
    /// Relative humidity in %
    pub humidity: Option<f32>,
    /// Digital smoke flag from the gas sensor comparator
    pub smoke_digital: Option<bool>,
    /// Analog smoke-gas level (ADC counts, device-specific range)
    pub smoke_analog: Option<u16>,
}

/// One calibrated detection in source-frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    /// Confidence normalized to [0, 1]
    pub confidence: f32,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Normalized analysis result — always exactly these three fields, no matter
/// what the backing service returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub risk_level: RiskLevel,
    pub description: String,
    pub suggestion: String,
}

/// Why an analysis run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Operator request via the API; bypasses the cooldown.
    Manual,
    /// Escalation from the rule engine at the given risk level.
    Auto(RiskLevel),
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerReason::Manual => f.write_str("manual"),
            TriggerReason::Auto(level) => write!(f, "auto:{level}"),
        }
    }
}

/// Consistent view of the node state, as served by `GET /api/status`.
///
/// Produced atomically from the engine's snapshot; readers never observe a
/// torn mix of two write cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub smoke_digital: Option<bool>,
    pub smoke_analog: Option<u16>,
    pub risk_level: RiskLevel,
    pub detections: Vec<Detection>,
    /// Last completed structured analysis, if any
    pub analysis: Option<AnalysisReport>,
    /// Human-readable analysis text (description or canned message)
    pub analysis_text: String,
    pub analysis_in_progress: bool,
    pub last_analysis_error: Option<String>,
    pub last_analysis_trigger: Option<String>,
    /// Monotonically increasing analysis request id; observers compare ids to
    /// tell a fresh result from a stale in-flight one.
    pub last_request_id: u64,
    pub timestamp: DateTime<Utc>,
}
