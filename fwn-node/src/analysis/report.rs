//! Analysis result normalization
//!
//! The external service is asked for a fixed JSON schema but cannot be
//! trusted to honor it: responses arrive as clean JSON, JSON wrapped in
//! prose or code fences, or free text. Whatever arrives, the caller gets a
//! well-formed [`AnalysisReport`], and the service's own risk claim is never
//! accepted unvalidated.

use fwn_common::{AnalysisReport, RiskLevel};
use serde::Deserialize;

/// Loosely-typed mirror of the expected schema; every field optional so a
/// partial object still contributes what it has.
#[derive(Debug, Deserialize)]
struct RawReport {
    risk_level: Option<String>,
    description: Option<String>,
    suggestion: Option<String>,
}

/// Normalize raw service output into the fixed report schema.
///
/// Parse order: the whole text as JSON, then the widest braced substring,
/// then the raw text as a plain description. `fallback_risk` (the rule
/// engine's own verdict) replaces any missing or out-of-set risk tag.
pub fn normalize_response(raw: &str, fallback_risk: RiskLevel) -> AnalysisReport {
    let parsed = serde_json::from_str::<RawReport>(raw)
        .ok()
        .or_else(|| {
            extract_json(raw).and_then(|fragment| serde_json::from_str::<RawReport>(fragment).ok())
        })
        .unwrap_or(RawReport {
            risk_level: None,
            description: Some(raw.to_string()),
            suggestion: None,
        });

    let risk_level = parsed
        .risk_level
        .as_deref()
        .and_then(RiskLevel::from_tag)
        .unwrap_or(fallback_risk);

    AnalysisReport {
        risk_level,
        description: parsed.description.unwrap_or_default(),
        suggestion: parsed.suggestion.unwrap_or_default(),
    }
}

/// Widest `{ ... }` substring, for responses that wrap JSON in prose.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Canned report used when the skip-when-normal policy answers a request
/// without contacting the service.
pub fn normal_report() -> AnalysisReport {
    AnalysisReport {
        risk_level: RiskLevel::Normal,
        description: "System operating normally; sensor readings show no anomaly.".to_string(),
        suggestion: "No action required.".to_string(),
    }
}
