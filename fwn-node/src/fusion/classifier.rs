//! Risk rule engine
//!
//! A pure function over the current readings. Rules are evaluated in strict
//! priority order and the first match wins; absent readings skip their rule
//! rather than satisfying it.

use fwn_common::config::RiskThresholds;
use fwn_common::{Detection, RiskLevel, SensorReading};

/// Classify the current fused inputs into a risk level.
///
/// Priority order:
/// 1. vision fire sighting        -> Danger
/// 2. digital smoke flag          -> Danger
/// 3. analog smoke over threshold -> Danger
/// 4. temperature over threshold  -> Warning
/// 5. humidity under threshold    -> Warning
/// 6. otherwise                   -> Normal
pub fn classify(
    reading: &SensorReading,
    vision_fire: bool,
    thresholds: &RiskThresholds,
) -> RiskLevel {
    if vision_fire {
        return RiskLevel::Danger;
    }
    if reading.smoke_digital == Some(true) {
        return RiskLevel::Danger;
    }
    if let Some(level) = reading.smoke_analog {
        if level > thresholds.smoke_analog {
            return RiskLevel::Danger;
        }
    }
    if let Some(temperature) = reading.temperature {
        if temperature > thresholds.temperature {
            return RiskLevel::Warning;
        }
    }
    if let Some(humidity) = reading.humidity {
        if humidity < thresholds.humidity_low {
            return RiskLevel::Warning;
        }
    }
    RiskLevel::Normal
}

/// Whether any detection carries one of the configured fire labels.
pub fn vision_fire_detected(detections: &[Detection], fire_labels: &[String]) -> bool {
    detections.iter().any(|det| {
        fire_labels
            .iter()
            .any(|label| label.eq_ignore_ascii_case(&det.label))
    })
}
