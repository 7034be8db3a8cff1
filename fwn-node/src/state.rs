//! Shared node state
//!
//! Thread-safe snapshot of the fused system view, shared between the fusion
//! loop, the analysis tasks, and the HTTP layer.
//!
//! One `RwLock` guards the whole snapshot: every write replaces a consistent
//! group of fields inside a single critical section, so readers never observe
//! a torn mix of two write cycles. No I/O happens while the lock is held.

use chrono::{DateTime, Utc};
use fwn_common::events::EventBus;
use fwn_common::{AnalysisReport, Detection, RiskLevel, SensorReading, StatusSnapshot};
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The single mutable snapshot. Created once with all-absent defaults and
/// mutated in place for the process lifetime.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    reading: SensorReading,
    detections: Vec<Detection>,
    frame: Option<Arc<RgbImage>>,
    risk_level: RiskLevel,
    analysis: Option<AnalysisReport>,
    analysis_text: String,
    analysis_in_progress: bool,
    last_analysis_error: Option<String>,
    last_analysis_trigger: Option<String>,
    last_request_id: u64,
    last_update: Option<DateTime<Utc>>,
}

/// Consistent copy of the fields the rule engine consumes, taken in the same
/// critical section that wrote them.
#[derive(Debug, Clone)]
pub struct SampleView {
    pub reading: SensorReading,
    pub detections: Vec<Detection>,
}

/// Shared state accessible by all components
pub struct SharedState {
    snapshot: RwLock<Snapshot>,
    events: EventBus,
}

impl SharedState {
    pub fn new(events: EventBus) -> Self {
        Self {
            snapshot: RwLock::new(Snapshot::default()),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Fold one sampling cycle into the snapshot.
    ///
    /// Sensor fields update only when present, so the snapshot keeps the
    /// last-known-good value across transient read failures. The frame is
    /// replaced unconditionally (a dead camera must not show a stale feed).
    /// `detections` is `None` when the detector did not run this cycle; the
    /// stored list is left untouched in that case so a detector outage never
    /// reads as "scene cleared".
    pub async fn apply_sample(
        &self,
        reading: SensorReading,
        frame: Option<Arc<RgbImage>>,
        detections: Option<Vec<Detection>>,
    ) -> SampleView {
        let mut snap = self.snapshot.write().await;
        if reading.temperature.is_some() {
            snap.reading.temperature = reading.temperature;
        }
        if reading.humidity.is_some() {
            snap.reading.humidity = reading.humidity;
        }
        if reading.smoke_digital.is_some() {
            snap.reading.smoke_digital = reading.smoke_digital;
        }
        if reading.smoke_analog.is_some() {
            snap.reading.smoke_analog = reading.smoke_analog;
        }
        snap.frame = frame;
        if let Some(detections) = detections {
            snap.detections = detections;
        }
        snap.last_update = Some(Utc::now());
        SampleView {
            reading: snap.reading,
            detections: snap.detections.clone(),
        }
    }

    /// Write the computed risk level; returns the previous level.
    pub async fn set_risk(&self, level: RiskLevel) -> RiskLevel {
        let mut snap = self.snapshot.write().await;
        std::mem::replace(&mut snap.risk_level, level)
    }

    /// Mark an admitted analysis request in the snapshot.
    pub async fn begin_analysis(&self, request_id: u64, trigger: String) {
        let mut snap = self.snapshot.write().await;
        snap.analysis_in_progress = true;
        snap.last_request_id = request_id;
        snap.last_analysis_trigger = Some(trigger);
        snap.last_analysis_error = None;
    }

    /// Fold a completed analysis back into the snapshot and clear the
    /// in-progress flag. Runs for both outcomes.
    pub async fn complete_analysis(
        &self,
        request_id: u64,
        outcome: Result<AnalysisReport, String>,
    ) {
        let mut snap = self.snapshot.write().await;
        snap.analysis_in_progress = false;
        snap.last_request_id = request_id;
        match outcome {
            Ok(report) => {
                snap.analysis_text = report.description.clone();
                snap.analysis = Some(report);
                snap.last_analysis_error = None;
            }
            Err(error) => {
                snap.last_analysis_error = Some(error);
            }
        }
    }

    /// Replace the analysis text with a canned all-clear message, unless an
    /// analysis is in flight (its result would be overwritten on landing).
    /// Returns whether the overwrite happened.
    pub async fn write_all_clear(&self, text: &str) -> bool {
        let mut snap = self.snapshot.write().await;
        if snap.analysis_in_progress {
            return false;
        }
        snap.analysis_text = text.to_string();
        snap.analysis = None;
        snap.last_analysis_error = None;
        true
    }

    /// Fields an analysis task needs, copied out under a read lock that is
    /// released before any network activity.
    pub async fn analysis_context(&self) -> (SensorReading, RiskLevel, Option<Arc<RgbImage>>) {
        let snap = self.snapshot.read().await;
        (snap.reading, snap.risk_level, snap.frame.clone())
    }

    /// Latest frame reference; consumers must copy before mutating.
    pub async fn frame(&self) -> Option<Arc<RgbImage>> {
        self.snapshot.read().await.frame.clone()
    }

    /// Latest detection list.
    pub async fn detections(&self) -> Vec<Detection> {
        self.snapshot.read().await.detections.clone()
    }

    /// Serialize the full consistent view for the status API.
    pub async fn status(&self) -> StatusSnapshot {
        let snap = self.snapshot.read().await;
        StatusSnapshot {
            temperature: snap.reading.temperature,
            humidity: snap.reading.humidity,
            smoke_digital: snap.reading.smoke_digital,
            smoke_analog: snap.reading.smoke_analog,
            risk_level: snap.risk_level,
            detections: snap.detections.clone(),
            analysis: snap.analysis.clone(),
            analysis_text: snap.analysis_text.clone(),
            analysis_in_progress: snap.analysis_in_progress,
            last_analysis_error: snap.last_analysis_error.clone(),
            last_analysis_trigger: snap.last_analysis_trigger.clone(),
            last_request_id: snap.last_request_id,
            timestamp: snap.last_update.unwrap_or_else(Utc::now),
        }
    }
}
