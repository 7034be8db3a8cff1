//! Periodic fusion loop
//!
//! One long-lived task samples the sensor and frame sources, runs the
//! detector on its own coarser cadence, folds everything into the shared
//! snapshot, classifies risk, and escalates to the analysis orchestrator.
//! A single failed reading, frame, or detector pass never stops the loop.

use crate::analysis::{AnalysisClient, AnalysisOrchestrator};
use crate::fusion::classifier::{classify, vision_fire_detected};
use crate::hardware::{FrameSource, SensorSource};
use crate::state::SharedState;
use crate::vision::VisionDetector;
use chrono::Utc;
use fwn_common::config::{NodeConfig, RiskThresholds};
use fwn_common::events::NodeEvent;
use fwn_common::{RiskLevel, TriggerReason};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Message shown once readings drop back to normal with nothing in flight.
pub const ALL_CLEAR_TEXT: &str = "All clear: readings returned to normal.";

/// The periodic fusion driver.
pub struct FusionEngine<S, F, C> {
    sensors: S,
    camera: F,
    detector: VisionDetector,
    orchestrator: Arc<AnalysisOrchestrator<C>>,
    shared: Arc<SharedState>,
    sample_interval: Duration,
    detect_interval: Duration,
    fire_labels: Vec<String>,
    thresholds: RiskThresholds,
}

/// Running engine; cancel and await via [`EngineHandle::stop`].
pub struct EngineHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EngineHandle {
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
        info!("Fusion engine stopped");
    }
}

impl<S, F, C> FusionEngine<S, F, C>
where
    S: SensorSource + 'static,
    F: FrameSource + 'static,
    C: AnalysisClient,
{
    pub fn new(
        sensors: S,
        camera: F,
        detector: VisionDetector,
        orchestrator: Arc<AnalysisOrchestrator<C>>,
        shared: Arc<SharedState>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            sensors,
            camera,
            detector,
            orchestrator,
            shared,
            sample_interval: config.fusion.sample_interval(),
            detect_interval: config.vision.detect_interval(),
            fire_labels: config.vision.fire_labels.clone(),
            thresholds: config.thresholds,
        }
    }

    /// Spawn the sampling loop.
    pub fn start(self) -> EngineHandle {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            self.run(loop_cancel).await;
        });
        EngineHandle { cancel, task }
    }

    async fn run(self, cancel: CancellationToken) {
        info!(
            interval_ms = self.sample_interval.as_millis() as u64,
            detector_ready = self.detector.is_ready(),
            "Fusion engine started"
        );
        let mut ticker = tokio::time::interval(self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_detect: Option<Instant> = None;
        let mut prev_risk = RiskLevel::Normal;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick(&mut last_detect, &mut prev_risk).await;
        }
    }

    async fn tick(&self, last_detect: &mut Option<Instant>, prev_risk: &mut RiskLevel) {
        // 1. Sample sources; absent values are data, not errors
        let reading = self.sensors.read_all();
        let frame = self.camera.capture().map(Arc::new);

        // 2. Detector runs on its own cadence, not every sampling tick
        let detect_due = last_detect.map_or(true, |t| t.elapsed() >= self.detect_interval);
        let detections = match &frame {
            Some(frame) if detect_due && self.detector.is_ready() => {
                *last_detect = Some(Instant::now());
                self.detector.detect(frame)
            }
            _ => None,
        };

        // 3. Fold into the snapshot in one short critical section
        let view = self
            .shared
            .apply_sample(reading, frame, detections.clone())
            .await;

        if let Some(detections) = &detections {
            self.shared.events().emit_lossy(NodeEvent::DetectionsUpdated {
                count: detections.len(),
                fire_detected: vision_fire_detected(detections, &self.fire_labels),
                timestamp: Utc::now(),
            });
        }

        // 4. Classify from the just-updated view
        let fire = vision_fire_detected(&view.detections, &self.fire_labels);
        let risk = classify(&view.reading, fire, &self.thresholds);

        // 5. Escalate or stand down
        if risk.is_elevated() {
            // Cooldown and admission are enforced inside the orchestrator
            let started = Arc::clone(&self.orchestrator)
                .trigger(TriggerReason::Auto(risk))
                .await;
            if started {
                debug!(%risk, "Automatic analysis started");
            }
        } else if prev_risk.is_elevated() && self.shared.write_all_clear(ALL_CLEAR_TEXT).await {
            info!("Risk returned to normal");
        }

        // 6. Publish the computed risk
        let old = self.shared.set_risk(risk).await;
        if old != risk {
            self.shared.events().emit_lossy(NodeEvent::RiskLevelChanged {
                old_level: old,
                new_level: risk,
                timestamp: Utc::now(),
            });
        }
        *prev_risk = risk;
    }
}
