//! Analysis orchestration
//!
//! Admission control and rate limiting for external analysis calls. At most
//! one analysis task is outstanding system-wide; a second trigger while one
//! is in flight is rejected, not queued. Automatic triggers are additionally
//! rate-limited by a cooldown. Both checks happen in one critical section of
//! the orchestration lock, so two racing triggers can never both pass.
//!
//! The orchestration lock is distinct from the snapshot lock and no code
//! path holds both at once; neither is ever held across the network call.

use super::client::{AnalysisClient, AnalysisError};
use super::report::{normal_report, normalize_response};
use super::{build_prompt, encode_frame};
use crate::state::SharedState;
use chrono::Utc;
use fwn_common::config::NodeConfig;
use fwn_common::events::{EventBus, NodeEvent};
use fwn_common::{AnalysisReport, RiskLevel, TriggerReason};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct OrchestratorInner {
    in_progress: bool,
    last_trigger_at: Option<Instant>,
    request_counter: u64,
}

/// Drives at-most-one-in-flight analysis calls against the snapshot.
pub struct AnalysisOrchestrator<C> {
    client: C,
    shared: Arc<SharedState>,
    events: EventBus,
    cooldown: Duration,
    skip_when_normal: bool,
    max_image_side: u32,
    jpeg_quality: u8,
    inner: Mutex<OrchestratorInner>,
}

/// Clears the in-progress flag when the analysis task finishes, on every
/// exit path including panics and cancellation.
struct ClearInProgress<'a, C> {
    orchestrator: &'a AnalysisOrchestrator<C>,
}

impl<C> Drop for ClearInProgress<'_, C> {
    fn drop(&mut self) {
        self.orchestrator.lock_inner().in_progress = false;
    }
}

impl<C> AnalysisOrchestrator<C> {
    fn lock_inner(&self) -> MutexGuard<'_, OrchestratorInner> {
        // A poisoned lock only means a panicked analysis task; the state
        // itself stays valid
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether an analysis task is currently outstanding.
    pub fn in_progress(&self) -> bool {
        self.lock_inner().in_progress
    }

    /// Id of the most recently admitted request.
    pub fn last_request_id(&self) -> u64 {
        self.lock_inner().request_counter
    }
}

impl<C: AnalysisClient> AnalysisOrchestrator<C> {
    pub fn new(
        client: C,
        shared: Arc<SharedState>,
        events: EventBus,
        config: &NodeConfig,
    ) -> Self {
        Self {
            client,
            shared,
            events,
            cooldown: config.fusion.analysis_cooldown(),
            skip_when_normal: config.fusion.skip_analysis_when_normal,
            max_image_side: config.analysis.max_image_side,
            jpeg_quality: config.analysis.jpeg_quality,
            inner: Mutex::new(OrchestratorInner::default()),
        }
    }

    /// Request an analysis run.
    ///
    /// Returns `false` when rejected (one already in flight, or an automatic
    /// trigger inside the cooldown window) — an expected outcome, not an
    /// error. On acceptance the actual call runs on a spawned task and this
    /// method returns `true` immediately.
    pub async fn trigger(self: Arc<Self>, reason: TriggerReason) -> bool {
        let request_id = {
            let mut inner = self.lock_inner();
            if inner.in_progress {
                debug!(%reason, "Analysis trigger rejected: already in progress");
                return false;
            }
            if matches!(reason, TriggerReason::Auto(_)) {
                if let Some(last) = inner.last_trigger_at {
                    if last.elapsed() < self.cooldown {
                        debug!(%reason, "Analysis trigger suppressed by cooldown");
                        return false;
                    }
                }
            }
            inner.in_progress = true;
            inner.request_counter += 1;
            inner.last_trigger_at = Some(Instant::now());
            inner.request_counter
        };

        info!(%reason, request_id, "Analysis triggered");
        self.shared
            .begin_analysis(request_id, reason.to_string())
            .await;
        self.events.emit_lossy(NodeEvent::AnalysisStarted {
            request_id,
            trigger: reason.to_string(),
            timestamp: Utc::now(),
        });

        tokio::spawn(async move {
            self.run_analysis(request_id).await;
        });
        true
    }

    async fn run_analysis(&self, request_id: u64) {
        let _clear = ClearInProgress { orchestrator: self };
        match self.perform().await {
            Ok(report) => {
                info!(request_id, risk = %report.risk_level, "Analysis completed");
                let risk_level = report.risk_level;
                self.shared.complete_analysis(request_id, Ok(report)).await;
                self.events.emit_lossy(NodeEvent::AnalysisCompleted {
                    request_id,
                    risk_level,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => {
                let error = e.to_string();
                warn!(request_id, %error, "Analysis failed");
                self.shared
                    .complete_analysis(request_id, Err(error.clone()))
                    .await;
                self.events.emit_lossy(NodeEvent::AnalysisFailed {
                    request_id,
                    error,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// The analysis body. Reads the snapshot briefly, then runs the network
    /// call with no lock held.
    async fn perform(&self) -> Result<AnalysisReport, AnalysisError> {
        let (reading, risk, frame) = self.shared.analysis_context().await;

        if self.skip_when_normal && risk == RiskLevel::Normal {
            debug!("Risk is Normal, answering with canned report");
            return Ok(normal_report());
        }

        let image = frame
            .as_deref()
            .and_then(|f| encode_frame(f, self.max_image_side, self.jpeg_quality));
        let prompt = build_prompt(&reading, image.is_some());
        let raw = self.client.complete(&prompt, image).await?;
        Ok(normalize_response(&raw, risk))
    }
}
