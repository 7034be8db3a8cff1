//! Event types for the FireWatch node
//!
//! Provides the shared `NodeEvent` definitions and the `EventBus` used to
//! fan them out to SSE subscribers and internal listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::RiskLevel;

/// FireWatch node event types
///
/// Events are broadcast via [`EventBus`] and can be serialized for SSE
/// transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeEvent {
    /// The rule engine's risk level changed
    RiskLevelChanged {
        old_level: RiskLevel,
        new_level: RiskLevel,
        timestamp: DateTime<Utc>,
    },

    /// A detector pass completed and replaced the detection list
    DetectionsUpdated {
        /// Number of surviving detections after suppression
        count: usize,
        /// Whether any detection carries a configured fire label
        fire_detected: bool,
        timestamp: DateTime<Utc>,
    },

    /// An analysis request was admitted and handed off
    AnalysisStarted {
        request_id: u64,
        /// Trigger tag ("manual" or "auto:<risk>")
        trigger: String,
        timestamp: DateTime<Utc>,
    },

    /// An analysis task completed and its report landed in the snapshot
    AnalysisCompleted {
        request_id: u64,
        risk_level: RiskLevel,
        timestamp: DateTime<Utc>,
    },

    /// An analysis task failed; the error string landed in the snapshot
    AnalysisFailed {
        request_id: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl NodeEvent {
    /// Event name for SSE `event:` fields and logging.
    pub fn name(&self) -> &'static str {
        match self {
            NodeEvent::RiskLevelChanged { .. } => "risk_level_changed",
            NodeEvent::DetectionsUpdated { .. } => "detections_updated",
            NodeEvent::AnalysisStarted { .. } => "analysis_started",
            NodeEvent::AnalysisCompleted { .. } => "analysis_completed",
            NodeEvent::AnalysisFailed { .. } => "analysis_failed",
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NodeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Channel capacity this bus was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the no-subscribers case.
    ///
    /// Having nobody listening is normal during startup and tests.
    pub fn emit_lossy(&self, event: NodeEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
