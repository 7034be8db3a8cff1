//! # FireWatch Node Common Library
//!
//! Shared code for the FireWatch monitoring node including:
//! - Risk model types (RiskLevel, SensorReading, Detection)
//! - Analysis report schema
//! - Event types (NodeEvent enum) and EventBus
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use types::{AnalysisReport, Detection, RiskLevel, SensorReading, StatusSnapshot, TriggerReason};
