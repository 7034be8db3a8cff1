//! fwn-node library interface
//!
//! Exposes the engine, orchestrator, and router for integration testing.

pub mod analysis;
pub mod api;
pub mod error;
pub mod fusion;
pub mod hardware;
pub mod state;
pub mod vision;

pub use crate::api::{build_router, AppState};
pub use crate::error::{ApiError, ApiResult};
