//! REST API for the monitoring node
//!
//! Thin pass-throughs over the shared snapshot and the orchestrator; no
//! handler ever blocks on the network or on an analysis in flight.

pub mod handlers;

use crate::analysis::{AnalysisClient, AnalysisOrchestrator};
use crate::state::SharedState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
pub struct AppState<C> {
    pub shared: Arc<SharedState>,
    pub orchestrator: Arc<AnalysisOrchestrator<C>>,
}

impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            orchestrator: Arc::clone(&self.orchestrator),
        }
    }
}

/// Build the application router
pub fn build_router<C: AnalysisClient>(state: AppState<C>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::status::<C>))
        .route("/api/analyze", post(handlers::analyze::<C>))
        .route("/api/frame", get(handlers::frame::<C>))
        .route("/api/events", get(handlers::event_stream::<C>))
        .route("/video_feed", get(handlers::video_feed::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
