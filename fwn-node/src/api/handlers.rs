//! HTTP request handlers

use crate::analysis::AnalysisClient;
use crate::api::AppState;
use crate::error::{ApiError, ApiResult};
use crate::vision::{draw_detections, encode_jpeg, placeholder_frame};
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures::Stream;
use fwn_common::{StatusSnapshot, TriggerReason};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// JPEG quality of the streamed video feed; low to keep bandwidth down
const FEED_JPEG_QUALITY: u8 = 50;
const FEED_FRAME_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    started: bool,
    state: StatusSnapshot,
}

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "monitoring_node".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/status - Current fused system state
pub async fn status<C: AnalysisClient>(State(state): State<AppState<C>>) -> impl IntoResponse {
    let snapshot = state.shared.status().await;
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(snapshot),
    )
}

/// POST /api/analyze - Manual analysis trigger
///
/// Returns immediately; `started` is false when a run is already in flight.
pub async fn analyze<C: AnalysisClient>(State(state): State<AppState<C>>) -> impl IntoResponse {
    let started = state.orchestrator.clone().trigger(TriggerReason::Manual).await;
    let snapshot = state.shared.status().await;
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(AnalyzeResponse {
            started,
            state: snapshot,
        }),
    )
}

/// GET /api/frame - Still of the latest frame with detection overlays
pub async fn frame<C: AnalysisClient>(
    State(state): State<AppState<C>>,
) -> ApiResult<impl IntoResponse> {
    let frame = state
        .shared
        .frame()
        .await
        .ok_or_else(|| ApiError::NotFound("no camera frame available".to_string()))?;
    let detections = state.shared.detections().await;
    let annotated = draw_detections(&frame, &detections);
    let jpeg = encode_jpeg(&annotated, FEED_JPEG_QUALITY)
        .map_err(|e| ApiError::Internal(format!("frame encoding failed: {e}")))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg))
}

/// GET /api/events - SSE stream of node events
pub async fn event_stream<C: AnalysisClient>(
    State(state): State<AppState<C>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.shared.events().subscribe();
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(sse) = Event::default().event(event.name()).json_data(&event) {
                        yield Ok(sse);
                    }
                }
                // A slow client missed events; keep streaming the fresh ones
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /video_feed - MJPEG stream of the latest frame with overlays
///
/// Streams a black placeholder while no camera signal is available.
pub async fn video_feed<C: AnalysisClient>(
    State(state): State<AppState<C>>,
) -> impl IntoResponse {
    let shared = state.shared.clone();
    let stream = async_stream::stream! {
        let mut ticker = tokio::time::interval(FEED_FRAME_INTERVAL);
        loop {
            ticker.tick().await;
            let image = match shared.frame().await {
                Some(frame) => {
                    let detections = shared.detections().await;
                    draw_detections(&frame, &detections)
                }
                None => placeholder_frame(640, 480),
            };
            let Ok(jpeg) = encode_jpeg(&image, FEED_JPEG_QUALITY) else {
                continue;
            };
            let mut chunk = Vec::with_capacity(jpeg.len() + 64);
            chunk.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
            chunk.extend_from_slice(&jpeg);
            chunk.extend_from_slice(b"\r\n");
            yield Ok::<_, Infallible>(chunk);
        }
    };
    (
        [(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )],
        Body::from_stream(stream),
    )
}
