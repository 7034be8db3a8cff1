//! Shared test fixtures
#![allow(dead_code)]

use fwn_common::config::NodeConfig;
use fwn_common::events::EventBus;
use fwn_node::analysis::{AnalysisClient, AnalysisError, AnalysisOrchestrator};
use fwn_node::state::SharedState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the mock service answers with.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Ok(String),
    Timeout,
}

/// Scripted analysis service: waits `delay`, then answers with `response`.
/// Counts calls so tests can assert admission control and skip policies.
pub struct MockClient {
    pub delay: Duration,
    pub response: MockResponse,
    pub calls: Arc<AtomicUsize>,
}

impl MockClient {
    pub fn ok(delay: Duration, body: &str) -> Self {
        Self {
            delay,
            response: MockResponse::Ok(body.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(delay: Duration) -> Self {
        Self {
            delay,
            response: MockResponse::Timeout,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl AnalysisClient for MockClient {
    async fn complete(
        &self,
        _prompt: &str,
        _image_jpeg: Option<Vec<u8>>,
    ) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match &self.response {
            MockResponse::Ok(body) => Ok(body.clone()),
            MockResponse::Timeout => Err(AnalysisError::Timeout),
        }
    }
}

/// Config tuned for fast tests.
pub fn test_config(cooldown_secs: u64, skip_when_normal: bool) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.fusion.sample_interval_ms = 20;
    config.vision.detect_interval_ms = 10;
    config.fusion.analysis_cooldown_secs = cooldown_secs;
    config.fusion.skip_analysis_when_normal = skip_when_normal;
    config
}

/// Fresh shared state + orchestrator around the given mock.
pub fn orchestrator_with(
    client: MockClient,
    config: &NodeConfig,
) -> (Arc<AnalysisOrchestrator<MockClient>>, Arc<SharedState>) {
    let events = EventBus::new(32);
    let shared = Arc::new(SharedState::new(events.clone()));
    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        client,
        Arc::clone(&shared),
        events,
        config,
    ));
    (orchestrator, shared)
}

/// Poll `predicate` until it holds or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A well-formed service response at Warning level.
pub fn warning_json() -> String {
    r#"{"risk_level":"Warning","description":"elevated temperature","suggestion":"ventilate the room"}"#
        .to_string()
}
