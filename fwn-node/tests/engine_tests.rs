//! Fusion engine end-to-end tests
//!
//! Scripted sensor and frame sources drive the full loop: sampling,
//! detection, classification, escalation, and the all-clear transition.

mod helpers;

use fwn_common::{RiskLevel, SensorReading};
use fwn_node::analysis::AnalysisOrchestrator;
use fwn_node::fusion::{FusionEngine, ALL_CLEAR_TEXT};
use fwn_node::hardware::{FrameSource, NoCamera, SensorSource, SimulatedCamera};
use fwn_node::state::SharedState;
use fwn_node::vision::{InferenceBackend, VisionDetector, VisionError};
use helpers::{test_config, wait_until, warning_json, MockClient};
use ndarray::{Array2, ArrayView3};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sensor source whose readings tests can flip at runtime.
#[derive(Clone)]
struct ScriptedSensors {
    reading: Arc<Mutex<SensorReading>>,
}

impl ScriptedSensors {
    fn new(reading: SensorReading) -> Self {
        Self {
            reading: Arc::new(Mutex::new(reading)),
        }
    }

    fn set(&self, reading: SensorReading) {
        *self.reading.lock().unwrap() = reading;
    }
}

impl SensorSource for ScriptedSensors {
    fn read_environment(&self) -> (Option<f32>, Option<f32>) {
        let reading = self.reading.lock().unwrap();
        (reading.temperature, reading.humidity)
    }

    fn read_smoke_digital(&self) -> Option<bool> {
        self.reading.lock().unwrap().smoke_digital
    }

    fn read_smoke_analog(&self) -> Option<u16> {
        self.reading.lock().unwrap().smoke_analog
    }
}

/// Backend that always reports one fire box.
struct FireBackend;

impl InferenceBackend for FireBackend {
    fn infer(&self, _input: ArrayView3<'_, f32>) -> Result<Array2<f32>, VisionError> {
        let mut out = Array2::<f32>::zeros((8, 6));
        out[[0, 0]] = 0.5;
        out[[0, 1]] = 0.5;
        out[[0, 2]] = 0.4;
        out[[0, 3]] = 0.4;
        out[[0, 4]] = 0.92;
        out[[0, 5]] = 0.0; // class 0 = fire
        Ok(out)
    }
}

fn hot_reading() -> SensorReading {
    SensorReading {
        temperature: Some(80.0),
        humidity: Some(40.0),
        smoke_digital: Some(false),
        smoke_analog: Some(0),
    }
}

fn calm_reading() -> SensorReading {
    SensorReading {
        temperature: Some(25.0),
        humidity: Some(50.0),
        smoke_digital: Some(false),
        smoke_analog: Some(0),
    }
}

fn build_engine<S, F>(
    sensors: S,
    camera: F,
    detector: VisionDetector,
    client: MockClient,
    config: &fwn_common::config::NodeConfig,
) -> (
    FusionEngine<S, F, MockClient>,
    Arc<SharedState>,
    Arc<AnalysisOrchestrator<MockClient>>,
)
where
    S: SensorSource + 'static,
    F: FrameSource + 'static,
{
    let events = fwn_common::events::EventBus::new(32);
    let shared = Arc::new(SharedState::new(events.clone()));
    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        client,
        Arc::clone(&shared),
        events,
        config,
    ));
    let engine = FusionEngine::new(
        sensors,
        camera,
        detector,
        Arc::clone(&orchestrator),
        Arc::clone(&shared),
        config,
    );
    (engine, shared, orchestrator)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn high_temperature_escalates_to_warning_and_analysis() {
    let config = test_config(0, false);
    let sensors = ScriptedSensors::new(hot_reading());
    let client = MockClient::ok(Duration::from_millis(10), &warning_json());
    let detector = VisionDetector::new(&config.vision, None);
    let (engine, shared, _orchestrator) =
        build_engine(sensors, NoCamera, detector, client, &config);
    let handle = engine.start();

    // Risk escalates and the auto-triggered analysis eventually lands
    assert!(
        wait_until(Duration::from_secs(3), || {
            let s = shared.clone();
            async move {
                let status = s.status().await;
                status.risk_level == RiskLevel::Warning
                    && status.analysis.is_some()
                    && !status.analysis_in_progress
            }
        })
        .await,
        "warning + analysis never materialized"
    );

    let status = shared.status().await;
    assert_eq!(status.temperature, Some(80.0));
    assert_eq!(status.humidity, Some(40.0));
    assert_eq!(
        status.last_analysis_trigger.as_deref(),
        Some("auto:Warning")
    );
    assert!(status.last_request_id >= 1);

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn returning_to_normal_writes_all_clear() {
    // Long cooldown: exactly one analysis runs, so nothing is in flight
    // when the readings drop back to normal
    let config = test_config(60, false);
    let sensors = ScriptedSensors::new(hot_reading());
    let client = MockClient::ok(Duration::from_millis(5), &warning_json());
    let detector = VisionDetector::new(&config.vision, None);
    let (engine, shared, _orchestrator) =
        build_engine(sensors.clone(), NoCamera, detector, client, &config);
    let handle = engine.start();

    assert!(
        wait_until(Duration::from_secs(3), || {
            let s = shared.clone();
            async move { s.status().await.risk_level == RiskLevel::Warning }
        })
        .await
    );

    sensors.set(calm_reading());

    assert!(
        wait_until(Duration::from_secs(3), || {
            let s = shared.clone();
            async move {
                let status = s.status().await;
                status.risk_level == RiskLevel::Normal && status.analysis_text == ALL_CLEAR_TEXT
            }
        })
        .await,
        "all-clear transition never happened"
    );
    assert!(shared.status().await.analysis.is_none());

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn vision_fire_detection_escalates_to_danger() {
    let config = test_config(0, false);
    let sensors = ScriptedSensors::new(calm_reading());
    let client = MockClient::ok(Duration::from_millis(5), &warning_json());
    let detector = VisionDetector::new(&config.vision, Some(Box::new(FireBackend)));
    let camera = SimulatedCamera::new(64, 48);
    let (engine, shared, _orchestrator) = build_engine(sensors, camera, detector, client, &config);
    let handle = engine.start();

    assert!(
        wait_until(Duration::from_secs(3), || {
            let s = shared.clone();
            async move {
                let status = s.status().await;
                status.risk_level == RiskLevel::Danger && !status.detections.is_empty()
            }
        })
        .await,
        "vision fire never escalated"
    );

    let status = shared.status().await;
    assert_eq!(status.detections[0].label, "fire");
    assert_eq!(status.last_analysis_trigger.as_deref(), Some("auto:Danger"));

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loop_survives_fully_absent_inputs() {
    let config = test_config(0, true);
    let sensors = ScriptedSensors::new(SensorReading::default());
    let client = MockClient::ok(Duration::from_millis(5), &warning_json());
    let detector = VisionDetector::new(&config.vision, None);
    let (engine, shared, _orchestrator) =
        build_engine(sensors, NoCamera, detector, client, &config);
    let handle = engine.start();

    // Several ticks with nothing readable; the loop keeps running and the
    // snapshot stays consistent
    tokio::time::sleep(Duration::from_millis(150)).await;
    let status = shared.status().await;
    assert_eq!(status.risk_level, RiskLevel::Normal);
    assert!(status.temperature.is_none());
    assert!(!status.analysis_in_progress);

    handle.stop().await;
}
