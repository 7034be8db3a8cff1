//! External analysis integration
//!
//! Builds multimodal prompts from the current snapshot, calls an
//! OpenAI-compatible completion endpoint, and normalizes whatever comes back
//! into the fixed report schema. All of it runs off the sampling loop, one
//! request at a time.

mod client;
mod orchestrator;
mod report;

pub use client::{AnalysisClient, AnalysisError, LlmClient};
pub use orchestrator::AnalysisOrchestrator;
pub use report::{normal_report, normalize_response};

use crate::vision::encode_jpeg;
use fwn_common::SensorReading;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::warn;

/// Downscale a frame so its longest side fits `max_side`, then JPEG-encode
/// it for transmission. Returns `None` when encoding fails; the analysis
/// then proceeds text-only.
pub(crate) fn encode_frame(frame: &RgbImage, max_side: u32, quality: u8) -> Option<Vec<u8>> {
    let (w, h) = frame.dimensions();
    let longest = w.max(h);
    let encoded = if longest > max_side {
        let scale = max_side as f32 / longest as f32;
        let nw = ((w as f32 * scale) as u32).max(1);
        let nh = ((h as f32 * scale) as u32).max(1);
        let resized = imageops::resize(frame, nw, nh, FilterType::Triangle);
        encode_jpeg(&resized, quality)
    } else {
        encode_jpeg(frame, quality)
    };
    match encoded {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Frame encoding for analysis failed: {e}");
            None
        }
    }
}

/// Build the analysis prompt from the sensor readings.
///
/// The model is asked for the exact JSON schema the normalizer expects;
/// anything else is handled by the fallback parsing.
pub(crate) fn build_prompt(reading: &SensorReading, with_image: bool) -> String {
    let temperature = reading
        .temperature
        .map(|v| format!("{v:.1} °C"))
        .unwrap_or_else(|| "unavailable".to_string());
    let humidity = reading
        .humidity
        .map(|v| format!("{v:.1} %"))
        .unwrap_or_else(|| "unavailable".to_string());
    let smoke = match reading.smoke_digital {
        Some(true) => "smoke detected",
        Some(false) => "normal",
        None => "unavailable",
    };
    let analog = reading
        .smoke_analog
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unavailable".to_string());

    let image_task = if with_image {
        "\n3. Check the attached image for flames, dense smoke, or heat distortion."
    } else {
        ""
    };

    format!(
        "You are a home fire safety expert. Judge the fire risk from the data below.\n\
         \n\
         Sensor data:\n\
         - Temperature: {temperature}\n\
         - Humidity: {humidity}\n\
         - Smoke sensor (digital): {smoke}\n\
         - Smoke-gas level (analog): {analog}\n\
         \n\
         Tasks:\n\
         1. Assess whether the sensor data is abnormal.\n\
         2. Give an overall fire-risk verdict.{image_task}\n\
         \n\
         Reply with a single JSON object with exactly these fields:\n\
         risk_level (one of \"Normal\", \"Warning\", \"Danger\"),\n\
         description (string), suggestion (string)."
    )
}
