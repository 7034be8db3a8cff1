//! On-device object detection
//!
//! The detector decodes one raw output tensor from an exported
//! single-stage detector into calibrated, de-duplicated detections. The
//! inference runtime itself sits behind [`InferenceBackend`]; only the
//! decoding conventions are guaranteed here.

mod detector;
mod overlay;

pub use detector::{InferenceBackend, VisionDetector, VisionError};
pub use overlay::{draw_detections, encode_jpeg, placeholder_frame};
