//! Hardware access seams
//!
//! The fusion engine never touches GPIO or video devices directly; it reads
//! through these traits. Real deployments plug in device-backed sources,
//! development and tests use the simulated ones.

mod camera;
mod sensors;

pub use camera::{FrameSource, NoCamera, SimulatedCamera};
pub use sensors::{SensorSource, SimulatedSensors};
