//! Environmental sensor sources
//!
//! Readings are `Option`-typed throughout: a `None` means the read failed or
//! the sensor is absent, and callers must treat it as "unavailable" rather
//! than zero/false. DHT-class sensors in particular fail individual reads
//! routinely when polled fast; that is expected, not an error.

use fwn_common::SensorReading;
use rand::Rng;

/// Environmental sensor contract consumed by the fusion engine.
///
/// Reads may block briefly on hardware I/O; they must never panic.
pub trait SensorSource: Send + Sync {
    /// Temperature (°C) and humidity (%) from the climate sensor.
    fn read_environment(&self) -> (Option<f32>, Option<f32>);

    /// Digital smoke flag from the gas sensor comparator output.
    fn read_smoke_digital(&self) -> Option<bool>;

    /// Analog smoke-gas level in ADC counts. `None` when no ADC is wired,
    /// so a measured 0 stays distinguishable from "unavailable".
    fn read_smoke_analog(&self) -> Option<u16>;

    /// Convenience: one full reading.
    fn read_all(&self) -> SensorReading {
        let (temperature, humidity) = self.read_environment();
        SensorReading {
            temperature,
            humidity,
            smoke_digital: self.read_smoke_digital(),
            smoke_analog: self.read_smoke_analog(),
        }
    }
}

/// Simulated sensor bank for development machines without the real hardware.
///
/// Value ranges mirror the bench behavior of the physical setup: room-to-hot
/// temperatures, moderate humidity, rare smoke events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedSensors;

impl SimulatedSensors {
    pub fn new() -> Self {
        Self
    }
}

impl SensorSource for SimulatedSensors {
    fn read_environment(&self) -> (Option<f32>, Option<f32>) {
        let mut rng = rand::thread_rng();
        let temperature = (rng.gen_range(20.0_f32..60.0) * 10.0).round() / 10.0;
        let humidity = (rng.gen_range(30.0_f32..70.0) * 10.0).round() / 10.0;
        (Some(temperature), Some(humidity))
    }

    fn read_smoke_digital(&self) -> Option<bool> {
        Some(rand::thread_rng().gen_bool(0.01))
    }

    fn read_smoke_analog(&self) -> Option<u16> {
        Some(rand::thread_rng().gen_range(40..240))
    }
}
