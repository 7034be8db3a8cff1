//! Camera frame sources

use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicU64, Ordering};

/// Camera contract consumed by the fusion engine.
///
/// `capture` may block briefly on device I/O; it returns `None` when no
/// device is present or the grab failed.
pub trait FrameSource: Send + Sync {
    fn capture(&self) -> Option<RgbImage>;
}

/// Source for nodes without any camera attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

impl FrameSource for NoCamera {
    fn capture(&self) -> Option<RgbImage> {
        None
    }
}

/// Synthetic camera producing a slowly shifting gradient pattern, so the
/// video feed and detector plumbing can be exercised without hardware.
#[derive(Debug)]
pub struct SimulatedCamera {
    width: u32,
    height: u32,
    ticks: AtomicU64,
}

impl SimulatedCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ticks: AtomicU64::new(0),
        }
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl FrameSource for SimulatedCamera {
    fn capture(&self) -> Option<RgbImage> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        let shift = (tick % 256) as u32;
        Some(RgbImage::from_fn(self.width, self.height, |x, y| {
            let r = ((x + shift) % 256) as u8;
            let g = ((y + shift) % 256) as u8;
            let b = ((x + y) % 256) as u8;
            Rgb([r, g, b])
        }))
    }
}
