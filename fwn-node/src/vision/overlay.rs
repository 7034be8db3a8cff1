//! Detection overlays and frame encoding for the video feed
//!
//! Frames shared through the snapshot are read-only by policy, so drawing
//! always happens on a copy.

use fwn_common::Detection;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

const FIRE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const SMOKE_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
const OTHER_COLOR: Rgb<u8> = Rgb([0, 128, 255]);
const BORDER: i32 = 2;
const MAX_DRAWN: usize = 20;

fn class_color(label: &str) -> Rgb<u8> {
    match label.to_ascii_lowercase().as_str() {
        "fire" | "flame" => FIRE_COLOR,
        "smoke" => SMOKE_COLOR,
        _ => OTHER_COLOR,
    }
}

/// Copy the frame and draw class-colored rectangles around each detection.
pub fn draw_detections(frame: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = frame.clone();
    let (w, h) = canvas.dimensions();
    for det in detections.iter().take(MAX_DRAWN) {
        let color = class_color(&det.label);
        for t in 0..BORDER {
            draw_rect(
                &mut canvas,
                det.x1 + t,
                det.y1 + t,
                det.x2 - t,
                det.y2 - t,
                color,
                w,
                h,
            );
        }
    }
    canvas
}

#[allow(clippy::too_many_arguments)]
fn draw_rect(canvas: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, color: Rgb<u8>, w: u32, h: u32) {
    if x2 <= x1 || y2 <= y1 {
        return;
    }
    let in_bounds = |x: i32, y: i32| x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h;
    for x in x1..=x2 {
        if in_bounds(x, y1) {
            canvas.put_pixel(x as u32, y1 as u32, color);
        }
        if in_bounds(x, y2) {
            canvas.put_pixel(x as u32, y2 as u32, color);
        }
    }
    for y in y1..=y2 {
        if in_bounds(x1, y) {
            canvas.put_pixel(x1 as u32, y as u32, color);
        }
        if in_bounds(x2, y) {
            canvas.put_pixel(x2 as u32, y as u32, color);
        }
    }
}

/// Black frame streamed when no camera signal is available.
pub fn placeholder_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::new(width, height)
}

/// Encode a frame as JPEG at the given quality.
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(frame)?;
    Ok(buf)
}
