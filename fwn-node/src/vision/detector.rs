//! Detector output decoding
//!
//! Exported detector models disagree on output conventions: tensor
//! orientation, presence of an objectness column, score scale, and
//! coordinate units all vary by exporter. This module pins down one
//! deterministic decoding of those conventions; given the same tensor it
//! always produces the same boxes.

use fwn_common::config::VisionConfig;
use fwn_common::Detection;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{Array2, Array3, ArrayView3};
use thiserror::Error;
use tracing::warn;

/// Vision pipeline errors
#[derive(Debug, Error)]
pub enum VisionError {
    /// Output tensor shape cannot be interpreted as (boxes, features)
    #[error("ambiguous detector output shape {rows}x{cols}")]
    AmbiguousOutput { rows: usize, cols: usize },

    /// Inference runtime failure
    #[error("inference backend error: {0}")]
    Backend(String),
}

/// Inference runtime seam.
///
/// Takes a normalized CHW tensor of shape (3, input, input) and returns the
/// model's single 2-D output tensor, in whichever orientation the exporter
/// chose.
pub trait InferenceBackend: Send + Sync {
    fn infer(&self, input: ArrayView3<'_, f32>) -> Result<Array2<f32>, VisionError>;
}

/// Candidate box in corner form, pre-suppression.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    bbox: [i32; 4],
    confidence: f32,
    class_id: usize,
}

/// Decodes raw detector output into calibrated detections.
pub struct VisionDetector {
    backend: Option<Box<dyn InferenceBackend>>,
    class_names: Vec<String>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl VisionDetector {
    pub fn new(config: &VisionConfig, backend: Option<Box<dyn InferenceBackend>>) -> Self {
        Self {
            backend,
            class_names: config.class_names.clone(),
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
        }
    }

    /// Whether an inference backend is loaded.
    pub fn is_ready(&self) -> bool {
        self.backend.is_some()
    }

    /// Run one detector pass.
    ///
    /// `None` means the detector is unavailable (no backend) or the pass
    /// failed; the caller keeps its previous detection list. `Some(vec![])`
    /// means the detector ran and found nothing.
    pub fn detect(&self, frame: &RgbImage) -> Option<Vec<Detection>> {
        let backend = self.backend.as_ref()?;
        let (frame_w, frame_h) = frame.dimensions();
        let input = frame_to_input(frame, self.input_size);
        match backend.infer(input.view()) {
            Ok(output) => Some(self.decode_output(&output, frame_w, frame_h)),
            Err(e) => {
                warn!("Detector pass failed: {e}");
                None
            }
        }
    }

    /// Decode one raw output tensor against a frame of the given size.
    pub fn decode_output(&self, output: &Array2<f32>, frame_w: u32, frame_h: u32) -> Vec<Detection> {
        let (rows, cols) = output.dim();
        // Orientation is not guaranteed: (features, boxes) outputs have far
        // fewer rows than columns. Normalize so rows index candidate boxes.
        let data = if rows < cols {
            output.t().to_owned()
        } else {
            output.clone()
        };

        let num_cols = data.ncols();
        if num_cols < 6 {
            return Vec::new();
        }

        let class_count = self.class_names.len().max(1);
        let has_objectness = num_cols - 5 == class_count;

        let frame_wf = frame_w as f32;
        let frame_hf = frame_h as f32;
        let input_f = self.input_size as f32;

        let mut candidates = Vec::new();
        for row in data.rows() {
            let (cx_raw, cy_raw, w_raw, h_raw) = (row[0], row[1], row[2], row[3]);

            let (class_id, mut confidence) = if num_cols == 6 {
                (row[5].max(0.0) as usize, row[4])
            } else if has_objectness {
                let objectness = row[4];
                let (class_id, score) = argmax(row.iter().skip(5).copied());
                (class_id, objectness * score)
            } else {
                let (class_id, score) = argmax(row.iter().skip(4).copied());
                (class_id, score)
            };

            // Some exporters emit percentages
            if confidence > 1.0 && confidence <= 100.0 {
                confidence /= 100.0;
            }

            if confidence < self.confidence_threshold {
                continue;
            }

            // Coordinate units are exporter-dependent; decide by magnitude:
            // fractional, model-input pixels, or already frame pixels.
            let magnitude = cx_raw
                .abs()
                .max(cy_raw.abs())
                .max(w_raw.abs())
                .max(h_raw.abs());
            let (cx, cy, w, h) = if magnitude <= 1.5 {
                (
                    cx_raw * frame_wf,
                    cy_raw * frame_hf,
                    w_raw * frame_wf,
                    h_raw * frame_hf,
                )
            } else if magnitude <= input_f * 1.5 {
                (
                    cx_raw * (frame_wf / input_f),
                    cy_raw * (frame_hf / input_f),
                    w_raw * (frame_wf / input_f),
                    h_raw * (frame_hf / input_f),
                )
            } else {
                (cx_raw, cy_raw, w_raw, h_raw)
            };

            let x1 = ((cx - w / 2.0) as i32).clamp(0, frame_w as i32 - 1);
            let y1 = ((cy - h / 2.0) as i32).clamp(0, frame_h as i32 - 1);
            let x2 = ((cx + w / 2.0) as i32).clamp(0, frame_w as i32 - 1);
            let y2 = ((cy + h / 2.0) as i32).clamp(0, frame_h as i32 - 1);

            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            candidates.push(Candidate {
                bbox: [x1, y1, x2, y2],
                confidence,
                class_id,
            });
        }

        nms(candidates, self.iou_threshold)
            .into_iter()
            .map(|c| Detection {
                class_id: c.class_id,
                label: self
                    .class_names
                    .get(c.class_id)
                    .cloned()
                    .unwrap_or_else(|| c.class_id.to_string()),
                confidence: c.confidence,
                x1: c.bbox[0],
                y1: c.bbox[1],
                x2: c.bbox[2],
                y2: c.bbox[3],
            })
            .collect()
    }
}

/// Arg-max over class scores. Empty input maps to (0, 0.0), which then fails
/// the confidence threshold.
fn argmax(scores: impl Iterator<Item = f32>) -> (usize, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    let mut any = false;
    for (i, score) in scores.enumerate() {
        any = true;
        if score > best.1 {
            best = (i, score);
        }
    }
    if any {
        best
    } else {
        (0, 0.0)
    }
}

/// Intersection-over-Union of two axis-aligned corner boxes; 0 when disjoint.
fn iou(a: &[i32; 4], b: &[i32; 4]) -> f32 {
    let inter_x1 = a[0].max(b[0]);
    let inter_y1 = a[1].max(b[1]);
    let inter_x2 = a[2].min(b[2]);
    let inter_y2 = a[3].min(b[3]);
    let iw = (inter_x2 - inter_x1).max(0) as f32;
    let ih = (inter_y2 - inter_y1).max(0) as f32;
    let inter = iw * ih;
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = ((a[2] - a[0]).max(0) * (a[3] - a[1]).max(0)) as f32;
    let area_b = ((b[2] - b[0]).max(0) * (b[3] - b[1]).max(0)) as f32;
    let union = area_a + area_b - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Greedy non-max suppression: keep the highest-scoring remaining candidate,
/// drop everything overlapping it at or above the threshold, repeat.
fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut kept: Vec<Candidate> = Vec::new();
    'outer: for candidate in candidates {
        for keeper in &kept {
            if iou(&keeper.bbox, &candidate.bbox) >= iou_threshold {
                continue 'outer;
            }
        }
        kept.push(candidate);
    }
    kept
}

/// Resize the frame to the model's square input and normalize RGB bytes into
/// a CHW tensor in [0, 1].
fn frame_to_input(frame: &RgbImage, input_size: u32) -> Array3<f32> {
    let resized = imageops::resize(frame, input_size, input_size, FilterType::Triangle);
    let size = input_size as usize;
    Array3::from_shape_fn((3, size, size), |(c, y, x)| {
        resized.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(class_names: &[&str]) -> VisionDetector {
        let config = VisionConfig {
            class_names: class_names.iter().map(|s| s.to_string()).collect(),
            ..VisionConfig::default()
        };
        VisionDetector::new(&config, None)
    }

    // --- IoU ---

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou(&[0, 0, 10, 10], &[20, 20, 30, 30]), 0.0);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [5, 5, 50, 50];
        assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_half_overlapping_boxes() {
        // 10x10 boxes shifted by 5 in x: inter 5*10=50, union 150
        let got = iou(&[0, 0, 10, 10], &[5, 0, 15, 10]);
        assert!((got - 50.0 / 150.0).abs() < 1e-6);
    }

    // --- NMS ---

    fn cand(bbox: [i32; 4], confidence: f32) -> Candidate {
        Candidate {
            bbox,
            confidence,
            class_id: 0,
        }
    }

    #[test]
    fn nms_keeps_higher_confidence_of_overlapping_pair() {
        let kept = nms(
            vec![cand([0, 0, 10, 10], 0.6), cand([1, 0, 11, 10], 0.9)],
            0.45,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_both_below_threshold() {
        let kept = nms(
            vec![cand([0, 0, 10, 10], 0.6), cand([8, 8, 20, 20], 0.9)],
            0.45,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn nms_is_idempotent() {
        let input = vec![
            cand([0, 0, 10, 10], 0.9),
            cand([1, 1, 11, 11], 0.8),
            cand([50, 50, 70, 70], 0.7),
            cand([52, 50, 72, 70], 0.6),
        ];
        let once = nms(input, 0.45);
        let twice = nms(once.clone(), 0.45);
        assert_eq!(once, twice);
    }

    // --- Decoding ---

    /// Build an output tensor with rows indexing boxes, zero-padded so the
    /// orientation heuristic keeps it un-transposed (real outputs always
    /// have far more boxes than features). Zero rows fail the confidence
    /// threshold and decode to nothing.
    fn tensor(rows: &[&[f32]]) -> Array2<f32> {
        let cols = rows[0].len();
        let padded_rows = rows.len().max(cols + 1);
        let mut out = Array2::<f32>::zeros((padded_rows, cols));
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                out[[i, j]] = *v;
            }
        }
        out
    }

    #[test]
    fn rejects_outputs_with_fewer_than_six_columns() {
        let det = detector(&["fire"]);
        let out = tensor(&[&[0.5, 0.5, 0.2, 0.2, 0.9]]);
        assert!(det.decode_output(&out, 640, 480).is_empty());
    }

    #[test]
    fn six_column_layout_reads_confidence_and_class_directly() {
        let det = detector(&["fire", "smoke"]);
        // Fractional center-size box, conf 0.9, class 1
        let out = tensor(&[&[0.5, 0.5, 0.2, 0.2, 0.9, 1.0]]);
        let dets = det.decode_output(&out, 640, 480);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "smoke");
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn objectness_layout_multiplies_scores() {
        // 2 classes, 7 columns => objectness at col 4, class scores at 5..
        let det = detector(&["fire", "smoke"]);
        let out = tensor(&[&[0.5, 0.5, 0.2, 0.2, 0.8, 0.1, 0.9]]);
        let dets = det.decode_output(&out, 640, 480);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert!((dets[0].confidence - 0.72).abs() < 1e-6);
    }

    #[test]
    fn class_scores_without_objectness_use_max_directly() {
        // 3 classes, 7 columns => 7-5 != 3, so scores start at col 4
        let det = detector(&["fire", "smoke", "person"]);
        let out = tensor(&[&[0.5, 0.5, 0.2, 0.2, 0.1, 0.85, 0.3]]);
        let dets = det.decode_output(&out, 640, 480);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert_eq!(dets[0].label, "smoke");
        assert!((dets[0].confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn percent_scale_scores_are_normalized() {
        let det = detector(&["fire", "smoke"]);
        let out = tensor(&[&[0.5, 0.5, 0.2, 0.2, 90.0, 0.0]]);
        let dets = det.decode_output(&out, 640, 480);
        assert_eq!(dets.len(), 1);
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn sub_threshold_candidates_are_discarded() {
        let det = detector(&["fire", "smoke"]);
        let out = tensor(&[&[0.5, 0.5, 0.2, 0.2, 0.2, 0.0]]);
        assert!(det.decode_output(&out, 640, 480).is_empty());
    }

    #[test]
    fn fractional_coordinates_scale_to_frame() {
        let det = detector(&["fire", "smoke"]);
        let out = tensor(&[&[0.5, 0.5, 0.5, 0.5, 0.9, 0.0]]);
        let dets = det.decode_output(&out, 640, 480);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!((d.x1, d.y1, d.x2, d.y2), (160, 120, 480, 360));
    }

    #[test]
    fn input_pixel_coordinates_scale_by_frame_ratio() {
        // input_size 320, frame 640x480: ratio 2.0 in x, 1.5 in y
        let det = detector(&["fire", "smoke"]);
        let out = tensor(&[&[160.0, 160.0, 80.0, 80.0, 0.9, 0.0]]);
        let dets = det.decode_output(&out, 640, 480);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!((d.x1, d.y1, d.x2, d.y2), (240, 180, 400, 300));
    }

    #[test]
    fn absolute_coordinates_pass_through() {
        // Values beyond input_size*1.5 are already frame pixels
        let det = detector(&["fire", "smoke"]);
        let out = tensor(&[&[500.0, 300.0, 100.0, 100.0, 0.9, 0.0]]);
        let dets = det.decode_output(&out, 640, 480);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        assert_eq!((d.x1, d.y1, d.x2, d.y2), (450, 250, 550, 350));
    }

    #[test]
    fn boxes_collapsing_after_clamp_are_dropped() {
        // Box entirely past the right edge clamps to zero width
        let det = detector(&["fire", "smoke"]);
        let out = tensor(&[&[2000.0, 240.0, 50.0, 50.0, 0.9, 0.0]]);
        assert!(det.decode_output(&out, 640, 480).is_empty());
    }

    #[test]
    fn transposed_output_is_detected_and_normalized() {
        // (features, boxes) orientation: 6 rows x 8 boxes
        let det = detector(&["fire", "smoke"]);
        let boxes = 8;
        let mut out = Array2::<f32>::zeros((6, boxes));
        // One real candidate in column 3
        out[[0, 3]] = 0.5;
        out[[1, 3]] = 0.5;
        out[[2, 3]] = 0.2;
        out[[3, 3]] = 0.2;
        out[[4, 3]] = 0.9;
        out[[5, 3]] = 1.0;
        let dets = det.decode_output(&out, 640, 480);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "smoke");
    }

    #[test]
    fn out_of_range_class_id_falls_back_to_stringified_id() {
        let det = detector(&["fire"]);
        let out = tensor(&[&[0.5, 0.5, 0.2, 0.2, 0.9, 7.0]]);
        let dets = det.decode_output(&out, 640, 480);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "7");
    }

    #[test]
    fn overlapping_decoded_boxes_are_suppressed() {
        let det = detector(&["fire", "smoke"]);
        let out = tensor(&[
            &[0.5, 0.5, 0.5, 0.5, 0.95, 0.0],
            &[0.51, 0.5, 0.5, 0.5, 0.60, 0.0],
        ]);
        let dets = det.decode_output(&out, 640, 480);
        assert_eq!(dets.len(), 1);
        assert!((dets[0].confidence - 0.95).abs() < 1e-6);
    }

    // --- detect() plumbing ---

    struct FixedBackend(Array2<f32>);

    impl InferenceBackend for FixedBackend {
        fn infer(&self, _input: ArrayView3<'_, f32>) -> Result<Array2<f32>, VisionError> {
            Ok(self.0.clone())
        }
    }

    struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn infer(&self, _input: ArrayView3<'_, f32>) -> Result<Array2<f32>, VisionError> {
            Err(VisionError::Backend("runtime exploded".into()))
        }
    }

    #[test]
    fn detect_without_backend_is_unavailable() {
        let det = detector(&["fire"]);
        assert!(!det.is_ready());
        let frame = RgbImage::new(64, 48);
        assert!(det.detect(&frame).is_none());
    }

    #[test]
    fn detect_decodes_backend_output() {
        let config = VisionConfig {
            class_names: vec!["fire".into(), "smoke".into()],
            ..VisionConfig::default()
        };
        let out = tensor(&[&[0.5, 0.5, 0.2, 0.2, 0.9, 0.0]]);
        let det = VisionDetector::new(&config, Some(Box::new(FixedBackend(out))));
        assert!(det.is_ready());
        let frame = RgbImage::new(640, 480);
        let dets = det.detect(&frame).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "fire");
    }

    #[test]
    fn backend_failure_reports_unavailable_not_empty() {
        let config = VisionConfig::default();
        let det = VisionDetector::new(&config, Some(Box::new(FailingBackend)));
        let frame = RgbImage::new(64, 48);
        assert!(det.detect(&frame).is_none());
    }

    #[test]
    fn frame_to_input_is_chw_normalized() {
        let mut frame = RgbImage::new(4, 4);
        for pixel in frame.pixels_mut() {
            *pixel = image::Rgb([255, 0, 128]);
        }
        let input = frame_to_input(&frame, 4);
        assert_eq!(input.dim(), (3, 4, 4));
        assert!((input[[0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(input[[1, 0, 0]].abs() < 1e-6);
        assert!((input[[2, 0, 0]] - 128.0 / 255.0).abs() < 1e-6);
    }
}
