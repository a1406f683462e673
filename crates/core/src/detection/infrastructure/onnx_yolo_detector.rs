/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Stateless across frames — identity continuity comes from the consent
/// registry, not a tracker. The frame is scaled into the model input
/// anchored at the top-left corner, so detections map back to frame
/// coordinates with a single scale factor.
use std::path::Path;

use crate::detection::domain::face_detection::FaceDetection;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::frame::VideoFrame;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Detections overlapping a stronger one past this IoU are duplicates.
const OVERLAP_IOU_THRESH: f64 = 0.45;

/// Number of keypoint values per detection (5 landmarks × 3: x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

/// Minimum keypoint confidence to treat a landmark as visible.
const KEYPOINT_CONF_THRESH: f64 = 0.5;

/// Padding value outside the image region, the YOLO training convention.
const PAD_GRAY: f32 = 114.0 / 255.0;

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting
    /// NCHW). Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // shape is [N, C, H, W] — use H (square input)
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>> {
        let (input_tensor, scale) = prepare_input(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape();

        // Models export either [1, features, boxes] or [1, boxes, features];
        // the feature axis is always the short one.
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }
        let feature_major = shape[1] < shape[2];
        let (num_boxes, num_feats) = if feature_major {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };

        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let row_of = |i: usize| -> Vec<f32> {
            if feature_major {
                (0..num_feats).map(|f| data[f * num_boxes + i]).collect()
            } else {
                data[i * num_feats..(i + 1) * num_feats].to_vec()
            }
        };

        let mut candidates = Vec::new();
        for i in 0..num_boxes {
            if let Some(det) = parse_row(&row_of(i), scale, self.confidence) {
                candidates.push(det);
            }
        }

        Ok(suppress_overlaps(candidates))
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Fit a frame into the model's square input, anchored at the top-left with
/// right/bottom gray padding, sampled bilinearly.
///
/// Returns `(NCHW float32 tensor, scale)`; dividing model-space coordinates
/// by `scale` recovers frame coordinates, with no pad offsets to undo.
fn prepare_input(frame: &VideoFrame, target_size: u32) -> (ndarray::Array4<f32>, f64) {
    let target = target_size as usize;
    let fw = frame.width() as usize;
    let fh = frame.height() as usize;

    let scale = (target as f64 / fw as f64).min(target as f64 / fh as f64);
    let scaled_w = ((fw as f64 * scale).round() as usize).min(target);
    let scaled_h = ((fh as f64 * scale).round() as usize).min(target);

    let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, target, target), PAD_GRAY);
    if fw == 0 || fh == 0 {
        return (tensor, 1.0);
    }

    let data = frame.data();
    for y in 0..scaled_h {
        let sy = ((y as f64 + 0.5) / scale - 0.5).max(0.0);
        let y0 = (sy as usize).min(fh - 1);
        let y1 = (y0 + 1).min(fh - 1);
        let wy = sy - y0 as f64;

        for x in 0..scaled_w {
            let sx = ((x as f64 + 0.5) / scale - 0.5).max(0.0);
            let x0 = (sx as usize).min(fw - 1);
            let x1 = (x0 + 1).min(fw - 1);
            let wx = sx - x0 as f64;

            for c in 0..3 {
                let p00 = data[(y0 * fw + x0) * 3 + c] as f64;
                let p01 = data[(y0 * fw + x1) * 3 + c] as f64;
                let p10 = data[(y1 * fw + x0) * 3 + c] as f64;
                let p11 = data[(y1 * fw + x1) * 3 + c] as f64;
                let top = p00 + (p01 - p00) * wx;
                let bottom = p10 + (p11 - p10) * wx;
                let value = top + (bottom - top) * wy;
                tensor[[0, c, y, x]] = (value / 255.0) as f32;
            }
        }
    }

    (tensor, scale)
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

/// One model output row → a detection in frame coordinates, or `None` below
/// the confidence cutoff. Row layout: `[cx, cy, w, h, conf]` plus optional
/// `(x, y, conf)` triples for five landmarks, all in model input space.
fn parse_row(row: &[f32], scale: f64, confidence: f64) -> Option<FaceDetection> {
    if row.len() < 5 {
        return None;
    }
    let conf = row[4] as f64;
    if conf < confidence {
        return None;
    }

    let cx = row[0] as f64 / scale;
    let cy = row[1] as f64 / scale;
    let w = row[2] as f64 / scale;
    let h = row[3] as f64 / scale;

    let landmarks = (row.len() >= 5 + NUM_KEYPOINT_VALUES).then(|| {
        let mut pts = [(0.0f64, 0.0f64); 5];
        let triples = row[5..5 + NUM_KEYPOINT_VALUES].chunks_exact(3);
        for (point, triple) in pts.iter_mut().zip(triples) {
            if triple[2] as f64 >= KEYPOINT_CONF_THRESH {
                *point = (triple[0] as f64 / scale, triple[1] as f64 / scale);
            }
            // else: stays (0.0, 0.0), invisible to FaceLandmarks
        }
        FaceLandmarks::new(pts)
    });

    Some(FaceDetection {
        x: (cx - w / 2.0).round() as i32,
        y: (cy - h / 2.0).round() as i32,
        width: w.round() as i32,
        height: h.round() as i32,
        confidence: conf,
        landmarks,
    })
}

/// Greedy duplicate suppression: strongest detection first; a weaker one
/// survives only by clearing every kept box on IoU.
fn suppress_overlaps(mut detections: Vec<FaceDetection>) -> Vec<FaceDetection> {
    detections.sort_unstable_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<FaceDetection> = Vec::with_capacity(detections.len());
    for det in detections {
        if kept.iter().all(|k| k.iou(&det) <= OVERLAP_IOU_THRESH) {
            kept.push(det);
        }
    }
    kept
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
