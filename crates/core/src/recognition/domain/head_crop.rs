use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::frame::VideoFrame;

/// How far the crop extends beyond the detection box on each side.
const CROP_MARGIN: f64 = 0.25;

/// Extract a square head crop for recognition (and for consent captures).
///
/// The crop is centered on the landmark centroid when landmarks are visible,
/// otherwise on the box center, and sized to the larger box dimension plus a
/// margin so hair and jawline stay inside. Clamped to the frame; `None` when
/// the detection lies entirely outside it.
pub fn head_crop(frame: &VideoFrame, detection: &FaceDetection) -> Option<(Vec<u8>, u32, u32)> {
    let (cx, cy) = detection
        .landmarks
        .as_ref()
        .and_then(|lm| lm.center())
        .unwrap_or((
            detection.x as f64 + detection.width as f64 / 2.0,
            detection.y as f64 + detection.height as f64 / 2.0,
        ));

    let side = (detection.width.max(detection.height) as f64 * (1.0 + 2.0 * CROP_MARGIN)).round();
    let half = side / 2.0;

    frame.crop(
        (cx - half).round() as i32,
        (cy - half).round() as i32,
        side as i32,
        side as i32,
    )
}
