use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::frame::VideoFrame;

/// Domain interface for face detection.
///
/// Implementations may be stateful, hence `&mut self`. An `Err` from
/// `detect` means the frame's consent status is unknown; the video worker
/// responds by blurring the whole frame.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceDetection>, Box<dyn std::error::Error>>;
}
