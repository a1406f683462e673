use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::frame::VideoFrame;

/// Domain interface for anonymizing regions within a frame.
///
/// Implementations modify the frame in-place (`&mut VideoFrame`) to avoid
/// allocation. `blur_full_frame` is the fail-closed path: when detection
/// itself fails, the whole frame must become unidentifiable before egress.
pub trait FrameBlurrer: Send {
    fn blur_regions(
        &self,
        frame: &mut VideoFrame,
        detections: &[FaceDetection],
    ) -> Result<(), Box<dyn std::error::Error>>;

    fn blur_full_frame(&self, frame: &mut VideoFrame) -> Result<(), Box<dyn std::error::Error>>;
}
