use std::cmp::Ordering;

use crate::detection::domain::face_landmarks::FaceLandmarks;

/// A detected face: bounding box in frame coordinates plus confidence and,
/// when the model provides them, 5-point landmarks.
///
/// The box may extend past the frame edges; consumers clamp as needed.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f64,
    pub landmarks: Option<FaceLandmarks>,
}

impl FaceDetection {
    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn iou(&self, other: &FaceDetection) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let area_a = self.width as f64 * self.height as f64;
        let area_b = other.width as f64 * other.height as f64;
        inter / (area_a + area_b - inter)
    }

    /// Capture ordering: larger area first; ties broken by smaller x, then
    /// smaller y, so "the largest face" is deterministic in multi-face frames.
    pub fn capture_order(&self, other: &FaceDetection) -> Ordering {
        other
            .area()
            .cmp(&self.area())
            .then(self.x.cmp(&other.x))
            .then(self.y.cmp(&other.y))
    }

    /// The detection a consent capture should record, per capture ordering.
    pub fn largest<'a>(detections: &'a [FaceDetection]) -> Option<&'a FaceDetection> {
        detections.iter().min_by(|a, b| a.capture_order(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x: i32, y: i32, w: i32, h: i32) -> FaceDetection {
        FaceDetection {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.9,
            landmarks: None,
        }
    }

    // ── area / IoU ───────────────────────────────────────────────────

    #[test]
    fn test_area() {
        assert_eq!(det(0, 0, 10, 20).area(), 200);
        assert_eq!(det(0, 0, -5, 20).area(), 0);
    }

    #[test]
    fn test_iou_identical() {
        let a = det(10, 10, 100, 100);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_no_overlap() {
        assert_relative_eq!(det(0, 0, 50, 50).iou(&det(100, 100, 50, 50)), 0.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // intersection 50x100 = 5000, union 15000
        let a = det(0, 0, 100, 100);
        let b = det(50, 0, 100, 100);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    // ── largest-face selection ───────────────────────────────────────

    #[test]
    fn test_largest_prefers_bigger_area() {
        let dets = vec![det(0, 0, 10, 10), det(50, 50, 30, 30), det(90, 0, 20, 20)];
        let largest = FaceDetection::largest(&dets).unwrap();
        assert_eq!((largest.x, largest.y), (50, 50));
    }

    #[test]
    fn test_largest_tie_broken_by_smaller_x() {
        let dets = vec![det(40, 0, 20, 20), det(10, 30, 20, 20)];
        let largest = FaceDetection::largest(&dets).unwrap();
        assert_eq!(largest.x, 10);
    }

    #[test]
    fn test_largest_tie_broken_by_smaller_y_when_x_equal() {
        let dets = vec![det(10, 50, 20, 20), det(10, 5, 20, 20)];
        let largest = FaceDetection::largest(&dets).unwrap();
        assert_eq!(largest.y, 5);
    }

    #[test]
    fn test_largest_empty_returns_none() {
        assert!(FaceDetection::largest(&[]).is_none());
    }

    #[test]
    fn test_largest_single() {
        let dets = vec![det(3, 4, 5, 5)];
        assert_eq!(FaceDetection::largest(&dets).unwrap().x, 3);
    }
}
