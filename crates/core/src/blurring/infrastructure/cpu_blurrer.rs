use crate::blurring::domain::frame_blurrer::FrameBlurrer;
use crate::blurring::infrastructure::gaussian;
use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::frame::VideoFrame;

/// Blur coverage beyond the detection box on each side.
const REGION_PADDING: f64 = 0.2;

/// Kernel floor: even tiny faces get at least this much smearing.
const MIN_KERNEL: usize = 13;

const MAX_KERNEL: usize = 201;

/// Above this kernel size the ROI is blurred at reduced resolution and
/// scaled back up, which is visually equivalent and much cheaper.
const DOWNSCALE_KERNEL_THRESHOLD: usize = 51;

/// Full-frame fallback parameters: strong pixelation-grade blur.
const FULL_FRAME_SCALE: usize = 8;
const FULL_FRAME_KERNEL: usize = 31;

/// CPU Gaussian blurrer for the live video path.
///
/// The kernel scales with the bounding box (half the larger box dimension,
/// clamped), so a face that fills a 720p frame and a face ten meters away
/// both come out unidentifiable.
pub struct CpuRegionBlurrer;

impl CpuRegionBlurrer {
    pub fn new() -> Self {
        Self
    }

    fn kernel_for(&self, w: i32, h: i32) -> usize {
        let k = (w.max(h).max(0) as usize / 2) | 1;
        k.clamp(MIN_KERNEL, MAX_KERNEL)
    }
}

impl Default for CpuRegionBlurrer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBlurrer for CpuRegionBlurrer {
    fn blur_regions(
        &self,
        frame: &mut VideoFrame,
        detections: &[FaceDetection],
    ) -> Result<(), Box<dyn std::error::Error>> {
        let fw = frame.width() as usize;
        let fh = frame.height() as usize;
        let channels = frame.channels() as usize;

        for det in detections {
            // Pad the box, then clamp to the frame
            let pad_x = (det.width as f64 * REGION_PADDING) as i32;
            let pad_y = (det.height as f64 * REGION_PADDING) as i32;
            let rx = (det.x - pad_x).max(0) as usize;
            let ry = (det.y - pad_y).max(0) as usize;
            let rx2 = ((det.x + det.width + pad_x).max(0) as usize).min(fw);
            let ry2 = ((det.y + det.height + pad_y).max(0) as usize).min(fh);
            if rx2 <= rx || ry2 <= ry {
                continue;
            }
            let rw = rx2 - rx;
            let rh = ry2 - ry;

            let kernel_size = self.kernel_for(det.width, det.height);
            let data = frame.data_mut();

            if kernel_size > DOWNSCALE_KERNEL_THRESHOLD {
                blur_region_downscaled(data, fw, channels, rx, ry, rw, rh, kernel_size);
            } else {
                let kernel = gaussian::gaussian_kernel_1d(kernel_size);
                gaussian::blur_region(data, fw, channels, rx, ry, rw, rh, &kernel);
            }
        }
        Ok(())
    }

    fn blur_full_frame(&self, frame: &mut VideoFrame) -> Result<(), Box<dyn std::error::Error>> {
        let fw = frame.width() as usize;
        let fh = frame.height() as usize;
        let channels = frame.channels() as usize;
        if fw == 0 || fh == 0 {
            return Ok(());
        }

        let data = frame.data_mut();
        let (mut small, sw, sh) = gaussian::downscale(data, fw, fh, channels, FULL_FRAME_SCALE);
        let kernel = gaussian::gaussian_kernel_1d(FULL_FRAME_KERNEL.min((sw.min(sh) * 2) | 1));
        gaussian::blur_region(&mut small, sw, channels, 0, 0, sw, sh, &kernel);
        let restored = gaussian::upscale(&small, sw, sh, channels, fw, fh);
        data.copy_from_slice(&restored);
        Ok(())
    }
}

/// Downscale-blur-upscale for large kernels.
#[allow(clippy::too_many_arguments)]
fn blur_region_downscaled(
    data: &mut [u8],
    frame_w: usize,
    channels: usize,
    rx: usize,
    ry: usize,
    rw: usize,
    rh: usize,
    kernel_size: usize,
) {
    // Copy the ROI out
    let mut roi = vec![0u8; rw * rh * channels];
    for y in 0..rh {
        let src = ((ry + y) * frame_w + rx) * channels;
        let dst = y * rw * channels;
        roi[dst..dst + rw * channels].copy_from_slice(&data[src..src + rw * channels]);
    }

    let scale = (kernel_size / 25).max(2);
    let (mut small, sw, sh) = gaussian::downscale(&roi, rw, rh, channels, scale);
    let small_kernel = ((kernel_size / scale) | 1).max(3);
    let kernel = gaussian::gaussian_kernel_1d(small_kernel.min((sw.min(sh) * 2) | 1));
    gaussian::blur_region(&mut small, sw, channels, 0, 0, sw, sh, &kernel);
    let blurred = gaussian::upscale(&small, sw, sh, channels, rw, rh);

    // Write the ROI back
    for y in 0..rh {
        let dst = ((ry + y) * frame_w + rx) * channels;
        let src = y * rw * channels;
        data[dst..dst + rw * channels].copy_from_slice(&blurred[src..src + rw * channels]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkered_frame(w: u32, h: u32) -> VideoFrame {
        let mut data = vec![0u8; (w * h * 3) as usize];
        for y in 0..h as usize {
            for x in 0..w as usize {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                let i = (y * w as usize + x) * 3;
                data[i] = v;
                data[i + 1] = v;
                data[i + 2] = v;
            }
        }
        VideoFrame::new(data, w, h, 3, 0, 0)
    }

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

    fn region_variance(frame: &VideoFrame, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let fw = frame.width() as usize;
        let mut values = Vec::new();
        for yy in y..y + h {
            for xx in x..x + w {
                values.push(frame.data()[(yy * fw + xx) * 3] as f64);
            }
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_blur_flattens_region() {
        let mut frame = checkered_frame(64, 64);
        let before = region_variance(&frame, 20, 20, 16, 16);

        let blurrer = CpuRegionBlurrer::new();
        blurrer.blur_regions(&mut frame, &[det(20, 20, 16, 16)]).unwrap();

        let after = region_variance(&frame, 24, 24, 8, 8);
        assert!(
            after < before / 4.0,
            "blur should flatten the checker pattern: {before} -> {after}"
        );
    }

    #[test]
    fn test_blur_leaves_far_pixels_untouched() {
        let mut frame = checkered_frame(64, 64);
        let corner_before: Vec<u8> = frame.data()[..32 * 3].to_vec();

        let blurrer = CpuRegionBlurrer::new();
        blurrer.blur_regions(&mut frame, &[det(40, 40, 12, 12)]).unwrap();

        assert_eq!(&frame.data()[..32 * 3], &corner_before[..]);
    }

    #[test]
    fn test_zero_detections_is_identity() {
        let mut frame = checkered_frame(32, 32);
        let before = frame.data().to_vec();
        let blurrer = CpuRegionBlurrer::new();
        blurrer.blur_regions(&mut frame, &[]).unwrap();
        assert_eq!(frame.data(), &before[..]);
    }

    #[test]
    fn test_detection_outside_frame_is_skipped() {
        let mut frame = checkered_frame(32, 32);
        let before = frame.data().to_vec();
        let blurrer = CpuRegionBlurrer::new();
        blurrer
            .blur_regions(&mut frame, &[det(100, 100, 20, 20), det(-50, -50, 20, 20)])
            .unwrap();
        assert_eq!(frame.data(), &before[..]);
    }

    #[test]
    fn test_detection_partially_off_frame_clamped() {
        let mut frame = checkered_frame(32, 32);
        let blurrer = CpuRegionBlurrer::new();
        // Must not panic; clamped region gets blurred
        blurrer.blur_regions(&mut frame, &[det(-10, -10, 24, 24)]).unwrap();
        let after = region_variance(&frame, 0, 0, 8, 8);
        assert!(after < 128.0 * 128.0 / 4.0);
    }

    #[test]
    fn test_large_face_uses_downscale_path() {
        // Kernel for a 400px face exceeds the threshold; just verify effect
        let mut frame = checkered_frame(512, 512);
        let blurrer = CpuRegionBlurrer::new();
        blurrer.blur_regions(&mut frame, &[det(50, 50, 400, 400)]).unwrap();
        let after = region_variance(&frame, 150, 150, 64, 64);
        assert!(after < 1000.0);
    }

    #[test]
    fn test_full_frame_blur_flattens_everything() {
        let mut frame = checkered_frame(64, 64);
        let blurrer = CpuRegionBlurrer::new();
        blurrer.blur_full_frame(&mut frame).unwrap();
        let after = region_variance(&frame, 0, 0, 64, 64);
        assert!(after < 500.0, "full-frame fallback variance: {after}");
    }

    #[test]
    fn test_kernel_floor_and_cap() {
        let blurrer = CpuRegionBlurrer::new();
        assert_eq!(blurrer.kernel_for(4, 4), MIN_KERNEL);
        assert_eq!(blurrer.kernel_for(1000, 1000), MAX_KERNEL);
        // Mid-size face: proportional and odd
        let k = blurrer.kernel_for(100, 80);
        assert_eq!(k, 51);
        assert_eq!(k % 2, 1);
    }
}
