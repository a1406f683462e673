/// ArcFace embedding extraction using ONNX Runtime.
///
/// One session shared between the video worker and the directory monitor;
/// the session sits behind a mutex because `ort` inference takes `&mut`.
use std::path::Path;
use std::sync::Mutex;

use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::face_embedding::FaceEmbedding;

/// ArcFace models take a 112x112 RGB face, normalized to [-1, 1].
const EMBED_INPUT: usize = 112;

pub struct OnnxArcFaceEmbedder {
    session: Mutex<ort::session::Session>,
}

impl OnnxArcFaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl FaceEmbedder for OnnxArcFaceEmbedder {
    fn embed(
        &self,
        rgb_data: &[u8],
        width: u32,
        height: u32,
    ) -> Result<FaceEmbedding, Box<dyn std::error::Error>> {
        let tensor = crop_to_tensor(rgb_data, width, height);
        let input_value = ort::value::Tensor::from_array(tensor)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let embedding_array = outputs[0].try_extract_array::<f32>()?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or("Cannot get embedding slice")?;

        Ok(FaceEmbedding::new(embedding_slice.to_vec()))
    }
}

/// Map a head crop onto the 112x112 model input, NCHW, [-1, 1].
///
/// Head crops from the live path are usually several times larger than the
/// model input (a nearby face at 720p spans hundreds of pixels), so the
/// downscale averages the full source box behind each output pixel rather
/// than point-sampling, which would alias away skin texture the embedding
/// depends on. Crops from distant faces smaller than the input are
/// upscaled bilinearly.
fn crop_to_tensor(rgb_data: &[u8], width: u32, height: u32) -> ndarray::Array4<f32> {
    let src_w = width as usize;
    let src_h = height as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, EMBED_INPUT, EMBED_INPUT));
    if src_w == 0 || src_h == 0 || rgb_data.len() < src_w * src_h * 3 {
        return tensor;
    }

    let box_filter = src_w >= EMBED_INPUT && src_h >= EMBED_INPUT;

    for y in 0..EMBED_INPUT {
        for x in 0..EMBED_INPUT {
            let pixel = if box_filter {
                average_box(rgb_data, src_w, src_h, x, y)
            } else {
                sample_bilinear(rgb_data, src_w, src_h, x, y)
            };
            for c in 0..3 {
                tensor[[0, c, y, x]] = (pixel[c] / 127.5 - 1.0) as f32;
            }
        }
    }

    tensor
}

/// Mean of the source box that output pixel `(x, y)` covers.
fn average_box(rgb_data: &[u8], src_w: usize, src_h: usize, x: usize, y: usize) -> [f64; 3] {
    let x0 = x * src_w / EMBED_INPUT;
    let x1 = ((x + 1) * src_w / EMBED_INPUT).max(x0 + 1).min(src_w);
    let y0 = y * src_h / EMBED_INPUT;
    let y1 = ((y + 1) * src_h / EMBED_INPUT).max(y0 + 1).min(src_h);

    let mut sum = [0.0f64; 3];
    for sy in y0..y1 {
        for sx in x0..x1 {
            let i = (sy * src_w + sx) * 3;
            for c in 0..3 {
                sum[c] += rgb_data[i + c] as f64;
            }
        }
    }
    let count = ((x1 - x0) * (y1 - y0)) as f64;
    [sum[0] / count, sum[1] / count, sum[2] / count]
}

/// Bilinear sample at the source position behind output pixel `(x, y)`.
fn sample_bilinear(rgb_data: &[u8], src_w: usize, src_h: usize, x: usize, y: usize) -> [f64; 3] {
    let fx = ((x as f64 + 0.5) * src_w as f64 / EMBED_INPUT as f64 - 0.5).max(0.0);
    let fy = ((y as f64 + 0.5) * src_h as f64 / EMBED_INPUT as f64 - 0.5).max(0.0);

    let x0 = (fx as usize).min(src_w - 1);
    let x1 = (x0 + 1).min(src_w - 1);
    let y0 = (fy as usize).min(src_h - 1);
    let y1 = (y0 + 1).min(src_h - 1);
    let wx = fx - x0 as f64;
    let wy = fy - y0 as f64;

    let mut out = [0.0f64; 3];
    for (c, v) in out.iter_mut().enumerate() {
        let p00 = rgb_data[(y0 * src_w + x0) * 3 + c] as f64;
        let p01 = rgb_data[(y0 * src_w + x1) * 3 + c] as f64;
        let p10 = rgb_data[(y1 * src_w + x0) * 3 + c] as f64;
        let p11 = rgb_data[(y1 * src_w + x1) * 3 + c] as f64;
        let top = p00 + (p01 - p00) * wx;
        let bottom = p10 + (p11 - p10) * wx;
        *v = top + (bottom - top) * wy;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tensor_shape_from_large_crop() {
        // A close face at 720p: crop well above the model input size
        let data = vec![180u8; 300 * 300 * 3];
        let tensor = crop_to_tensor(&data, 300, 300);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_normalization_covers_full_range() {
        // White crop → +1 on the downscale path, black crop → -1 on the
        // upscale path
        let white = vec![255u8; 150 * 150 * 3];
        let tensor = crop_to_tensor(&white, 150, 150);
        assert_relative_eq!(tensor[[0, 0, 56, 56]], 1.0, epsilon = 0.01);

        let black = vec![0u8; 40 * 40 * 3];
        let tensor = crop_to_tensor(&black, 40, 40);
        assert_relative_eq!(tensor[[0, 2, 56, 56]], -1.0, epsilon = 0.01);
    }

    #[test]
    fn test_downscale_averages_fine_detail() {
        // 224x224 checkerboard of 0/255 pixels: each output pixel covers a
        // 2x2 source box, so box filtering lands on the midpoint while
        // point sampling would swing to one extreme
        let mut data = vec![0u8; 224 * 224 * 3];
        for y in 0..224 {
            for x in 0..224 {
                if (x + y) % 2 == 0 {
                    let i = (y * 224 + x) * 3;
                    data[i] = 255;
                    data[i + 1] = 255;
                    data[i + 2] = 255;
                }
            }
        }
        let tensor = crop_to_tensor(&data, 224, 224);
        for &probe in &[(10usize, 10usize), (56, 56), (100, 30)] {
            let v = tensor[[0, 0, probe.0, probe.1]];
            assert!(v.abs() < 0.05, "expected midpoint at {probe:?}, got {v}");
        }
    }

    #[test]
    fn test_upscale_preserves_gradient_order() {
        // 56x56 horizontal ramp, upscaled: values must stay monotonic
        let mut data = vec![0u8; 56 * 56 * 3];
        for y in 0..56 {
            for x in 0..56 {
                let i = (y * 56 + x) * 3;
                let v = (x * 255 / 55) as u8;
                data[i] = v;
                data[i + 1] = v;
                data[i + 2] = v;
            }
        }
        let tensor = crop_to_tensor(&data, 56, 56);
        let row = 60;
        for x in 1..EMBED_INPUT {
            assert!(
                tensor[[0, 0, row, x]] >= tensor[[0, 0, row, x - 1]] - 1e-4,
                "gradient not monotonic at x={x}"
            );
        }
        assert!(tensor[[0, 0, row, 0]] < tensor[[0, 0, row, EMBED_INPUT - 1]]);
    }

    #[test]
    fn test_edge_clamped_rectangular_crop() {
        // A crop clamped at the frame border is rectangular; both axes
        // above the input size still take the box filter without panicking
        let data = vec![120u8; 200 * 130 * 3];
        let tensor = crop_to_tensor(&data, 200, 130);
        assert_relative_eq!(tensor[[0, 1, 111, 111]], 120.0 / 127.5 - 1.0, epsilon = 0.01);
    }

    #[test]
    fn test_empty_or_short_crop_is_zeroed() {
        let tensor = crop_to_tensor(&[], 0, 0);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        // Declared size larger than the buffer: refuse to read out of bounds
        let tensor = crop_to_tensor(&[1, 2, 3], 10, 10);
        assert_eq!(tensor[[0, 0, 5, 5]], 0.0);
    }
}
