// ============================================================================
// FILTERS — neighbourhood filters (blur)
// ============================================================================

use image::RgbaImage;
use image::imageops;
use rayon::prelude::*;

use crate::filter::{BufferSnapshot, FilterConfiguration, FilterStep};
use crate::geometry::Rect;
use crate::tiles::PixelBuffer;

/// Largest accepted sigma; keeps the read margin bounded.
const MAX_SIGMA: f64 = 64.0;

/// `gaussian_blur`.  `sigma` in pixels, default 2.0.  Pixels just outside the
/// rect are read from the snapshot so the blur has no seam at the rect edge.
pub struct GaussianBlur;

impl FilterStep for GaussianBlur {
    fn id(&self) -> &str {
        "gaussian_blur"
    }

    fn process(&self, buffer: &mut PixelBuffer, rect: Rect, config: &FilterConfiguration, before: &BufferSnapshot) {
        let sigma = config.get_f64("sigma", 2.0).clamp(0.0, MAX_SIGMA) as f32;
        if sigma <= 0.0 || rect.is_empty() {
            return;
        }
        let kernel = build_gaussian_kernel(sigma);
        let radius = (kernel.len() / 2) as i32;

        let source = before.read_rect(rect.inflate(radius));
        let blurred = parallel_gaussian_blur(&source, &kernel);
        let inner = imageops::crop_imm(&blurred, radius as u32, radius as u32, rect.width as u32, rect.height as u32)
            .to_image();
        buffer.write_rect(rect.x, rect.y, &inner);
    }
}

// ---------------------------------------------------------------------------
//  Parallel separable Gaussian blur (rayon)
// ---------------------------------------------------------------------------

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let inv = 1.0 / kernel.iter().sum::<f32>();
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Horizontal then vertical pass, each parallel by row, edges clamped.
fn parallel_gaussian_blur(src: &RgbaImage, kernel: &[f32]) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }
    let radius = kernel.len() / 2;
    let buf_in: Vec<f32> = src.as_raw().iter().map(|&b| b as f32).collect();

    // --- Horizontal pass ---
    let mut buf_h = vec![0.0f32; w * h * 4];
    buf_h.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        let row_in = &buf_in[y * w * 4..(y + 1) * w * 4];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x + ki).saturating_sub(radius).min(w - 1);
                for c in 0..4 {
                    acc[c] += row_in[sx * 4 + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass ---
    let mut buf_v = vec![0.0f32; w * h * 4];
    buf_v.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y + ki).saturating_sub(radius).min(h - 1);
                let idx = sy * w * 4 + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    let mut out = src.clone();
    for (dst, v) in out.iter_mut().zip(buf_v) {
        *dst = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}
