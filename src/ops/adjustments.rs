// ============================================================================
// ADJUSTMENT OPERATIONS — per-pixel colour adjustments
// ============================================================================
//
// Each adjustment is a pure function of one pixel, so the region is read
// from the snapshot, transformed row-parallel with rayon and written back.
// ============================================================================

use rayon::prelude::*;

use crate::filter::{BufferSnapshot, FilterConfiguration, FilterStep};
use crate::geometry::Rect;
use crate::tiles::PixelBuffer;

// ============================================================================
// HELPER: per-pixel transform over a rect
// ============================================================================

/// Apply a per-pixel transform to `rect` of `buffer`, reading the original
/// values from `before`.
/// `transform` receives (r, g, b, a) as f32 and returns (r, g, b, a) as f32.
fn apply_pixel_transform<F>(buffer: &mut PixelBuffer, rect: Rect, before: &BufferSnapshot, transform: F)
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    if rect.is_empty() {
        return;
    }
    let mut region = before.read_rect(rect);
    let stride = rect.width as usize * 4;
    let raw: &mut [u8] = &mut region;

    raw.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let (nr, ng, nb, na) = transform(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32);
            px[0] = nr.round().clamp(0.0, 255.0) as u8;
            px[1] = ng.round().clamp(0.0, 255.0) as u8;
            px[2] = nb.round().clamp(0.0, 255.0) as u8;
            px[3] = na.round().clamp(0.0, 255.0) as u8;
        }
    });

    buffer.write_rect(rect.x, rect.y, &region);
}

/// BT.709 luminance of 0–255 channel values.
#[inline]
fn luminance(r: f32, g: f32, b: f32) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

// ============================================================================
// INVERT / DESATURATE
// ============================================================================

/// `invert`: negate the colour channels, alpha untouched.
pub struct InvertColors;

impl FilterStep for InvertColors {
    fn id(&self) -> &str {
        "invert"
    }

    fn process(&self, buffer: &mut PixelBuffer, rect: Rect, _config: &FilterConfiguration, before: &BufferSnapshot) {
        apply_pixel_transform(buffer, rect, before, |r, g, b, a| (255.0 - r, 255.0 - g, 255.0 - b, a));
    }
}

/// `desaturate`: luminance greyscale.
pub struct Desaturate;

impl FilterStep for Desaturate {
    fn id(&self) -> &str {
        "desaturate"
    }

    fn process(&self, buffer: &mut PixelBuffer, rect: Rect, _config: &FilterConfiguration, before: &BufferSnapshot) {
        apply_pixel_transform(buffer, rect, before, |r, g, b, a| {
            let lum = luminance(r, g, b);
            (lum, lum, lum, a)
        });
    }
}

// ============================================================================
// BRIGHTNESS / CONTRAST
// ============================================================================

/// `brightness_contrast`.
/// `brightness`: -100..100 (additive offset), default 0.
/// `contrast`: -100..100 (multiplier around midpoint), default 0.
pub struct BrightnessContrast;

impl FilterStep for BrightnessContrast {
    fn id(&self) -> &str {
        "brightness_contrast"
    }

    fn process(&self, buffer: &mut PixelBuffer, rect: Rect, config: &FilterConfiguration, before: &BufferSnapshot) {
        let brightness = config.get_f64("brightness", 0.0).clamp(-100.0, 100.0) as f32;
        let contrast = config.get_f64("contrast", 0.0).clamp(-100.0, 100.0) as f32;
        let factor = (259.0 * (contrast + 255.0)) / (255.0 * (259.0 - contrast));
        apply_pixel_transform(buffer, rect, before, move |r, g, b, a| {
            let nr = factor * (r + brightness - 128.0) + 128.0;
            let ng = factor * (g + brightness - 128.0) + 128.0;
            let nb = factor * (b + brightness - 128.0) + 128.0;
            (nr, ng, nb, a)
        });
    }
}

// ============================================================================
// THRESHOLD
// ============================================================================

/// `threshold`: black or white by luminance.  `level`: 0..255, default 128.
pub struct Threshold;

impl FilterStep for Threshold {
    fn id(&self) -> &str {
        "threshold"
    }

    fn process(&self, buffer: &mut PixelBuffer, rect: Rect, config: &FilterConfiguration, before: &BufferSnapshot) {
        let level = config.get_f64("level", 128.0) as f32;
        apply_pixel_transform(buffer, rect, before, move |r, g, b, a| {
            let v = if luminance(r, g, b) >= level { 255.0 } else { 0.0 };
            (v, v, v, a)
        });
    }
}
