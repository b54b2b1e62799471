// ============================================================================
// COMPOSITOR — rectangle blits between pixel buffers
// ============================================================================
//
// Every blit walks the destination chunk-by-chunk in parallel (rayon).  The
// per-pixel blend is a pure function of (dst, src, opacity, mask weight), so
// chunks never depend on each other.

use rayon::prelude::*;

use crate::blend::{BlendMode, ChannelFlags, OPACITY_OPAQUE, Opacity, blend_pixel};
use crate::geometry::Rect;
use crate::selection::SelectionMask;
use crate::tiles::PixelBuffer;

/// Paint settings for one or more blits: blend mode, opacity and the
/// channels that may be written.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Compositor {
    pub blend_mode: BlendMode,
    pub opacity: Opacity,
    pub channels: ChannelFlags,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(BlendMode::Normal)
    }
}

impl Compositor {
    /// Fully opaque compositor writing every channel.
    pub fn new(blend_mode: BlendMode) -> Self {
        Self { blend_mode, opacity: OPACITY_OPAQUE, channels: ChannelFlags::all() }
    }

    pub fn with_opacity(mut self, opacity: Opacity) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_channels(mut self, channels: ChannelFlags) -> Self {
        self.channels = channels;
        self
    }

    /// Composite `src_rect` of `src` into `dst` with its top-left at `dst_pos`.
    pub fn blit(&self, dst: &mut PixelBuffer, dst_pos: (i32, i32), src: &PixelBuffer, src_rect: Rect) {
        self.composite(dst, dst_pos, src, src_rect, None);
    }

    /// Like [`Compositor::blit`], with each pixel's opacity further scaled by
    /// `mask`'s weight at the destination position.  Pixels outside the mask
    /// have weight 0 and are left untouched.
    pub fn blit_masked(
        &self,
        dst: &mut PixelBuffer,
        dst_pos: (i32, i32),
        src: &PixelBuffer,
        mask: &SelectionMask,
        src_rect: Rect,
    ) {
        self.composite(dst, dst_pos, src, src_rect, Some(mask));
    }

    fn composite(
        &self,
        dst: &mut PixelBuffer,
        dst_pos: (i32, i32),
        src: &PixelBuffer,
        src_rect: Rect,
        mask: Option<&SelectionMask>,
    ) {
        if src_rect.is_empty() || self.opacity == 0 || self.channels.is_empty() {
            return;
        }
        let (dx, dy) = (dst_pos.0 - src_rect.x, dst_pos.1 - src_rect.y);
        let mut dst_rect = src_rect.translated(dx, dy);
        if let Some(mask) = mask {
            // Nothing outside the mask can change; don't touch those chunks.
            dst_rect &= mask.bounds();
            if dst_rect.is_empty() {
                return;
            }
        }

        let opacity = self.opacity as f32 / 255.0;
        let (mode, channels) = (self.blend_mode, self.channels);

        dst.tiles_mut(dst_rect).into_par_iter().for_each(|mut tile| {
            let area = tile.rect() & dst_rect;
            for y in area.rows() {
                for x in area.columns() {
                    let weight = match mask {
                        Some(mask) => match mask.weight_at(x, y) {
                            0 => continue,
                            w => opacity * (w as f32 / 255.0),
                        },
                        None => opacity,
                    };
                    let top = src.pixel(x - dx, y - dy);
                    let px = tile.pixel_mut(x, y);
                    *px = blend_pixel(*px, top, mode, weight, channels);
                }
            }
        });
    }
}

/// One-shot [`Compositor::blit`].
pub fn blit(
    dst: &mut PixelBuffer,
    dst_pos: (i32, i32),
    blend_mode: BlendMode,
    src: &PixelBuffer,
    opacity: Opacity,
    src_rect: Rect,
    channels: ChannelFlags,
) {
    Compositor { blend_mode, opacity, channels }.blit(dst, dst_pos, src, src_rect);
}

/// One-shot [`Compositor::blit_masked`], writing every channel.
pub fn blit_masked(
    dst: &mut PixelBuffer,
    dst_pos: (i32, i32),
    blend_mode: BlendMode,
    src: &PixelBuffer,
    mask: &SelectionMask,
    opacity: Opacity,
    src_rect: Rect,
) {
    Compositor::new(blend_mode)
        .with_opacity(opacity)
        .blit_masked(dst, dst_pos, src, mask, src_rect);
}
