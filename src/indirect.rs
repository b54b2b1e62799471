// ============================================================================
// INDIRECT PAINTING — uncommitted stroke overlays
// ============================================================================
//
// While a stroke is in progress its dabs go into a separate overlay buffer
// instead of the layer.  Anything that reads the layer must see "overlay
// blended over committed content", so the merge helpers below build that
// view on the fly without touching either input.

use image::Rgba;

use crate::blend::{BlendMode, ChannelFlags, OPACITY_OPAQUE, Opacity, blend_pixel};
use crate::compositor::Compositor;
use crate::geometry::Rect;
use crate::selection::SelectionMask;
use crate::tiles::PixelBuffer;

/// Access to a layer's temporary painting target.
pub trait IndirectPainting {
    /// The overlay buffer, if a stroke is in progress.
    fn temporary_target(&self) -> Option<&PixelBuffer>;
    fn temporary_blend_mode(&self) -> BlendMode;
    fn temporary_opacity(&self) -> Opacity;
}

/// An in-progress stroke: its own buffer, blend mode and opacity.
#[derive(Clone, Debug)]
pub struct StrokeOverlay {
    buffer: PixelBuffer,
    blend_mode: BlendMode,
    opacity: Opacity,
}

impl StrokeOverlay {
    pub fn new(blend_mode: BlendMode, opacity: Opacity) -> Self {
        Self { buffer: PixelBuffer::new(), blend_mode, opacity }
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// The buffer strokes paint into.
    pub fn buffer_mut(&mut self) -> &mut PixelBuffer {
        &mut self.buffer
    }

    fn compositor(&self) -> Compositor {
        Compositor::new(self.blend_mode).with_opacity(self.opacity)
    }

    /// Merge the stroke into a raster layer's committed pixels.  Returns the
    /// area that changed.
    pub fn commit_into(&self, paint: &mut PixelBuffer) -> Rect {
        let extent = self.buffer.extent();
        self.compositor().blit(paint, extent.top_left(), &self.buffer, extent);
        extent
    }

    /// Merge the stroke's alpha into selection weights, growing the mask to
    /// cover the stroke.  Returns the area that changed.
    pub fn commit_into_mask(&self, mask: &mut SelectionMask) -> Rect {
        let extent = self.buffer.extent();
        let bounds = mask.bounds() | extent;
        *mask = paint_indirect_mask(mask, self, bounds);
        extent
    }
}

impl IndirectPainting for StrokeOverlay {
    fn temporary_target(&self) -> Option<&PixelBuffer> {
        Some(&self.buffer)
    }

    fn temporary_blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    fn temporary_opacity(&self) -> Opacity {
        self.opacity
    }
}

/// A layer with no stroke in progress.
impl IndirectPainting for Option<StrokeOverlay> {
    fn temporary_target(&self) -> Option<&PixelBuffer> {
        self.as_ref().map(StrokeOverlay::buffer)
    }

    fn temporary_blend_mode(&self) -> BlendMode {
        self.as_ref().map_or(BlendMode::Normal, |o| o.blend_mode)
    }

    fn temporary_opacity(&self) -> Opacity {
        self.as_ref().map_or(OPACITY_OPAQUE, |o| o.opacity)
    }
}

/// Write `source` with the overlay of `support` blended over it into
/// `target`, for `rect` only.
///
/// The committed pixels are COPY-composited at full opacity first, then the
/// overlay is composited with its own mode and opacity.  Neither `source`
/// nor the overlay is modified.
pub fn paint_indirect(source: &PixelBuffer, target: &mut PixelBuffer, support: &impl IndirectPainting, rect: Rect) {
    if rect.is_empty() {
        return;
    }
    Compositor::new(BlendMode::Copy).blit(target, rect.top_left(), source, rect);
    if let Some(overlay) = support.temporary_target() {
        Compositor::new(support.temporary_blend_mode())
            .with_opacity(support.temporary_opacity())
            .blit(target, rect.top_left(), overlay, rect);
    }
}

/// The selection-weight equivalent of [`paint_indirect`]: a new mask over
/// `rect` holding `selection`'s weights with the overlay's alpha blended on
/// top.
pub fn paint_indirect_mask(selection: &SelectionMask, support: &impl IndirectPainting, rect: Rect) -> SelectionMask {
    let mut merged = SelectionMask::new(rect);
    let overlay = support.temporary_target();
    let mode = support.temporary_blend_mode();
    let opacity = support.temporary_opacity() as f32 / 255.0;

    for y in rect.rows() {
        for x in rect.columns() {
            let base = selection.weight_at(x, y);
            let weight = match overlay {
                Some(overlay) => {
                    let top = overlay.pixel(x, y)[3];
                    blend_pixel(Rgba([255, 255, 255, base]), Rgba([255, 255, 255, top]), mode, opacity, ChannelFlags::all())[3]
                }
                None => base,
            };
            merged.set_weight(x, y, weight);
        }
    }
    merged
}
