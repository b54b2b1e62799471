// ============================================================================
// SELECTION SYSTEM — per-pixel inclusion weights
// ============================================================================

use image::{GrayImage, Luma};

use crate::geometry::Rect;

/// How a new selection shape interacts with the existing mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Clear any existing selection, then set the new shape.
    #[default]
    Replace,
    /// Union – add to the existing mask.
    Add,
    /// Difference – subtract from the existing mask.
    Subtract,
    /// Keep only pixels present in both the existing mask AND the new shape.
    Intersect,
}

/// Shape used to build or modify a selection, in image-space coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionShape {
    Rectangle(Rect),
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32 },
}

impl SelectionShape {
    /// Returns 255 if the pixel (x, y) is inside the shape, 0 otherwise.
    pub fn contains(&self, x: i32, y: i32) -> u8 {
        match self {
            SelectionShape::Rectangle(rect) => {
                if rect.contains(x, y) { 255 } else { 0 }
            }
            SelectionShape::Ellipse { cx, cy, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    return 0;
                }
                // Sample at the pixel centre.
                let dx = (x as f32 + 0.5 - cx) / rx;
                let dy = (y as f32 + 0.5 - cy) / ry;
                if dx * dx + dy * dy <= 1.0 { 255 } else { 0 }
            }
        }
    }

    /// Bounding box in pixel coordinates.
    pub fn bounds(&self) -> Rect {
        match self {
            SelectionShape::Rectangle(rect) => *rect,
            SelectionShape::Ellipse { cx, cy, rx, ry } => Rect::from_corners(
                (cx - rx).floor() as i32,
                (cy - ry).floor() as i32,
                (cx + rx).ceil() as i32,
                (cy + ry).ceil() as i32,
            ),
        }
    }
}

/// Single-channel weight buffer with its own image-space origin.
///
/// Weight 0 = unselected, 255 = fully selected.  Lookups outside the buffer
/// return 0, so everything beyond [`SelectionMask::bounds`] is excluded.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionMask {
    x: i32,
    y: i32,
    weights: GrayImage,
}

impl SelectionMask {
    /// Empty (nothing selected) mask covering `bounds`.
    pub fn new(bounds: Rect) -> Self {
        let (w, h) = if bounds.is_empty() {
            (0, 0)
        } else {
            (bounds.width as u32, bounds.height as u32)
        };
        Self { x: bounds.x, y: bounds.y, weights: GrayImage::new(w, h) }
    }

    /// Mask whose whole buffer is fully selected.
    pub fn from_rect(rect: Rect) -> Self {
        let mut mask = Self::new(rect);
        for p in mask.weights.pixels_mut() {
            *p = Luma([255]);
        }
        mask
    }

    /// Mask covering `bounds` with `shape` selected inside it.
    pub fn from_shape(bounds: Rect, shape: &SelectionShape) -> Self {
        let mut mask = Self::new(bounds);
        mask.apply_shape(shape, SelectionMode::Replace);
        mask
    }

    pub fn origin(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// Image-space extent of the weight buffer.
    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.weights.width() as i32, self.weights.height() as i32)
    }

    #[inline]
    pub fn weight_at(&self, x: i32, y: i32) -> u8 {
        let (lx, ly) = (x - self.x, y - self.y);
        if lx < 0 || ly < 0 || lx as u32 >= self.weights.width() || ly as u32 >= self.weights.height() {
            return 0;
        }
        self.weights.get_pixel(lx as u32, ly as u32).0[0]
    }

    /// Set one weight.  Writes outside [`SelectionMask::bounds`] are ignored.
    pub fn set_weight(&mut self, x: i32, y: i32, weight: u8) {
        if self.bounds().contains(x, y) {
            self.weights.put_pixel((x - self.x) as u32, (y - self.y) as u32, Luma([weight]));
        }
    }

    /// Bounding rect of every pixel with a non-zero weight.  Always inside
    /// [`SelectionMask::bounds`]; empty when nothing is selected.
    pub fn selected_rect(&self) -> Rect {
        let (mut x0, mut y0, mut x1, mut y1) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
        for (lx, ly, p) in self.weights.enumerate_pixels() {
            if p.0[0] > 0 {
                x0 = x0.min(lx as i32);
                y0 = y0.min(ly as i32);
                x1 = x1.max(lx as i32 + 1);
                y1 = y1.max(ly as i32 + 1);
            }
        }
        if x0 > x1 {
            return Rect::EMPTY;
        }
        Rect::from_corners(x0, y0, x1, y1).translated(self.x, self.y)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.pixels().all(|p| p.0[0] == 0)
    }

    /// Apply a selection shape to the mask according to `mode`.
    pub fn apply_shape(&mut self, shape: &SelectionShape, mode: SelectionMode) {
        let area = shape.bounds() & self.bounds();
        match mode {
            SelectionMode::Replace => {
                // Zero the whole mask first, then fill the shape.
                for p in self.weights.pixels_mut() {
                    *p = Luma([0]);
                }
                self.update_in(area, shape, |_, new| new);
            }
            SelectionMode::Add => self.update_in(area, shape, |old, new| old.max(new)),
            SelectionMode::Subtract => self.update_in(area, shape, |old, new| old.saturating_sub(new)),
            SelectionMode::Intersect => {
                // Keep only pixels inside BOTH the existing mask and the new shape.
                let old = self.clone();
                for p in self.weights.pixels_mut() {
                    *p = Luma([0]);
                }
                for y in area.rows() {
                    for x in area.columns() {
                        let shape_val = shape.contains(x, y);
                        let old_val = old.weight_at(x, y);
                        if shape_val > 0 && old_val > 0 {
                            self.set_weight(x, y, shape_val.min(old_val));
                        }
                    }
                }
            }
        }
    }

    fn update_in(&mut self, area: Rect, shape: &SelectionShape, combine: impl Fn(u8, u8) -> u8) {
        for y in area.rows() {
            for x in area.columns() {
                let new_val = shape.contains(x, y);
                if new_val > 0 {
                    let old = self.weight_at(x, y);
                    self.set_weight(x, y, combine(old, new_val));
                }
            }
        }
    }
}
