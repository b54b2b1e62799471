// ============================================================================
// PIXEL BUFFER – sparse 64×64 chunk storage, unbounded in every direction
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::geometry::Rect;

pub const CHUNK_SIZE: i32 = 64;

/// A pixel with zero alpha, returned for missing chunks.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

type ChunkKey = (i32, i32);

/// Sparse RGBA8 raster addressed in image-space coordinates.
///
/// Storage is a map of 64×64 chunks keyed by chunk coordinate.  Missing
/// chunks read as fully transparent.  Chunks are wrapped in `Arc` for
/// copy-on-write: [`PixelBuffer::snapshot`] only bumps reference counts and
/// the first write to a shared chunk clones just that chunk.
///
/// The buffer carries an offset (its origin in image space), so content can
/// be positioned without copying pixels.  The extent is the bounding rect of
/// everything ever written since the last full clear; partial clears never
/// shrink it.
#[derive(Clone, Default)]
pub struct PixelBuffer {
    offset_x: i32,
    offset_y: i32,
    chunks: HashMap<ChunkKey, Arc<RgbaImage>>,
    /// Written area in local (un-offset) coordinates.
    extent: Rect,
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("offset", &(self.offset_x, self.offset_y))
            .field("extent", &self.extent())
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

/// Mutable view of one chunk, handed out for parallel writes.
pub struct TileMut<'a> {
    origin: (i32, i32),
    image: &'a mut RgbaImage,
}

impl TileMut<'_> {
    /// Image-space area covered by this chunk.
    pub fn rect(&self) -> Rect {
        Rect::new(self.origin.0, self.origin.1, CHUNK_SIZE, CHUNK_SIZE)
    }

    /// Pixel at image-space `(x, y)`, which must lie inside [`TileMut::rect`].
    #[inline]
    pub fn pixel_mut(&mut self, x: i32, y: i32) -> &mut Rgba<u8> {
        self.image
            .get_pixel_mut((x - self.origin.0) as u32, (y - self.origin.1) as u32)
    }
}

impl PixelBuffer {
    // ---- construction -------------------------------------------------------

    /// Create an empty (fully transparent) buffer at the image origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer whose origin sits at `(x, y)` in image space.
    pub fn with_offset(x: i32, y: i32) -> Self {
        Self { offset_x: x, offset_y: y, ..Self::default() }
    }

    /// Buffer filled with `color` over `rect`.
    pub fn filled(rect: Rect, color: Rgba<u8>) -> Self {
        let mut buffer = Self::new();
        buffer.fill_rect(rect, color);
        buffer
    }

    /// Import a flat `RgbaImage` with its top-left corner at `(x, y)`.
    /// Only chunks holding a non-transparent pixel are stored; conversion is
    /// parallelised with rayon.
    pub fn from_rgba_image(x: i32, y: i32, src: &RgbaImage) -> Self {
        let mut buffer = Self::with_offset(x, y);
        let (w, h) = (src.width() as i32, src.height() as i32);
        if w == 0 || h == 0 {
            return buffer;
        }
        let chunks_x = (w + CHUNK_SIZE - 1) / CHUNK_SIZE;
        let chunks_y = (h + CHUNK_SIZE - 1) / CHUNK_SIZE;

        let built: Vec<(ChunkKey, Arc<RgbaImage>)> = (0..chunks_x * chunks_y)
            .into_par_iter()
            .filter_map(|flat| {
                let (cx, cy) = (flat % chunks_x, flat / chunks_x);
                let (base_x, base_y) = (cx * CHUNK_SIZE, cy * CHUNK_SIZE);
                let cw = CHUNK_SIZE.min(w - base_x) as u32;
                let ch = CHUNK_SIZE.min(h - base_y) as u32;
                let mut chunk = RgbaImage::new(CHUNK_SIZE as u32, CHUNK_SIZE as u32);
                let mut has_content = false;
                for ly in 0..ch {
                    for lx in 0..cw {
                        let px = *src.get_pixel(base_x as u32 + lx, base_y as u32 + ly);
                        has_content |= px[3] != 0;
                        chunk.put_pixel(lx, ly, px);
                    }
                }
                has_content.then(|| ((cx, cy), Arc::new(chunk)))
            })
            .collect();

        buffer.chunks.extend(built);
        buffer.extent = Rect::new(0, 0, w, h);
        buffer
    }

    // ---- geometry -----------------------------------------------------------

    pub fn offset(&self) -> (i32, i32) {
        (self.offset_x, self.offset_y)
    }

    /// Move the buffer (and its content) so its origin is at `(x, y)`.
    pub fn set_offset(&mut self, x: i32, y: i32) {
        self.offset_x = x;
        self.offset_y = y;
    }

    /// Image-space bounding rect of the written area.
    pub fn extent(&self) -> Rect {
        self.extent.translated(self.offset_x, self.offset_y)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of populated chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    // ---- indexing helpers ---------------------------------------------------

    #[inline(always)]
    fn to_local(&self, x: i32, y: i32) -> (i32, i32) {
        (x - self.offset_x, y - self.offset_y)
    }

    #[inline(always)]
    fn chunk_coord(lx: i32, ly: i32) -> ChunkKey {
        (lx.div_euclid(CHUNK_SIZE), ly.div_euclid(CHUNK_SIZE))
    }

    #[inline(always)]
    fn within_chunk(lx: i32, ly: i32) -> (u32, u32) {
        (lx.rem_euclid(CHUNK_SIZE) as u32, ly.rem_euclid(CHUNK_SIZE) as u32)
    }

    /// Chunk keys overlapping a local-space rect.
    fn keys_in(local: Rect) -> impl Iterator<Item = ChunkKey> {
        let (min_cx, min_cy) = Self::chunk_coord(local.left(), local.top());
        let (max_cx, max_cy) = Self::chunk_coord(local.right() - 1, local.bottom() - 1);
        (min_cy..=max_cy).flat_map(move |cy| (min_cx..=max_cx).map(move |cx| (cx, cy)))
    }

    // ---- pixel access -------------------------------------------------------

    /// Read the pixel at image-space `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> Rgba<u8> {
        let (lx, ly) = self.to_local(x, y);
        let (ix, iy) = Self::within_chunk(lx, ly);
        self.chunks
            .get(&Self::chunk_coord(lx, ly))
            .map_or(TRANSPARENT, |chunk| *chunk.get_pixel(ix, iy))
    }

    /// Write a pixel (creates the chunk on demand, COW-clones if shared).
    #[inline]
    pub fn put_pixel(&mut self, x: i32, y: i32, pixel: Rgba<u8>) {
        let (lx, ly) = self.to_local(x, y);
        let (ix, iy) = Self::within_chunk(lx, ly);
        let arc = self
            .chunks
            .entry(Self::chunk_coord(lx, ly))
            .or_insert_with(|| Arc::new(RgbaImage::new(CHUNK_SIZE as u32, CHUNK_SIZE as u32)));
        Arc::make_mut(arc).put_pixel(ix, iy, pixel);
        self.extent |= Rect::new(lx, ly, 1, 1);
    }

    /// Mutable chunk views covering `rect` (image space), created on demand.
    /// Each returned tile is disjoint from the others, so they can be written
    /// from separate threads.
    pub fn tiles_mut(&mut self, rect: Rect) -> Vec<TileMut<'_>> {
        if rect.is_empty() {
            return Vec::new();
        }
        let local = rect.translated(-self.offset_x, -self.offset_y);
        let keys: Vec<ChunkKey> = Self::keys_in(local).collect();
        for key in &keys {
            self.chunks
                .entry(*key)
                .or_insert_with(|| Arc::new(RgbaImage::new(CHUNK_SIZE as u32, CHUNK_SIZE as u32)));
        }
        self.extent |= local;

        let (ox, oy) = (self.offset_x, self.offset_y);
        let (min, max) = (keys[0], keys[keys.len() - 1]);
        self.chunks
            .iter_mut()
            .filter(|((cx, cy), _)| *cx >= min.0 && *cx <= max.0 && *cy >= min.1 && *cy <= max.1)
            .map(|(&(cx, cy), arc)| TileMut {
                origin: (cx * CHUNK_SIZE + ox, cy * CHUNK_SIZE + oy),
                image: Arc::make_mut(arc),
            })
            .collect()
    }

    // ---- bulk operations ----------------------------------------------------

    /// Fill every pixel of `rect` with `color`.
    pub fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        self.tiles_mut(rect).into_par_iter().for_each(|mut tile| {
            let area = tile.rect() & rect;
            for y in area.rows() {
                for x in area.columns() {
                    *tile.pixel_mut(x, y) = color;
                }
            }
        });
    }

    /// Make `rect` fully transparent.  Chunks that end up wholly inside the
    /// cleared area are dropped.
    pub fn clear_rect(&mut self, rect: Rect) {
        if rect.is_empty() || self.chunks.is_empty() {
            return;
        }
        if rect.contains_rect(&self.extent()) {
            self.clear();
            return;
        }
        let local = rect.translated(-self.offset_x, -self.offset_y);
        for key in Self::keys_in(local) {
            let chunk_rect = Rect::new(key.0 * CHUNK_SIZE, key.1 * CHUNK_SIZE, CHUNK_SIZE, CHUNK_SIZE);
            if local.contains_rect(&chunk_rect) {
                self.chunks.remove(&key);
                continue;
            }
            if let Some(arc) = self.chunks.get_mut(&key) {
                let chunk = Arc::make_mut(arc);
                let area = chunk_rect & local;
                for ly in area.rows() {
                    for lx in area.columns() {
                        let (ix, iy) = Self::within_chunk(lx, ly);
                        chunk.put_pixel(ix, iy, TRANSPARENT);
                    }
                }
            }
        }
    }

    /// Drop all chunks (make the buffer fully transparent).
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.extent = Rect::EMPTY;
    }

    /// Copy `rect` out into a tightly packed `RgbaImage`.  Iterates only the
    /// overlapping chunks and copies whole rows at a time.
    pub fn read_rect(&self, rect: Rect) -> RgbaImage {
        if rect.is_empty() {
            return RgbaImage::new(0, 0);
        }
        let mut out = RgbaImage::new(rect.width as u32, rect.height as u32);
        let local = rect.translated(-self.offset_x, -self.offset_y);
        let out_stride = rect.width as usize * 4;
        let chunk_stride = CHUNK_SIZE as usize * 4;
        for key in Self::keys_in(local) {
            let Some(chunk) = self.chunks.get(&key) else {
                continue; // transparent – already zeroed
            };
            let chunk_rect = Rect::new(key.0 * CHUNK_SIZE, key.1 * CHUNK_SIZE, CHUNK_SIZE, CHUNK_SIZE);
            let overlap = chunk_rect & local;
            let run = overlap.width as usize * 4;
            let raw = chunk.as_raw();
            let out_raw: &mut [u8] = &mut out;
            for ly in overlap.rows() {
                let src_start = (ly - chunk_rect.top()) as usize * chunk_stride
                    + (overlap.left() - chunk_rect.left()) as usize * 4;
                let dst_start = (ly - local.top()) as usize * out_stride
                    + (overlap.left() - local.left()) as usize * 4;
                out_raw[dst_start..dst_start + run].copy_from_slice(&raw[src_start..src_start + run]);
            }
        }
        out
    }

    /// Overwrite the area starting at image-space `(x, y)` with `src`.
    pub fn write_rect(&mut self, x: i32, y: i32, src: &RgbaImage) {
        let rect = Rect::new(x, y, src.width() as i32, src.height() as i32);
        self.tiles_mut(rect).into_par_iter().for_each(|mut tile| {
            let area = tile.rect() & rect;
            for py in area.rows() {
                for px in area.columns() {
                    *tile.pixel_mut(px, py) = *src.get_pixel((px - x) as u32, (py - y) as u32);
                }
            }
        });
    }

    /// Cheap copy sharing every chunk until one side writes to it.
    pub fn snapshot(&self) -> PixelBuffer {
        self.clone()
    }

    /// Full, independent duplication of every chunk.  Nothing is shared with
    /// `self` afterwards.
    pub fn duplicate(&self) -> PixelBuffer {
        PixelBuffer {
            offset_x: self.offset_x,
            offset_y: self.offset_y,
            chunks: self
                .chunks
                .iter()
                .map(|(key, chunk)| (*key, Arc::new(RgbaImage::clone(chunk))))
                .collect(),
            extent: self.extent,
        }
    }

    /// True when both buffers hold identical pixels over `rect`.
    pub fn same_pixels(&self, other: &PixelBuffer, rect: Rect) -> bool {
        rect.rows()
            .all(|y| rect.columns().all(|x| self.pixel(x, y) == other.pixel(x, y)))
    }

    /// True when `self` and `other` point at the same chunk storage for the
    /// chunk containing `(x, y)`.
    pub fn shares_chunk_with(&self, other: &PixelBuffer, x: i32, y: i32) -> bool {
        let (lx, ly) = self.to_local(x, y);
        let (ox, oy) = other.to_local(x, y);
        match (
            self.chunks.get(&Self::chunk_coord(lx, ly)),
            other.chunks.get(&Self::chunk_coord(ox, oy)),
        ) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
