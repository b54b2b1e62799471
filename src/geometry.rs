// ============================================================================
// GEOMETRY — integer image-space rectangles and clean/dirty regions
// ============================================================================

use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Range};

/// Axis-aligned rectangle in image-space pixel coordinates.
///
/// `right()` and `bottom()` are exclusive.  A rectangle with zero (or
/// negative) width or height is empty and means "nothing to do".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const EMPTY: Rect = Rect { x: 0, y: 0, width: 0, height: 0 };

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from exclusive corner coordinates.
    pub fn from_corners(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        if right <= left || bottom <= top {
            return Self::EMPTY;
        }
        Self::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top))
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    /// Exclusive right edge, saturating at `i32::MAX`.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `i32::MAX`.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn top_left(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() { 0 } else { self.width as i64 * self.height as i64 }
    }

    pub fn rows(&self) -> Range<i32> {
        self.top()..self.bottom()
    }

    pub fn columns(&self) -> Range<i32> {
        self.left()..self.right()
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left() && x < self.right() && y >= self.top() && y < self.bottom()
    }

    /// True when `other` lies entirely inside `self`.  Empty rectangles are
    /// contained in everything.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.left() >= self.left()
                && other.top() >= self.top()
                && other.right() <= self.right()
                && other.bottom() <= self.bottom())
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect::from_corners(
            self.left().max(other.left()),
            self.top().max(other.top()),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        )
    }

    /// Bounding rectangle of both.  Empty operands are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return if other.is_empty() { Rect::EMPTY } else { *other };
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_corners(
            self.left().min(other.left()),
            self.top().min(other.top()),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x.saturating_add(dx), self.y.saturating_add(dy), self.width, self.height)
    }

    /// Grow by `amount` on every side.
    pub fn inflate(&self, amount: i32) -> Rect {
        Rect::from_corners(
            self.left().saturating_sub(amount),
            self.top().saturating_sub(amount),
            self.right().saturating_add(amount),
            self.bottom().saturating_add(amount),
        )
    }

    /// The parts of `self` not covered by `other`, as at most four disjoint
    /// rectangles (top band, bottom band, left and right slivers).
    pub fn subtract(&self, other: &Rect) -> Vec<Rect> {
        if self.is_empty() {
            return Vec::new();
        }
        let cut = self.intersect(other);
        if cut.is_empty() {
            return vec![*self];
        }
        let pieces = [
            Rect::from_corners(self.left(), self.top(), self.right(), cut.top()),
            Rect::from_corners(self.left(), cut.bottom(), self.right(), self.bottom()),
            Rect::from_corners(self.left(), cut.top(), cut.left(), cut.bottom()),
            Rect::from_corners(cut.right(), cut.top(), self.right(), cut.bottom()),
        ];
        pieces.into_iter().filter(|r| !r.is_empty()).collect()
    }
}

impl BitAnd for Rect {
    type Output = Rect;
    fn bitand(self, rhs: Rect) -> Rect {
        self.intersect(&rhs)
    }
}

impl BitAndAssign for Rect {
    fn bitand_assign(&mut self, rhs: Rect) {
        *self = self.intersect(&rhs);
    }
}

impl BitOr for Rect {
    type Output = Rect;
    fn bitor(self, rhs: Rect) -> Rect {
        self.union(&rhs)
    }
}

impl BitOrAssign for Rect {
    fn bitor_assign(&mut self, rhs: Rect) {
        *self = self.union(&rhs);
    }
}

// ============================================================================
// REGION — exact union of rectangles, stored as disjoint pieces
// ============================================================================

/// An exact pixel set built from rectangles.
///
/// Used for a node's clean region: adding a rectangle never rounds up to a
/// bounding box, so the region always covers exactly the pixels added.
#[derive(Clone, Debug, Default)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.add(rect);
        region
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Disjoint pieces making up the region.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    pub fn clear(&mut self) {
        self.rects.clear();
    }

    pub fn add(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        let mut pending = vec![rect];
        for existing in &self.rects {
            pending = pending.iter().flat_map(|piece| piece.subtract(existing)).collect();
            if pending.is_empty() {
                return;
            }
        }
        self.rects.extend(pending);
    }

    pub fn remove(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        self.rects = self.rects.iter().flat_map(|piece| piece.subtract(&rect)).collect();
    }

    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.rects.iter().any(|r| r.contains(x, y))
    }

    pub fn contains_rect(&self, rect: &Rect) -> bool {
        let mut rest = vec![*rect];
        for piece in &self.rects {
            rest = rest.iter().flat_map(|r| r.subtract(piece)).collect();
            if rest.is_empty() {
                return true;
            }
        }
        rest.iter().all(Rect::is_empty)
    }
}

/// Two regions are equal when they cover the same pixels, regardless of how
/// the pieces happen to be split.
impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.area() == other.area() && other.rects.iter().all(|r| self.contains_rect(r))
    }
}

impl Eq for Region {}
