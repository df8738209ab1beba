//! Pixel-space geometry: extents and bounding boxes.
//!
//! All coordinates are in pixels with the origin at the top-left corner of
//! the image. A [`BBox`] is half-open: it covers `[x, x + width)` by
//! `[y, y + height)`.

use std::fmt;

/// A 2D size in pixels (columns × rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    /// Width in pixels (columns).
    pub width: u32,
    /// Height in pixels (rows).
    pub height: u32,
}

impl Extent {
    /// Creates a new extent.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Creates a square extent.
    pub const fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    /// Returns true if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered by this extent.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

/// An axis-aligned rectangular pixel region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BBox {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl BBox {
    /// Creates a box from its origin and size.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates a box from its min (inclusive) and max (exclusive) corners.
    ///
    /// Inverted corners produce an empty box.
    pub fn from_corners(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self::new(
            min_x,
            min_y,
            max_x.saturating_sub(min_x),
            max_y.saturating_sub(min_y),
        )
    }

    /// Creates a box covering a whole image of the given size.
    pub const fn from_extent(extent: Extent) -> Self {
        Self::new(0, 0, extent.width, extent.height)
    }

    /// Right edge (exclusive).
    pub fn max_x(&self) -> u32 {
        self.x + self.width
    }

    /// Bottom edge (exclusive).
    pub fn max_y(&self) -> u32 {
        self.y + self.height
    }

    /// Size of the box.
    pub fn extent(&self) -> Extent {
        Extent::new(self.width, self.height)
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.extent().area()
    }

    /// Returns true if the box covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true if the pixel `(px, py)` lies inside the box.
    pub fn contains_point(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.max_x() && py >= self.y && py < self.max_y()
    }

    /// Returns true if `other` lies entirely within this box.
    pub fn contains(&self, other: &BBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Returns true if the two boxes share at least one pixel.
    pub fn intersects(&self, other: &BBox) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Overlapping region of two boxes (empty if they are disjoint).
    pub fn intersection(&self, other: &BBox) -> BBox {
        BBox::from_corners(
            self.x.max(other.x),
            self.y.max(other.y),
            self.max_x().min(other.max_x()),
            self.max_y().min(other.max_y()),
        )
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) {}×{}",
            self.x, self.y, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_edges() {
        let bbox = BBox::new(10, 20, 5, 7);
        assert_eq!(bbox.max_x(), 15);
        assert_eq!(bbox.max_y(), 27);
        assert_eq!(bbox.area(), 35);
        assert_eq!(bbox.extent(), Extent::new(5, 7));
    }

    #[test]
    fn test_from_corners_inverted_is_empty() {
        let bbox = BBox::from_corners(10, 10, 5, 20);
        assert!(bbox.is_empty());
    }

    #[test]
    fn test_contains_point_is_half_open() {
        let bbox = BBox::new(0, 0, 10, 10);
        assert!(bbox.contains_point(0, 0));
        assert!(bbox.contains_point(9, 9));
        assert!(!bbox.contains_point(10, 9));
        assert!(!bbox.contains_point(9, 10));
    }

    #[test]
    fn test_contains_box() {
        let outer = BBox::new(0, 0, 25, 25);
        assert!(outer.contains(&BBox::new(20, 20, 5, 5)));
        assert!(!outer.contains(&BBox::new(20, 20, 10, 5)));
    }

    #[test]
    fn test_intersection() {
        let a = BBox::new(0, 0, 10, 10);
        let b = BBox::new(5, 5, 10, 10);
        assert_eq!(a.intersection(&b), BBox::new(5, 5, 5, 5));
        assert!(a.intersects(&b));

        let c = BBox::new(10, 0, 5, 5);
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_display() {
        assert_eq!(BBox::new(20, 20, 5, 5).to_string(), "(20, 20) 5×5");
        assert_eq!(Extent::new(256, 128).to_string(), "256×128");
    }
}
