//! Screen-space geometry shared by recognition and device control.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in device pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance between two points.
    pub fn distance(lhs: Self, rhs: Self) -> f64 {
        (f64::from(rhs.x) - f64::from(lhs.x)).hypot(f64::from(rhs.y) - f64::from(lhs.y))
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An axis-aligned rectangle in device pixels.
///
/// Serialized as `[x, y, width, height]`, the layout used by task definitions.
/// Edge arithmetic saturates at the `i32` range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: i32,
    /// Height.
    pub height: i32,
}

impl Rect {
    /// Creates a rectangle.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// A rectangle with no width or no height.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Non-negative size, with both far edges representable as `i32`.
    pub fn is_valid(&self) -> bool {
        self.width >= 0
            && self.height >= 0
            && self.x.checked_add(self.width).is_some()
            && self.y.checked_add(self.height).is_some()
    }

    /// Right edge, exclusive.
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Bottom edge, exclusive.
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Returns `true` if `point` lies inside this rectangle (edges included).
    pub fn contains_point(&self, point: Point) -> bool {
        self.x <= point.x && self.y <= point.y && self.right() >= point.x && self.bottom() >= point.y
    }

    /// Center of the rectangle.
    pub fn center(&self) -> Point {
        Point::new(self.x.saturating_add(self.width / 2), self.y.saturating_add(self.height / 2))
    }

    /// Applies a `rect_move` offset: the origin is shifted by `offset.x/y`
    /// and the size is replaced by `offset.width/height`.
    #[must_use]
    pub fn move_by(&self, offset: Self) -> Self {
        Self::new(self.x.saturating_add(offset.x), self.y.saturating_add(offset.y), offset.width, offset.height)
    }
}

impl From<[i32; 4]> for Rect {
    fn from([x, y, width, height]: [i32; 4]) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<Rect> for [i32; 4] {
    fn from(rect: Rect) -> Self {
        [rect.x, rect.y, rect.width, rect.height]
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ {}, {}, {}, {} ]", self.x, self.y, self.width, self.height)
    }
}
