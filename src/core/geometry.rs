//! Rectangles in page space (points, 1/72 inch) and raster pixel space.
//!
//! Both spaces put the origin at the top-left corner with y growing
//! downwards, so a page rectangle converts to pixels by a single scale.

use serde::{Deserialize, Serialize};

/// Points per inch in page space.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Axis-aligned rectangle in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Rect {
    /// Left edge.
    pub x0: f64,
    /// Top edge.
    pub y0: f64,
    /// Right edge.
    pub x1: f64,
    /// Bottom edge.
    pub y1: f64,
}

impl From<[f64; 4]> for Rect {
    fn from([x0, y0, x1, y1]: [f64; 4]) -> Self {
        Self::new(x0, y0, x1, y1)
    }
}

impl From<Rect> for [f64; 4] {
    fn from(r: Rect) -> Self {
        [r.x0, r.y0, r.x1, r.y1]
    }
}

impl Rect {
    /// Builds a normalized rectangle (`x0 <= x1`, `y0 <= y1`).
    #[must_use]
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Horizontal extent.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    /// Vertical extent.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Width times height.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Midpoint as `(x, y)`.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// True for zero or negative width or height.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Overlap of positive area, if any.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        (x0 < x1 && y0 < y1).then_some(Self { x0, y0, x1, y1 })
    }

    /// Area of [`Rect::intersection`], zero when disjoint.
    #[must_use]
    pub fn intersection_area(&self, other: &Self) -> f64 {
        self.intersection(other).map_or(0.0, |r| r.area())
    }

    /// Smallest rectangle covering both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Euclidean gap between the closest edges; zero when touching or overlapping.
    #[must_use]
    pub fn gap(&self, other: &Self) -> f64 {
        let dx = (other.x0 - self.x1).max(self.x0 - other.x1).max(0.0);
        let dy = (other.y0 - self.y1).max(self.y0 - other.y1).max(0.0);
        dx.hypot(dy)
    }

    /// Clips the rectangle to `[0, width] x [0, height]`.
    #[must_use]
    pub fn clamp_to(&self, width: f64, height: f64) -> Self {
        Self {
            x0: self.x0.clamp(0.0, width),
            y0: self.y0.clamp(0.0, height),
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
        }
    }

    /// Pixel rectangle covering this page rectangle at `dpi`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn to_pixels(&self, dpi: u32) -> PixelRect {
        let dpi = f64::from(dpi);
        let to_px = |pt: f64| pt * dpi / POINTS_PER_INCH;
        let x0 = to_px(self.x0).floor().max(0.0);
        let y0 = to_px(self.y0).floor().max(0.0);
        let x1 = to_px(self.x1).ceil().max(x0);
        let y1 = to_px(self.y1).ceil().max(y0);
        PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        }
    }
}

/// Axis-aligned rectangle in raster pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelRect {
    /// Rectangle at `(x, y)` of `width` x `height` pixels.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Page rectangle covered by this pixel rectangle at `dpi`.
    #[must_use]
    pub fn to_page(&self, dpi: u32) -> Rect {
        let dpi = f64::from(dpi);
        let to_points = |px: u32| f64::from(px) * POINTS_PER_INCH / dpi;
        Rect::new(
            to_points(self.x),
            to_points(self.y),
            to_points(self.x + self.width),
            to_points(self.y + self.height),
        )
    }
}

/// Unions rectangles whose gap is at most `distance` until no pair qualifies.
///
/// Output order follows the first member of each merged group.
#[must_use]
pub fn merge_nearby(rects: &[Rect], distance: f64) -> Vec<Rect> {
    let mut merged: Vec<Rect> = rects.to_vec();
    loop {
        let mut changed = false;
        let mut out: Vec<Rect> = Vec::with_capacity(merged.len());
        for rect in merged {
            if let Some(existing) = out.iter_mut().find(|r| r.gap(&rect) <= distance) {
                *existing = existing.union(&rect);
                changed = true;
            } else {
                out.push(rect);
            }
        }
        merged = out;
        if !changed {
            return merged;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_corners() {
        let r = Rect::new(10.0, 20.0, 0.0, 5.0);
        assert_eq!(r, Rect::new(0.0, 5.0, 10.0, 20.0));
        assert!((r.area() - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn intersection_of_disjoint_is_none() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 20.0, 30.0, 30.0);
        assert!(a.intersection(&b).is_none());
        assert!(a.intersection_area(&b).abs() < f64::EPSILON);
        assert!((a.gap(&b) - 200.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn gap_is_zero_for_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 15.0, 15.0);
        assert!(a.gap(&b).abs() < f64::EPSILON);
        assert!((a.intersection_area(&b) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pixel_round_trip_at_300_dpi() {
        let page = Rect::new(72.0, 36.0, 144.0, 72.0);
        let px = page.to_pixels(300);
        assert_eq!(px, PixelRect::new(300, 150, 300, 150));
        assert_eq!(px.to_page(300), page);
    }

    #[test]
    fn to_pixels_covers_fractional_edges() {
        let px = Rect::new(0.5, 0.5, 1.5, 1.5).to_pixels(72);
        assert_eq!(px, PixelRect::new(0, 0, 2, 2));
    }

    #[test]
    fn merge_nearby_chains_transitively() {
        let rects = [
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(40.0, 0.0, 50.0, 10.0),
            Rect::new(13.0, 0.0, 37.0, 10.0),
        ];
        let merged = merge_nearby(&rects, 5.0);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0], Rect::new(0.0, 0.0, 50.0, 10.0));
    }

    #[test]
    fn merge_nearby_keeps_distant_rects() {
        let rects = [
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(100.0, 100.0, 110.0, 110.0),
        ];
        assert_eq!(merge_nearby(&rects, 5.0), rects.to_vec());
    }

    #[test]
    fn serde_uses_four_element_arrays() {
        let r = Rect::new(1.0, 2.0, 3.0, 4.0);
        let json = serde_json::to_string(&r).expect("serialize");
        assert_eq!(json, "[1.0,2.0,3.0,4.0]");
        let back: Rect = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, r);
    }
}
