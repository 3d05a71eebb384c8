use serde::{Deserialize, Serialize};
use std::fmt;

/// A 2-D point. Units depend on context: normalized [0,1] inside a
/// [`Quadrilateral`], pixels once converted with [`Quadrilateral::to_pixel_corners`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

/// A document boundary in normalized coordinates.
///
/// Corners live in [0,1]×[0,1] with the origin at the **bottom-left** of the
/// frame and y growing upward, which is the convention rectangle detectors
/// report in. Use [`Quadrilateral::to_pixel_corners`] to get image-space
/// coordinates (origin top-left, y growing downward).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
    /// Detector-reported confidence (0.0–1.0).
    pub confidence: f32,
}

impl Quadrilateral {
    pub fn new(
        top_left: Point,
        top_right: Point,
        bottom_left: Point,
        bottom_right: Point,
        confidence: f32,
    ) -> Self {
        Self {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// The whole frame, with full confidence.
    pub fn full_frame() -> Self {
        Self::new(
            Point::new(0.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            1.0,
        )
    }

    /// Build from image-space pixel corners (origin top-left), given in
    /// `[top_left, top_right, bottom_left, bottom_right]` order.
    pub fn from_pixel_corners(corners: [Point; 4], width: u32, height: u32, confidence: f32) -> Self {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        let norm = |p: Point| Point::new(p.x / w, 1.0 - p.y / h);
        Self::new(
            norm(corners[0]),
            norm(corners[1]),
            norm(corners[2]),
            norm(corners[3]),
            confidence,
        )
    }

    /// Image-space pixel corners in `[top_left, top_right, bottom_left, bottom_right]` order.
    pub fn to_pixel_corners(&self, width: u32, height: u32) -> [Point; 4] {
        let (w, h) = (width as f32, height as f32);
        let px = |p: Point| Point::new(p.x * w, (1.0 - p.y) * h);
        [
            px(self.top_left),
            px(self.top_right),
            px(self.bottom_left),
            px(self.bottom_right),
        ]
    }

    /// Area as a fraction of the frame (shoelace formula over normalized corners).
    pub fn relative_area(&self) -> f32 {
        let ring = [self.top_left, self.top_right, self.bottom_right, self.bottom_left];
        let twice: f32 = (0..4)
            .map(|i| {
                let (a, b) = (ring[i], ring[(i + 1) % 4]);
                a.x * b.y - b.x * a.y
            })
            .sum();
        (twice / 2.0).abs()
    }

    /// Pixel edge lengths as `[top, right, bottom, left]`.
    pub fn edge_lengths(&self, width: u32, height: u32) -> [f32; 4] {
        let [tl, tr, bl, br] = self.to_pixel_corners(width, height);
        [tl.distance(tr), tr.distance(br), bl.distance(br), tl.distance(bl)]
    }

    /// Width over height in pixel space, each side averaged over its two opposite edges.
    pub fn aspect_ratio(&self, width: u32, height: u32) -> f32 {
        let [top, right, bottom, left] = self.edge_lengths(width, height);
        let quad_height = (left + right) / 2.0;
        if quad_height <= f32::EPSILON {
            return f32::INFINITY;
        }
        ((top + bottom) / 2.0) / quad_height
    }
}
