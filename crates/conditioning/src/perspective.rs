use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tillroll_core::{Point, Quadrilateral};
use tracing::{debug, warn};

/// Rectifies a quadrilateral region into an axis-aligned image.
///
/// Works the same for detected and hand-adjusted corners. The output is as
/// wide as the longer of the top/bottom edges and as tall as the longer of
/// the left/right edges, so nothing is downsampled.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerspectiveCorrector;

impl PerspectiveCorrector {
    /// Warp `quad` onto a rectangle. Degenerate quads return the input unchanged.
    pub fn correct(&self, image: &DynamicImage, quad: &Quadrilateral) -> DynamicImage {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return image.clone();
        }

        let [tl, tr, bl, br] = quad.to_pixel_corners(width, height);
        let [top, right, bottom, left] = quad.edge_lengths(width, height);
        let out_w = top.max(bottom).round() as u32;
        let out_h = left.max(right).round() as u32;
        if out_w == 0 || out_h == 0 {
            warn!(out_w, out_h, "Quadrilateral collapses to nothing; skipping rectification");
            return image.clone();
        }

        let from = [(tl.x, tl.y), (tr.x, tr.y), (br.x, br.y), (bl.x, bl.y)];
        let (w, h) = (out_w as f32, out_h as f32);
        let to = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

        let Some(projection) = Projection::from_control_points(from, to) else {
            warn!("No projective transform for these corners; skipping rectification");
            return image.clone();
        };

        let source = image.to_rgba8();
        let mut output = RgbaImage::new(out_w, out_h);
        warp_into(
            &source,
            &projection,
            Interpolation::Bilinear,
            Rgba([255, 255, 255, 255]),
            &mut output,
        );

        debug!(width, height, out_w, out_h, "Perspective correction applied");
        DynamicImage::ImageRgba8(output)
    }

    /// Rectify using four normalized corners given as
    /// `[top_left, top_right, bottom_left, bottom_right]`.
    pub fn correct_corners(&self, image: &DynamicImage, corners: [Point; 4]) -> DynamicImage {
        let quad = Quadrilateral::new(corners[0], corners[1], corners[2], corners[3], 1.0);
        self.correct(image, &quad)
    }
}
