use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::dilate;
use imageproc::point::Point as PixelPoint;
use tillroll_core::{Point, Quadrilateral};
use tracing::debug;

use crate::detector::{DetectionRequest, RectangleDetector};
use crate::error::DetectionError;

/// Built-in rectangle backend: blur → Canny → dilate → outer contours →
/// polygon approximation, keeping convex four-sided shapes.
///
/// Confidence is how well the raw contour fills its four-corner
/// approximation, so ragged blobs score low and clean paper edges score
/// close to 1.
#[derive(Debug, Clone)]
pub struct ContourRectangleDetector {
    /// Longest side the image is shrunk to before edge detection.
    pub working_size: u32,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Douglas–Peucker tolerance as a fraction of the contour perimeter.
    pub approximation_epsilon: f64,
}

impl Default for ContourRectangleDetector {
    fn default() -> Self {
        Self {
            working_size: 512,
            blur_sigma: 1.5,
            canny_low: 30.0,
            canny_high: 90.0,
            approximation_epsilon: 0.02,
        }
    }
}

impl ContourRectangleDetector {
    pub fn find_quadrilaterals(&self, image: &DynamicImage, request: &DetectionRequest) -> Vec<Quadrilateral> {
        let (width, height) = image.dimensions();
        if width < 3 || height < 3 {
            return Vec::new();
        }

        let small = if width.max(height) > self.working_size {
            image.resize(self.working_size, self.working_size, FilterType::Triangle)
        } else {
            image.clone()
        };
        let gray = small.to_luma8();
        let blurred = gaussian_blur_f32(&gray, self.blur_sigma);
        let edges = canny(&blurred, self.canny_low, self.canny_high);
        // Close one-pixel gaps so each paper edge forms a single contour.
        let closed = dilate(&edges, Norm::LInf, 1);
        let (sw, sh) = closed.dimensions();

        let contours = find_contours::<i32>(&closed);
        let total = contours.len();
        let mut quads: Vec<Quadrilateral> = contours
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.points.len() >= 4)
            .filter_map(|c| {
                let perimeter = arc_length(&c.points, true);
                let mut approx = approximate_polygon_dp(&c.points, self.approximation_epsilon * perimeter, true);
                if approx.len() > 1 && approx.first() == approx.last() {
                    approx.pop();
                }
                if approx.len() != 4 {
                    return None;
                }
                let corners = order_corners(&approx)?;
                if !is_convex(&corners) {
                    return None;
                }
                let ring = [corners[0], corners[1], corners[3], corners[2]];
                let quad_area = polygon_area(&ring);
                if quad_area <= f32::EPSILON {
                    return None;
                }
                let contour_points: Vec<Point> = c.points.iter().map(to_point).collect();
                let contour_area = polygon_area(&contour_points);
                let fill = (contour_area / quad_area).min(quad_area / contour_area.max(f32::EPSILON));
                Some(Quadrilateral::from_pixel_corners(corners, sw, sh, fill))
            })
            .filter(|q| request.accepts(q, width, height))
            .collect();

        quads.sort_by(|a, b| b.relative_area().total_cmp(&a.relative_area()));
        quads.truncate(request.max_candidates);
        debug!(contours = total, quads = quads.len(), "Contour rectangle search finished");
        quads
    }
}

#[async_trait]
impl RectangleDetector for ContourRectangleDetector {
    async fn detect(
        &self,
        image: &DynamicImage,
        request: &DetectionRequest,
    ) -> Result<Vec<Quadrilateral>, DetectionError> {
        // CPU-bound; run off the async workers so the caller's timeout can fire.
        let detector = self.clone();
        let image = image.clone();
        let request = *request;
        tokio::task::spawn_blocking(move || detector.find_quadrilaterals(&image, &request))
            .await
            .map_err(|e| DetectionError::Backend(e.to_string()))
    }
}

fn to_point(p: &PixelPoint<i32>) -> Point {
    Point::new(p.x as f32, p.y as f32)
}

/// Sort four pixel-space vertices into `[top_left, top_right, bottom_left, bottom_right]`.
fn order_corners(vertices: &[PixelPoint<i32>]) -> Option<[Point; 4]> {
    let pts: Vec<Point> = vertices.iter().map(to_point).collect();
    let pick = |key: &dyn Fn(&Point) -> f32, smallest: bool| -> usize {
        let mut idx: Vec<usize> = (0..pts.len()).collect();
        idx.sort_by(|&a, &b| key(&pts[a]).total_cmp(&key(&pts[b])));
        if smallest { idx[0] } else { idx[idx.len() - 1] }
    };
    let tl = pick(&|p| p.x + p.y, true);
    let br = pick(&|p| p.x + p.y, false);
    let tr = pick(&|p| p.y - p.x, true);
    let bl = pick(&|p| p.y - p.x, false);

    let mut seen = [tl, tr, bl, br];
    seen.sort_unstable();
    if seen.windows(2).any(|w| w[0] == w[1]) {
        return None;
    }
    Some([pts[tl], pts[tr], pts[bl], pts[br]])
}

fn is_convex(corners: &[Point; 4]) -> bool {
    let ring = [corners[0], corners[1], corners[3], corners[2]];
    let signs: Vec<f32> = (0..4)
        .map(|i| {
            let (a, b, c) = (ring[i], ring[(i + 1) % 4], ring[(i + 2) % 4]);
            (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x)
        })
        .collect();
    signs.iter().all(|&s| s > 0.0) || signs.iter().all(|&s| s < 0.0)
}

fn polygon_area(ring: &[Point]) -> f32 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f32 = (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    (twice / 2.0).abs()
}
