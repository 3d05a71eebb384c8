use image::{DynamicImage, ImageBuffer, Luma, Rgb};
use tillroll_core::{QualityAnalysis, QualityIssue, Quadrilateral};
use tracing::debug;

use crate::detector::DocumentDetector;

type Luma32FImage = ImageBuffer<Luma<f32>, Vec<f32>>;

const DARK_LUMINANCE: f32 = 0.3;
const BRIGHT_LUMINANCE: f32 = 0.8;
const SHARPNESS_SCALE: f32 = 10.0;
const MIN_SHARPNESS: f32 = 0.4;
const MIN_RECTANGLE_QUALITY: f32 = 0.7;

/// Fixed stand-in returned by [`QualityAnalyzer::dominant_color`].
pub const DOMINANT_COLOR_PLACEHOLDER: Rgb<u8> = Rgb([255, 255, 255]);

/// Scores a capture's exposure, focus, framing and detectability.
#[derive(Clone)]
pub struct QualityAnalyzer {
    detector: DocumentDetector,
}

impl QualityAnalyzer {
    pub fn new(detector: DocumentDetector) -> Self {
        Self { detector }
    }

    pub async fn analyze(&self, image: &DynamicImage) -> QualityAnalysis {
        let detected = self.detector.detect(image).await;
        self.analyze_with_detection(image, detected)
    }

    /// Score `image` given an already-run document detection.
    pub fn analyze_with_detection(&self, image: &DynamicImage, detected: Option<Quadrilateral>) -> QualityAnalysis {
        let (width, height) = (image.width(), image.height());
        let luma = image.to_luma32f();
        let mut issues = Vec::new();

        let brightness = central_luminance(&luma);
        if brightness < DARK_LUMINANCE {
            issues.push(QualityIssue::LowLighting);
        } else if brightness > BRIGHT_LUMINANCE {
            issues.push(QualityIssue::Overexposed);
        }

        let sharpness = sharpness(&luma);
        if sharpness < MIN_SHARPNESS {
            issues.push(QualityIssue::Blurry);
        }

        let rect_quality = detected.map(|q| rectangle_quality(&q, width, height));
        match rect_quality {
            None => issues.push(QualityIssue::NoDocumentBoundary),
            Some(score) if score < MIN_RECTANGLE_QUALITY => issues.push(QualityIssue::LowConfidenceDetection),
            Some(_) => {}
        }

        let aspect = if height == 0 { 0.0 } else { width as f32 / height as f32 };
        if !(0.5..=2.0).contains(&aspect) {
            issues.push(QualityIssue::UnusualAspectRatio);
        }

        let confidence = issues.iter().fold(1.0f32, |c, issue| c - issue.penalty());
        debug!(brightness, sharpness, rect_quality, aspect, confidence, "Quality analysis finished");
        QualityAnalysis::new(confidence, issues, detected)
    }

    /// Placeholder: always [`DOMINANT_COLOR_PLACEHOLDER`]. No colour sampling is done.
    pub fn dominant_color(&self, _image: &DynamicImage) -> Rgb<u8> {
        DOMINANT_COLOR_PLACEHOLDER
    }
}

/// How trustworthy a detected boundary looks, starting from the detector's
/// own confidence.
pub fn rectangle_quality(quad: &Quadrilateral, width: u32, height: u32) -> f32 {
    let mut score = quad.confidence;

    if quad.relative_area() < 0.1 {
        score *= 0.5;
    }

    let aspect = quad.aspect_ratio(width, height);
    if !(0.33..=3.0).contains(&aspect) {
        score *= 0.7;
    }

    let edges = quad.edge_lengths(width, height);
    let mean = edges.iter().sum::<f32>() / 4.0;
    if mean > 0.0 && edges.iter().any(|e| (e - mean).abs() / mean > 0.5) {
        score *= 0.8;
    }

    score
}

/// Mean luminance of the central 50%×50% window.
fn central_luminance(luma: &Luma32FImage) -> f32 {
    let (w, h) = luma.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }
    let (x0, y0) = (w / 4, h / 4);
    let (x1, y1) = ((w * 3 / 4).max(x0 + 1), (h * 3 / 4).max(y0 + 1));
    let mut sum = 0.0f64;
    for y in y0..y1 {
        for x in x0..x1 {
            sum += luma.get_pixel(x, y)[0] as f64;
        }
    }
    (sum / ((x1 - x0) as f64 * (y1 - y0) as f64)) as f32
}

/// Standard deviation of the 4-neighbour Laplacian response, scaled and
/// clamped to [0,1]. Flat or defocused frames score near zero.
fn sharpness(luma: &Luma32FImage) -> f32 {
    let (w, h) = luma.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let at = |x: u32, y: u32| luma.get_pixel(x, y)[0] as f64;
    let (mut sum, mut sum_sq, mut n) = (0.0f64, 0.0f64, 0.0f64);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let r = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += r;
            sum_sq += r * r;
            n += 1.0;
        }
    }
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    ((variance.sqrt() as f32) * SHARPNESS_SCALE).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::MockRectangleDetector;
    use image::GrayImage;
    use std::sync::Arc;
    use std::time::Duration;
    use tillroll_core::{DetectionConstraints, Point};

    fn analyzer(mock: MockRectangleDetector) -> QualityAnalyzer {
        QualityAnalyzer::new(DocumentDetector::new(
            Arc::new(mock),
            &DetectionConstraints::default(),
            Duration::from_millis(200),
        ))
    }

    fn gray(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> DynamicImage {
        let img: GrayImage = ImageBuffer::from_fn(width, height, |x, y| Luma([f(x, y)]));
        DynamicImage::ImageLuma8(img)
    }

    /// One-pixel stripes: maximal high-frequency content.
    fn stripes(width: u32, height: u32, dark: u8, light: u8) -> DynamicImage {
        gray(width, height, |x, _| if x % 2 == 0 { dark } else { light })
    }

    fn detected(confidence: f32) -> MockRectangleDetector {
        MockRectangleDetector::new(vec![Quadrilateral::new(
            Point::new(0.05, 0.95),
            Point::new(0.95, 0.95),
            Point::new(0.05, 0.05),
            Point::new(0.95, 0.05),
            confidence,
        )])
    }

    #[tokio::test]
    async fn low_light_sharp_without_document() {
        // Mean luminance ≈ 0.15.
        let img = stripes(100, 100, 0, 77);
        let a = analyzer(MockRectangleDetector::empty()).analyze(&img).await;
        assert!((a.confidence - 0.65).abs() < 1e-5, "confidence {}", a.confidence);
        assert_eq!(a.issue_tags(), vec!["low lighting", "no document boundary"]);
        assert!(!a.can_adjust);
        assert!(a.quadrilateral.is_none());
    }

    #[tokio::test]
    async fn clean_capture_scores_full_confidence() {
        let img = stripes(100, 120, 100, 220);
        let a = analyzer(detected(0.95)).analyze(&img).await;
        assert!(a.issues.is_empty(), "issues {:?}", a.issues);
        assert_eq!(a.confidence, 1.0);
        assert!(a.can_adjust);
    }

    #[tokio::test]
    async fn flat_frame_is_blurry() {
        let img = gray(80, 80, |_, _| 128);
        let a = analyzer(detected(0.9)).analyze(&img).await;
        assert_eq!(a.issues, vec![QualityIssue::Blurry]);
        assert!((a.confidence - 0.75).abs() < 1e-6);
    }

    #[tokio::test]
    async fn bright_frame_is_overexposed() {
        let img = stripes(80, 80, 200, 255);
        let a = analyzer(detected(0.9)).analyze(&img).await;
        assert_eq!(a.issues, vec![QualityIssue::Overexposed]);
        assert!((a.confidence - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn weak_detection_is_flagged_but_adjustable() {
        let img = stripes(400, 400, 100, 220);
        let wide = Quadrilateral::new(
            Point::new(0.0, 0.6),
            Point::new(1.0, 0.6),
            Point::new(0.0, 0.28),
            Point::new(1.0, 0.28),
            0.9,
        );
        // 400 × 128 px: aspect 3.125 → ×0.7, irregular edges → ×0.8.
        let a = analyzer(MockRectangleDetector::new(vec![wide])).analyze(&img).await;
        assert_eq!(a.issues, vec![QualityIssue::LowConfidenceDetection]);
        assert!(a.can_adjust);
        assert!((a.confidence - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn panoramic_frame_has_unusual_aspect() {
        let img = stripes(300, 100, 100, 220);
        let a = analyzer(MockRectangleDetector::empty()).analyze(&img).await;
        assert_eq!(
            a.issues,
            vec![QualityIssue::NoDocumentBoundary, QualityIssue::UnusualAspectRatio]
        );
        assert!((a.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn confidence_never_goes_negative() {
        // Dark, flat, no document, extreme aspect: 1 - 0.2 - 0.25 - 0.15 - 0.05.
        let img = gray(400, 20, |_, _| 10);
        let a = analyzer(MockRectangleDetector::empty()).analyze(&img).await;
        assert_eq!(a.issues.len(), 4);
        assert!(a.confidence >= 0.0 && a.confidence <= 1.0);
        assert!((a.confidence - 0.35).abs() < 1e-5);
    }

    #[test]
    fn rectangle_quality_penalties() {
        let regular = Quadrilateral::full_frame();
        assert!((rectangle_quality(&regular, 100, 100) - 1.0).abs() < 1e-6);

        // Tiny square: area 0.04 → ×0.5.
        let tiny = Quadrilateral::new(
            Point::new(0.4, 0.6),
            Point::new(0.6, 0.6),
            Point::new(0.4, 0.4),
            Point::new(0.6, 0.4),
            1.0,
        );
        assert!((rectangle_quality(&tiny, 100, 100) - 0.5).abs() < 1e-6);

        // Full-width 20% strip: aspect 5 → ×0.7, edges 100/20 → ×0.8.
        let strip = Quadrilateral::new(
            Point::new(0.0, 0.6),
            Point::new(1.0, 0.6),
            Point::new(0.0, 0.4),
            Point::new(1.0, 0.4),
            1.0,
        );
        assert!((rectangle_quality(&strip, 100, 100) - 0.56).abs() < 1e-5);
    }

    #[test]
    fn dominant_color_is_placeholder() {
        let a = analyzer(MockRectangleDetector::empty());
        assert_eq!(a.dominant_color(&gray(4, 4, |_, _| 0)), DOMINANT_COLOR_PLACEHOLDER);
    }

    #[test]
    fn tiny_images_do_not_panic() {
        let a = analyzer(MockRectangleDetector::empty());
        let one = gray(1, 1, |_, _| 200);
        let result = a.analyze_with_detection(&one, None);
        assert!(result.has_issue(QualityIssue::Blurry));
        let empty = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        let result = a.analyze_with_detection(&empty, None);
        assert!(result.confidence >= 0.0);
    }
}
