use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tillroll_core::{
    ConditioningConfig, Point, Preset, ProcessingType, QualityAnalysis, QualityIssue, Quadrilateral,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::analyzer::{ReceiptPartAnalysis, ReceiptPartAnalyzer};
use crate::codec;
use crate::detector::{DocumentDetector, RectangleDetector};
use crate::enhance::{resize_to_fit, EnhancementPipeline};
use crate::error::ConditioningError;
use crate::perspective::PerspectiveCorrector;
use crate::quality::QualityAnalyzer;
use crate::recognizer::TextRecognizer;
use crate::stitch::{MultiPartResult, StitchingPlanner, Stitcher};

/// The result of conditioning one image.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub image: DynamicImage,
    /// Quality confidence of the original capture.
    pub overall_confidence: f32,
    pub processing_type: ProcessingType,
    pub detected_quadrilateral: Option<Quadrilateral>,
    pub quality_issues: Vec<QualityIssue>,
    pub can_adjust_manually: bool,
    pub is_stitched: bool,
    pub processed_at: DateTime<Utc>,
}

/// What a gallery batch turns into. A batch of one takes the single-image path.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Single(ProcessingResult),
    MultiPart(MultiPartResult),
}

/// Orchestrates detection → rectification → enhancement → quality scoring for
/// single captures, and analysis → planning → stitching for batches.
///
/// Holds no per-call state; one instance can serve concurrent callers.
#[derive(Clone)]
pub struct ReceiptConditioner {
    config: ConditioningConfig,
    detector: DocumentDetector,
    quality: QualityAnalyzer,
    parts: ReceiptPartAnalyzer,
    planner: StitchingPlanner,
    stitcher: Stitcher,
    corrector: PerspectiveCorrector,
    receipt: EnhancementPipeline,
    transmission: EnhancementPipeline,
}

impl ReceiptConditioner {
    pub fn new(
        config: ConditioningConfig,
        rectangles: Arc<dyn RectangleDetector>,
        text: Arc<dyn TextRecognizer>,
    ) -> Self {
        let timeout = config.detection_timeout();
        let detector = DocumentDetector::new(rectangles, &config.detection, timeout);
        let receipt = EnhancementPipeline::from_config(&config.receipt);
        Self {
            quality: QualityAnalyzer::new(detector.clone()),
            parts: ReceiptPartAnalyzer::new(text, &config.stitching, timeout),
            planner: StitchingPlanner::new(config.stitching.clone()),
            stitcher: Stitcher::new(receipt.clone()),
            corrector: PerspectiveCorrector,
            transmission: EnhancementPipeline::from_config(&config.ocr_optimized),
            receipt,
            detector,
            config,
        }
    }

    pub fn config(&self) -> &ConditioningConfig {
        &self.config
    }

    pub fn enhance(&self, image: &DynamicImage, preset: Preset) -> DynamicImage {
        match preset {
            Preset::Receipt => self.receipt.run(image),
            Preset::OcrOptimized => self.transmission.run(image),
        }
    }

    pub async fn analyze_quality(&self, image: &DynamicImage) -> QualityAnalysis {
        self.quality.analyze(image).await
    }

    pub fn crop_to_document(&self, image: &DynamicImage, quad: &Quadrilateral) -> DynamicImage {
        self.corrector.correct(image, quad)
    }

    /// Rectify using hand-adjusted corners `[top_left, top_right, bottom_left, bottom_right]`.
    pub fn apply_perspective_correction(&self, image: &DynamicImage, corners: [Point; 4]) -> DynamicImage {
        self.corrector.correct_corners(image, corners)
    }

    pub async fn process_single(&self, image: &DynamicImage, processing_type: ProcessingType) -> ProcessingResult {
        let detected = self.detector.detect(image).await;
        let rectified = match &detected {
            Some(quad) => self.corrector.correct(image, quad),
            None => image.clone(),
        };
        let enhanced = self.receipt.run(&rectified);

        // Scored on the capture as taken, reusing the detection above.
        let quality = self.quality.analyze_with_detection(image, detected);

        info!(
            kind = %processing_type,
            width = enhanced.width(),
            height = enhanced.height(),
            confidence = quality.confidence,
            issues = ?quality.issue_tags(),
            "Processed single image"
        );

        ProcessingResult {
            image: enhanced,
            overall_confidence: quality.confidence,
            processing_type,
            detected_quadrilateral: quality.quadrilateral,
            quality_issues: quality.issues,
            can_adjust_manually: quality.can_adjust,
            is_stitched: false,
            processed_at: Utc::now(),
        }
    }

    /// Condition a gallery selection. Each image is analyzed concurrently;
    /// planning waits for every analysis.
    pub async fn process_batch(&self, mut images: Vec<DynamicImage>) -> BatchOutcome {
        if images.len() == 1 {
            if let Some(image) = images.pop() {
                return BatchOutcome::Single(self.process_single(&image, ProcessingType::GallerySingle).await);
            }
        }

        let analyses: Vec<ReceiptPartAnalysis> = join_all(
            images
                .into_iter()
                .enumerate()
                .map(|(index, image)| self.parts.analyze(Arc::new(image), index)),
        )
        .await;

        let plan = self.planner.plan(&analyses);
        info!(parts = analyses.len(), should_stitch = plan.should_stitch, reason = %plan.reason, "Stitching plan");

        let result = match plan.ordered_parts {
            Some(ordered) if plan.should_stitch => {
                let confidence = self.planner.confidence(&ordered);
                self.stitcher.stitch(&ordered, confidence, &plan.reason)
            }
            _ => self.stitcher.separate(&analyses, &plan.reason),
        };
        BatchOutcome::MultiPart(result)
    }

    /// Downscale to the transmission limit, then run the OCR-oriented chain.
    pub fn optimize_for_transmission(&self, image: &DynamicImage) -> DynamicImage {
        let fitted = resize_to_fit(image, self.config.max_transmission_dimension);
        self.transmission.run(&fitted)
    }

    // ── Byte-level entry points ──────────────────────────────────────────────

    pub async fn process_single_bytes(
        &self,
        data: &[u8],
        processing_type: ProcessingType,
    ) -> Result<ProcessingResult, ConditioningError> {
        let image = codec::decode(data)?;
        Ok(self.process_single(&image, processing_type).await)
    }

    /// Enhanced PNG bytes, or `data` unchanged if anything goes wrong.
    pub fn enhance_bytes_or_original(&self, data: &[u8]) -> Vec<u8> {
        let enhanced = codec::decode(data).and_then(|img| codec::encode_png(&self.receipt.run(&img)));
        match enhanced {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Enhancement failed; returning original bytes");
                data.to_vec()
            }
        }
    }

    /// JPEG bytes ready for upload.
    pub fn prepare_for_transmission_bytes(&self, data: &[u8]) -> Result<Vec<u8>, ConditioningError> {
        let image = codec::decode(data)?;
        let optimized = self.optimize_for_transmission(&image);
        codec::encode_jpeg(&optimized, self.config.transmission_jpeg_quality)
    }
}

// ── Watch-folder integration ──────────────────────────────────────────────────

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "tif", "tiff", "bmp", "gif"];

pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Spawn a notify watcher on `watch_dir` that sends new image paths to `tx`.
/// Watching stops when the returned watcher is dropped.
pub fn spawn_intake_watcher(
    watch_dir: &Path,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<impl notify::Watcher> {
    use notify::{EventKind, RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        if let Ok(ev) = event {
            if matches!(ev.kind, EventKind::Create(_)) {
                for path in ev.paths.into_iter().filter(|p| is_image_path(p)) {
                    let _ = tx.try_send(path);
                }
            }
        }
    })?;

    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::MockRectangleDetector;
    use crate::recognizer::MockTextRecognizer;
    use image::{GenericImageView, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

    fn conditioner(rectangles: MockRectangleDetector, text: MockTextRecognizer) -> ReceiptConditioner {
        ReceiptConditioner::new(ConditioningConfig::default(), Arc::new(rectangles), Arc::new(text))
    }

    fn stripes(width: u32, height: u32, dark: u8, light: u8) -> DynamicImage {
        let img: GrayImage = ImageBuffer::from_fn(width, height, |x, _| Luma([if x % 2 == 0 { dark } else { light }]));
        DynamicImage::ImageLuma8(img)
    }

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([180, 170, 160])))
    }

    fn middle_half() -> Quadrilateral {
        Quadrilateral::new(
            Point::new(0.25, 1.0),
            Point::new(0.75, 1.0),
            Point::new(0.25, 0.0),
            Point::new(0.75, 0.0),
            0.9,
        )
    }

    fn png(img: &DynamicImage) -> Vec<u8> {
        codec::encode_png(img).unwrap()
    }

    #[tokio::test]
    async fn detected_document_is_rectified() {
        let c = conditioner(MockRectangleDetector::new(vec![middle_half()]), MockTextRecognizer::default());
        let result = c.process_single(&stripes(200, 100, 90, 200), ProcessingType::Camera).await;
        assert_eq!(result.image.dimensions(), (100, 100));
        assert_eq!(result.detected_quadrilateral, Some(middle_half()));
        assert!(result.can_adjust_manually);
        assert!(!result.is_stitched);
        assert_eq!(result.processing_type, ProcessingType::Camera);
    }

    #[tokio::test]
    async fn missing_document_keeps_full_frame() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::default());
        let result = c.process_single(&stripes(120, 160, 90, 200), ProcessingType::DocumentScan).await;
        assert_eq!(result.image.dimensions(), (120, 160));
        assert!(result.detected_quadrilateral.is_none());
        assert!(!result.can_adjust_manually);
        assert_eq!(result.quality_issues, vec![QualityIssue::NoDocumentBoundary]);
    }

    #[tokio::test]
    async fn low_light_capture_without_document() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::default());
        let result = c.process_single(&stripes(100, 100, 0, 77), ProcessingType::Camera).await;
        assert!((result.overall_confidence - 0.65).abs() < 1e-5);
        let tags: Vec<&str> = result.quality_issues.iter().map(|i| i.as_str()).collect();
        assert_eq!(tags, vec!["low lighting", "no document boundary"]);
        assert!(!result.can_adjust_manually);
    }

    #[tokio::test]
    async fn batch_of_one_matches_single_path() {
        let c = conditioner(MockRectangleDetector::new(vec![middle_half()]), MockTextRecognizer::default());
        let img = stripes(200, 100, 60, 210);
        let single = c.process_single(&img, ProcessingType::GallerySingle).await;
        let BatchOutcome::Single(batched) = c.process_batch(vec![img]).await else {
            panic!("batch of one should take the single-image path");
        };
        assert_eq!(batched.image.to_rgb8(), single.image.to_rgb8());
        assert_eq!(batched.overall_confidence, single.overall_confidence);
        assert_eq!(batched.quality_issues, single.quality_issues);
        assert_eq!(batched.detected_quadrilateral, single.detected_quadrilateral);
        assert_eq!(batched.processing_type, ProcessingType::GallerySingle);
    }

    #[tokio::test]
    async fn tall_parts_with_total_are_stitched() {
        let c = conditioner(
            MockRectangleDetector::empty(),
            MockTextRecognizer::new(4, ["ACME", "Coffee 3.00", "TOTAL 3.00"]),
        );
        let outcome = c.process_batch(vec![solid(52, 100), solid(50, 100), solid(55, 100)]).await;
        let BatchOutcome::MultiPart(result) = outcome else {
            panic!("expected a multi-part result");
        };
        assert!(result.is_stitched);
        assert_eq!(result.original_count, 3);
        assert_eq!(result.processed_images.len(), 1);
        assert_eq!(result.processed_images[0].dimensions(), (55, 300));
        assert!((result.confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn parts_without_text_are_kept_separate() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::new(2, ["total"]));
        let outcome = c.process_batch(vec![solid(50, 100), solid(50, 100), solid(50, 100)]).await;
        let BatchOutcome::MultiPart(result) = outcome else {
            panic!("expected a multi-part result");
        };
        assert!(!result.is_stitched);
        assert_eq!(result.processed_images.len(), 3);
        assert_eq!(result.confidence, 0.95);
        assert!(result.note.contains("not all images contain receipt content"));
    }

    #[tokio::test]
    async fn five_parts_are_never_stitched() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::new(5, ["total"]));
        let images = (0..5).map(|_| solid(40, 100)).collect();
        let BatchOutcome::MultiPart(result) = c.process_batch(images).await else {
            panic!("expected a multi-part result");
        };
        assert!(!result.is_stitched);
        assert_eq!(result.processed_images.len(), 5);
        assert!(result.note.contains("invalid count for stitching"));
    }

    #[tokio::test]
    async fn empty_batch_is_an_empty_result() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::default());
        let BatchOutcome::MultiPart(result) = c.process_batch(Vec::new()).await else {
            panic!("expected a multi-part result");
        };
        assert!(result.processed_images.is_empty());
        assert_eq!(result.original_count, 0);
    }

    #[test]
    fn transmission_downscales_large_images_only() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::default());
        let large = c.optimize_for_transmission(&solid(2500, 500));
        assert_eq!(large.width(), 2048);
        assert!(large.height() < 500);

        let small = c.optimize_for_transmission(&solid(300, 200));
        assert_eq!(small.dimensions(), (300, 200));
    }

    #[test]
    fn manual_full_frame_correction_keeps_size() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::default());
        let img = solid(64, 48);
        let corners = [Point::new(0.0, 1.0), Point::new(1.0, 1.0), Point::new(0.0, 0.0), Point::new(1.0, 0.0)];
        assert_eq!(c.apply_perspective_correction(&img, corners).dimensions(), (64, 48));
        assert_eq!(c.crop_to_document(&img, &Quadrilateral::full_frame()).dimensions(), (64, 48));
    }

    #[test]
    fn presets_produce_different_output() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::default());
        let img = solid(16, 16);
        let receipt = c.enhance(&img, Preset::Receipt).to_rgb8();
        let ocr = c.enhance(&img, Preset::OcrOptimized).to_rgb8();
        assert_ne!(receipt, ocr);
        // OCR preset is fully desaturated.
        let p = ocr.get_pixel(8, 8);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[tokio::test]
    async fn undecodable_bytes_are_an_error() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::default());
        let err = c.process_single_bytes(b"not an image", ProcessingType::Camera).await.unwrap_err();
        assert!(matches!(err, ConditioningError::UndecodableImage(_)));
        assert!(c.prepare_for_transmission_bytes(b"nope").is_err());
    }

    #[tokio::test]
    async fn decodable_bytes_are_processed() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::default());
        let result = c.process_single_bytes(&png(&solid(30, 40)), ProcessingType::Camera).await.unwrap();
        assert_eq!(result.image.dimensions(), (30, 40));
    }

    #[test]
    fn enhance_bytes_falls_back_to_original() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::default());
        let garbage = b"\x00\x01garbage".to_vec();
        assert_eq!(c.enhance_bytes_or_original(&garbage), garbage);

        let enhanced = c.enhance_bytes_or_original(&png(&solid(8, 8)));
        assert_eq!(codec::decode(&enhanced).unwrap().dimensions(), (8, 8));
    }

    #[test]
    fn transmission_bytes_are_jpeg() {
        let c = conditioner(MockRectangleDetector::empty(), MockTextRecognizer::default());
        let bytes = c.prepare_for_transmission_bytes(&png(&solid(40, 30))).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn intake_accepts_only_images() {
        assert!(is_image_path(Path::new("/tmp/scan.JPG")));
        assert!(is_image_path(Path::new("receipt.png")));
        assert!(!is_image_path(Path::new("notes.txt")));
        assert!(!is_image_path(Path::new("no_extension")));
    }
}
