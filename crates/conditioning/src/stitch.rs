use image::{imageops, DynamicImage, Rgb, RgbImage};
use std::collections::BTreeSet;
use tillroll_core::StitchingConfig;
use tracing::{debug, info};

use crate::analyzer::ReceiptPartAnalysis;
use crate::enhance::EnhancementPipeline;

pub const REASON_INVALID_COUNT: &str = "invalid count for stitching";
pub const REASON_MISSING_CONTENT: &str = "not all images contain receipt content";
pub const REASON_NO_PATTERN: &str = "no clear stitching pattern detected";
pub const REASON_CONTINUATION: &str = "detected vertical receipt parts with text continuation";

/// Confidence reported for a batch returned as independent images.
pub const SEPARATE_CONFIDENCE: f32 = 0.95;

const BASE_STITCH_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Clone)]
pub struct StitchingPlan {
    pub should_stitch: bool,
    /// Parts in capture order. Only present when stitching.
    pub ordered_parts: Option<Vec<ReceiptPartAnalysis>>,
    pub reason: String,
}

impl StitchingPlan {
    fn reject(reason: &str) -> Self {
        Self { should_stitch: false, ordered_parts: None, reason: reason.to_string() }
    }
}

/// Terminal output of the batch path.
#[derive(Debug, Clone)]
pub struct MultiPartResult {
    /// Exactly one image when `is_stitched`.
    pub processed_images: Vec<DynamicImage>,
    pub is_stitched: bool,
    pub original_count: usize,
    pub confidence: f32,
    pub note: String,
}

/// Decides whether a batch is one long receipt shot in pieces.
#[derive(Debug, Clone)]
pub struct StitchingPlanner {
    config: StitchingConfig,
}

impl StitchingPlanner {
    pub fn new(config: StitchingConfig) -> Self {
        Self { config }
    }

    pub fn plan(&self, parts: &[ReceiptPartAnalysis]) -> StitchingPlan {
        let n = parts.len();
        if n < self.config.min_parts || n > self.config.max_parts {
            return StitchingPlan::reject(REASON_INVALID_COUNT);
        }
        if parts.iter().any(|p| !p.has_receipt_content) {
            return StitchingPlan::reject(REASON_MISSING_CONTENT);
        }
        if !parts.iter().all(|p| p.aspect_ratio < 1.0) {
            return StitchingPlan::reject(REASON_NO_PATTERN);
        }
        if !parts.iter().any(|p| !matched_keywords(&p.sampled_text, &self.config.keywords).is_empty()) {
            return StitchingPlan::reject(REASON_NO_PATTERN);
        }

        // Capture order is taken as top-to-bottom order; nothing checks it visually.
        let mut ordered = parts.to_vec();
        ordered.sort_by_key(|p| p.original_index);
        StitchingPlan {
            should_stitch: true,
            ordered_parts: Some(ordered),
            reason: REASON_CONTINUATION.to_string(),
        }
    }

    /// Confidence in a stitched result.
    pub fn confidence(&self, parts: &[ReceiptPartAnalysis]) -> f32 {
        if parts.is_empty() {
            return 0.0;
        }
        let n = parts.len() as f32;
        let mut confidence = BASE_STITCH_CONFIDENCE;

        let content_ratio = parts.iter().filter(|p| p.has_receipt_content).count() as f32 / n;
        if content_ratio < 1.0 {
            confidence *= content_ratio;
        }

        let mean = parts.iter().map(|p| p.aspect_ratio).sum::<f32>() / n;
        let variance = parts.iter().map(|p| (p.aspect_ratio - mean).powi(2)).sum::<f32>() / n;
        if variance > 0.3 * mean {
            confidence *= 0.85;
        }

        // Samples are joined in order so a phrase split across parts still counts.
        let combined = parts
            .iter()
            .map(|p| p.sampled_text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let keywords = matched_keywords(&combined, &self.config.keywords);
        if keywords.len() >= 2 {
            confidence = (confidence * 1.1).min(1.0);
        }

        confidence
    }
}

/// Keywords present in `text`, case-insensitively.
pub fn matched_keywords<'k>(text: &str, keywords: &'k [String]) -> BTreeSet<&'k str> {
    let lower = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| lower.contains(k.to_lowercase().as_str()))
        .map(String::as_str)
        .collect()
}

/// Enhances parts and either stacks them or returns them one by one.
#[derive(Debug, Clone)]
pub struct Stitcher {
    pipeline: EnhancementPipeline,
}

impl Stitcher {
    pub fn new(pipeline: EnhancementPipeline) -> Self {
        Self { pipeline }
    }

    pub fn stitch(&self, ordered: &[ReceiptPartAnalysis], confidence: f32, reason: &str) -> MultiPartResult {
        let enhanced: Vec<DynamicImage> = ordered.iter().map(|p| self.pipeline.run(&p.image)).collect();
        let stitched = concatenate_vertically(&enhanced);
        info!(
            parts = ordered.len(),
            width = stitched.width(),
            height = stitched.height(),
            confidence,
            "Stitched receipt parts"
        );
        MultiPartResult {
            processed_images: vec![stitched],
            is_stitched: true,
            original_count: ordered.len(),
            confidence,
            note: format!("Stitched {} parts: {reason}", ordered.len()),
        }
    }

    pub fn separate(&self, parts: &[ReceiptPartAnalysis], reason: &str) -> MultiPartResult {
        let mut sorted: Vec<&ReceiptPartAnalysis> = parts.iter().collect();
        sorted.sort_by_key(|p| p.original_index);
        let processed_images: Vec<DynamicImage> = sorted.iter().map(|p| self.pipeline.run(&p.image)).collect();
        debug!(parts = parts.len(), reason, "Processed parts independently");
        MultiPartResult {
            processed_images,
            is_stitched: false,
            original_count: parts.len(),
            confidence: SEPARATE_CONFIDENCE,
            note: format!("Processed {} images separately: {reason}", parts.len()),
        }
    }
}

/// Stack images top to bottom, left-aligned on a white canvas as wide as the
/// widest part. No overlap removal or alignment.
pub fn concatenate_vertically(images: &[DynamicImage]) -> DynamicImage {
    let width = images.iter().map(|i| i.width()).max().unwrap_or(0);
    let height = images.iter().map(|i| i.height()).sum();
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let mut y = 0i64;
    for img in images {
        imageops::replace(&mut canvas, &img.to_rgb8(), 0, y);
        y += img.height() as i64;
    }
    DynamicImage::ImageRgb8(canvas)
}
