use image::DynamicImage;
use std::sync::Arc;
use std::time::Duration;
use tillroll_core::StitchingConfig;
use tracing::{debug, warn};

use crate::detector::bounded;
use crate::recognizer::{RecognitionMode, TextRecognizer};

/// What the stitching planner needs to know about one image of a batch.
#[derive(Debug, Clone)]
pub struct ReceiptPartAnalysis {
    pub image: Arc<DynamicImage>,
    /// Position in the batch as captured.
    pub original_index: usize,
    pub has_receipt_content: bool,
    /// First few recognized text blocks, space-joined.
    pub sampled_text: String,
    /// Width over height.
    pub aspect_ratio: f32,
}

/// Flags receipt-looking images and samples their leading text.
#[derive(Clone)]
pub struct ReceiptPartAnalyzer {
    recognizer: Arc<dyn TextRecognizer>,
    min_text_regions: usize,
    sampled_blocks: usize,
    timeout: Duration,
}

impl ReceiptPartAnalyzer {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, config: &StitchingConfig, timeout: Duration) -> Self {
        Self {
            recognizer,
            min_text_regions: config.min_text_regions,
            sampled_blocks: config.sampled_blocks,
            timeout,
        }
    }

    /// Recognizer failures and timeouts count as "no text".
    pub async fn analyze(&self, image: Arc<DynamicImage>, original_index: usize) -> ReceiptPartAnalysis {
        let regions = match bounded(self.timeout, self.recognizer.detect_regions(&image)).await {
            Ok(regions) => regions.len(),
            Err(e) => {
                warn!(index = original_index, error = %e, "Text region detection failed");
                0
            }
        };

        let sampled_text = match bounded(self.timeout, self.recognizer.recognize(&image, RecognitionMode::Fast)).await {
            Ok(blocks) => blocks
                .iter()
                .take(self.sampled_blocks)
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            Err(e) => {
                warn!(index = original_index, error = %e, "Text sampling failed");
                String::new()
            }
        };

        let aspect_ratio = if image.height() == 0 {
            0.0
        } else {
            image.width() as f32 / image.height() as f32
        };
        let has_receipt_content = regions >= self.min_text_regions;
        debug!(index = original_index, regions, has_receipt_content, aspect_ratio, "Part analyzed");

        ReceiptPartAnalysis {
            image,
            original_index,
            has_receipt_content,
            sampled_text,
            aspect_ratio,
        }
    }
}
