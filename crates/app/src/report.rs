use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tillroll_conditioning::{MultiPartResult, ProcessingResult};
use tillroll_core::{ProcessingType, QualityIssue, Quadrilateral};

/// JSON summary of one conditioned image.
#[derive(Debug, Serialize)]
pub struct SingleReport {
    pub source: PathBuf,
    pub output: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transmission: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
    pub processing_type: ProcessingType,
    pub quality_issues: Vec<QualityIssue>,
    pub detected_quadrilateral: Option<Quadrilateral>,
    pub can_adjust_manually: bool,
    pub processed_at: DateTime<Utc>,
}

impl SingleReport {
    pub fn new(source: PathBuf, output: PathBuf, transmission: Option<PathBuf>, result: &ProcessingResult) -> Self {
        Self {
            source,
            output,
            transmission,
            width: result.image.width(),
            height: result.image.height(),
            confidence: result.overall_confidence,
            processing_type: result.processing_type.clone(),
            quality_issues: result.quality_issues.clone(),
            detected_quadrilateral: result.detected_quadrilateral,
            can_adjust_manually: result.can_adjust_manually,
            processed_at: result.processed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub sources: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub is_stitched: bool,
    pub original_count: usize,
    pub confidence: f32,
    pub note: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl BatchReport {
    pub fn new(sources: Vec<PathBuf>, outputs: Vec<PathBuf>, result: &MultiPartResult) -> Self {
        Self {
            sources,
            outputs,
            is_stitched: result.is_stitched,
            original_count: result.original_count,
            confidence: result.confidence,
            note: result.note.clone(),
            warning: None,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }
}

/// Either shape, tagged so consumers can tell them apart.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    Single(SingleReport),
    Batch(BatchReport),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn result() -> ProcessingResult {
        ProcessingResult {
            image: DynamicImage::new_rgb8(30, 40),
            overall_confidence: 0.65,
            processing_type: ProcessingType::Camera,
            detected_quadrilateral: None,
            quality_issues: vec![QualityIssue::LowLighting, QualityIssue::NoDocumentBoundary],
            can_adjust_manually: false,
            is_stitched: false,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn single_report_serializes_issue_tags() {
        let report = Report::Single(SingleReport::new("in.jpg".into(), "out.png".into(), None, &result()));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "single");
        assert_eq!(json["processing_type"], "camera");
        assert_eq!(json["width"], 30);
        assert_eq!(json["quality_issues"][0], "low lighting");
        assert_eq!(json["quality_issues"][1], "no document boundary");
        assert!(json.get("transmission").is_none());
    }

    #[test]
    fn batch_report_carries_note() {
        let multi = MultiPartResult {
            processed_images: vec![DynamicImage::new_rgb8(10, 30)],
            is_stitched: true,
            original_count: 3,
            confidence: 0.8,
            note: "Stitched 3 parts".into(),
        };
        let report = Report::Batch(BatchReport::new(vec![], vec!["s.png".into()], &multi));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "batch");
        assert_eq!(json["is_stitched"], true);
        assert_eq!(json["original_count"], 3);
        assert!(json.get("warning").is_none());
    }
}
