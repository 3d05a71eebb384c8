use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::Quadrilateral;

/// A problem found while scoring a capture. Serialized as its human-readable tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityIssue {
    #[serde(rename = "low lighting")]
    LowLighting,
    #[serde(rename = "overexposed")]
    Overexposed,
    #[serde(rename = "blurry")]
    Blurry,
    #[serde(rename = "no document boundary")]
    NoDocumentBoundary,
    #[serde(rename = "low-confidence detection")]
    LowConfidenceDetection,
    #[serde(rename = "unusual aspect ratio")]
    UnusualAspectRatio,
}

impl QualityIssue {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityIssue::LowLighting => "low lighting",
            QualityIssue::Overexposed => "overexposed",
            QualityIssue::Blurry => "blurry",
            QualityIssue::NoDocumentBoundary => "no document boundary",
            QualityIssue::LowConfidenceDetection => "low-confidence detection",
            QualityIssue::UnusualAspectRatio => "unusual aspect ratio",
        }
    }

    /// Amount subtracted from the running confidence when this issue is raised.
    pub fn penalty(self) -> f32 {
        match self {
            QualityIssue::LowLighting => 0.2,
            QualityIssue::Overexposed => 0.1,
            QualityIssue::Blurry => 0.25,
            QualityIssue::NoDocumentBoundary => 0.15,
            QualityIssue::LowConfidenceDetection => 0.10,
            QualityIssue::UnusualAspectRatio => 0.05,
        }
    }
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics for a single capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAnalysis {
    /// Overall capture quality (0.0–1.0).
    pub confidence: f32,
    /// Issues in the order they were detected.
    pub issues: Vec<QualityIssue>,
    pub quadrilateral: Option<Quadrilateral>,
    /// True iff a document boundary was found and can be refined by hand.
    pub can_adjust: bool,
}

impl QualityAnalysis {
    pub fn new(confidence: f32, issues: Vec<QualityIssue>, quadrilateral: Option<Quadrilateral>) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
            issues,
            can_adjust: quadrilateral.is_some(),
            quadrilateral,
        }
    }

    pub fn has_issue(&self, issue: QualityIssue) -> bool {
        self.issues.contains(&issue)
    }

    /// Issue tags as strings, in detection order.
    pub fn issue_tags(&self) -> Vec<&'static str> {
        self.issues.iter().map(|i| i.as_str()).collect()
    }
}
