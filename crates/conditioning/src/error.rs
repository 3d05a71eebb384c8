use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConditioningError {
    #[error("Input cannot be decoded as an image: {0}")]
    UndecodableImage(#[from] image::ImageError),
    #[error("Failed to encode processed image: {0}")]
    Encode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of an external detection or recognition backend.
///
/// Never surfaced by the pipeline itself: every caller degrades these to
/// "nothing found".
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("Detection timed out after {0:?}")]
    Timeout(Duration),
    #[error("Detection backend error: {0}")]
    Backend(String),
    #[error("Recognition backend unavailable (missing engine or language data)")]
    NotAvailable,
}
