pub mod analyzer;
pub mod codec;
pub mod contour;
pub mod detector;
pub mod enhance;
pub mod error;
pub mod hash;
pub mod perspective;
pub mod pipeline;
pub mod quality;
pub mod recognizer;
pub mod stitch;

pub use analyzer::{ReceiptPartAnalysis, ReceiptPartAnalyzer};
pub use contour::ContourRectangleDetector;
pub use detector::{DetectionRequest, DocumentDetector, MockRectangleDetector, RectangleDetector};
pub use enhance::{resize_to_fit, EnhancementPipeline, FilterStep};
pub use error::{ConditioningError, DetectionError};
pub use hash::{content_key, output_path};
pub use perspective::PerspectiveCorrector;
pub use pipeline::{is_image_path, spawn_intake_watcher, BatchOutcome, ProcessingResult, ReceiptConditioner};
pub use quality::{rectangle_quality, QualityAnalyzer, DOMINANT_COLOR_PLACEHOLDER};
pub use recognizer::{MockTextRecognizer, RecognitionMode, RecognizedText, TextRecognizer, TextRegion};
pub use stitch::{MultiPartResult, StitchingPlan, StitchingPlanner, Stitcher};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
