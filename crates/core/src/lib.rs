pub mod config;
pub mod geometry;
pub mod processing;
pub mod quality;

pub use config::{
    ConditioningConfig, ConfigError, DetectionConstraints, EnhancementConfig, Preset,
    StitchingConfig,
};
pub use geometry::{Point, Quadrilateral};
pub use processing::ProcessingType;
pub use quality::{QualityAnalysis, QualityIssue};
