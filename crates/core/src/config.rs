use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Which enhancement chain to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Display-oriented chain used for every processed output.
    Receipt,
    /// Transmission-only tail: harder contrast, desaturated, stronger sharpening.
    OcrOptimized,
}

impl std::str::FromStr for Preset {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "receipt" => Ok(Preset::Receipt),
            "ocr" | "ocr_optimized" | "ocr-optimized" => Ok(Preset::OcrOptimized),
            other => Err(format!("Unknown preset: '{other}'")),
        }
    }
}

/// Per-step parameters of the enhancement chain.
///
/// Overriding a preset in TOML requires all six parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnhancementConfig {
    /// Exposure change in EV stops.
    pub exposure_adjustment: f32,
    /// Additive brightness on the [0,1] scale.
    pub brightness_boost: f32,
    pub contrast_multiplier: f32,
    /// Unsharp-mask strength applied to luminance.
    pub sharpness_amount: f32,
    /// Saturation multiplier (1.0 = unchanged, 0.0 = grayscale).
    pub saturation: f32,
    pub noise_reduction_amount: f32,
}

impl EnhancementConfig {
    pub fn receipt() -> Self {
        Self {
            exposure_adjustment: 0.5,
            brightness_boost: 0.1,
            contrast_multiplier: 1.2,
            sharpness_amount: 0.6,
            saturation: 1.0,
            noise_reduction_amount: 0.02,
        }
    }

    pub fn ocr_optimized() -> Self {
        Self {
            exposure_adjustment: 0.0,
            brightness_boost: 0.0,
            contrast_multiplier: 1.3,
            sharpness_amount: 0.8,
            saturation: 0.0,
            noise_reduction_amount: 0.0,
        }
    }
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self::receipt()
    }
}

/// Acceptance rules for document-boundary candidates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConstraints {
    pub max_candidates: usize,
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    /// Minimum area as a fraction of the frame.
    pub min_relative_size: f32,
    pub min_confidence: f32,
}

impl Default for DetectionConstraints {
    fn default() -> Self {
        Self {
            max_candidates: 5,
            min_aspect_ratio: 0.2,
            max_aspect_ratio: 5.0,
            min_relative_size: 0.3,
            min_confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchingConfig {
    pub min_parts: usize,
    pub max_parts: usize,
    /// Text regions an image needs before it counts as receipt content.
    pub min_text_regions: usize,
    /// Recognized text blocks concatenated into each part's sample.
    pub sampled_blocks: usize,
    /// Lower-case markers that suggest a receipt continues across shots.
    pub keywords: Vec<String>,
}

impl Default for StitchingConfig {
    fn default() -> Self {
        Self {
            min_parts: 2,
            max_parts: 4,
            min_text_regions: 3,
            sampled_blocks: 3,
            keywords: ["total", "subtotal", "tax", "receipt", "store", "$", "thank you"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

/// Top-level settings for the conditioning pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditioningConfig {
    pub detection: DetectionConstraints,
    /// Upper bound on a single call into a detection/recognition backend.
    pub detection_timeout_ms: u64,
    /// Longest side allowed for images handed to the OCR service.
    pub max_transmission_dimension: u32,
    pub transmission_jpeg_quality: u8,
    pub stitching: StitchingConfig,
    pub receipt: EnhancementConfig,
    pub ocr_optimized: EnhancementConfig,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConstraints::default(),
            detection_timeout_ms: 10_000,
            max_transmission_dimension: 2048,
            transmission_jpeg_quality: 85,
            stitching: StitchingConfig::default(),
            receipt: EnhancementConfig::receipt(),
            ocr_optimized: EnhancementConfig::ocr_optimized(),
        }
    }
}

impl ConditioningConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ConditioningConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }

    pub fn preset(&self, preset: Preset) -> &EnhancementConfig {
        match preset {
            Preset::Receipt => &self.receipt,
            Preset::OcrOptimized => &self.ocr_optimized,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if d.max_candidates == 0 {
            return Err(ConfigError::Invalid("detection.max_candidates must be at least 1".into()));
        }
        if d.min_aspect_ratio > d.max_aspect_ratio {
            return Err(ConfigError::Invalid(format!(
                "detection aspect range is empty: [{}, {}]",
                d.min_aspect_ratio, d.max_aspect_ratio
            )));
        }
        let s = &self.stitching;
        if s.min_parts > s.max_parts {
            return Err(ConfigError::Invalid(format!(
                "stitching part range is empty: [{}, {}]",
                s.min_parts, s.max_parts
            )));
        }
        if self.max_transmission_dimension == 0 {
            return Err(ConfigError::Invalid("max_transmission_dimension must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_receipt_tuning() {
        let c = ConditioningConfig::default();
        assert_eq!(c.detection.max_candidates, 5);
        assert_eq!(c.detection.min_relative_size, 0.3);
        assert_eq!(c.max_transmission_dimension, 2048);
        assert_eq!(c.stitching.keywords.len(), 7);
        assert_eq!(c.receipt.contrast_multiplier, 1.2);
        assert_eq!(c.ocr_optimized.saturation, 0.0);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ConditioningConfig::from_toml(
            r#"
            detection_timeout_ms = 2500

            [detection]
            min_confidence = 0.8

            [ocr_optimized]
            exposure_adjustment = 0.0
            brightness_boost = 0.0
            contrast_multiplier = 1.4
            sharpness_amount = 0.8
            saturation = 0.0
            noise_reduction_amount = 0.0
            "#,
        )
        .unwrap();
        assert_eq!(c.detection_timeout(), Duration::from_millis(2500));
        assert_eq!(c.detection.min_confidence, 0.8);
        assert_eq!(c.detection.max_candidates, 5);
        assert_eq!(c.ocr_optimized.contrast_multiplier, 1.4);
        assert_eq!(c.ocr_optimized.sharpness_amount, 0.8);
        assert_eq!(c.receipt, EnhancementConfig::receipt());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(ConditioningConfig::from_toml("").unwrap(), ConditioningConfig::default());
    }

    #[test]
    fn incomplete_preset_is_parse_error() {
        let err = ConditioningConfig::from_toml("[receipt]\ncontrast_multiplier = 1.5\n");
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let err = ConditioningConfig::from_toml("[stitching]\nmin_parts = 5\nmax_parts = 2\n");
        assert!(matches!(err, Err(ConfigError::Invalid(_))));

        let err = ConditioningConfig::from_toml("[detection]\nmax_candidates = 0\n");
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            ConditioningConfig::from_toml("detection = ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tillroll.toml");
        std::fs::write(&path, "max_transmission_dimension = 1600\n").unwrap();
        let c = ConditioningConfig::load(&path).unwrap();
        assert_eq!(c.max_transmission_dimension, 1600);

        assert!(matches!(
            ConditioningConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn preset_from_str() {
        use std::str::FromStr;
        assert_eq!(Preset::from_str("receipt").unwrap(), Preset::Receipt);
        assert_eq!(Preset::from_str("OCR").unwrap(), Preset::OcrOptimized);
        assert!(Preset::from_str("vivid").is_err());
    }
}
