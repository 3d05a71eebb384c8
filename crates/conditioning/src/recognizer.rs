use async_trait::async_trait;
use image::DynamicImage;
use tillroll_core::Quadrilateral;

use crate::error::DetectionError;

#[cfg(any(feature = "tesseract", test))]
use std::collections::VecDeque;
#[cfg(any(feature = "tesseract", test))]
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Speed/accuracy trade-off requested from a text recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionMode {
    Fast,
    Accurate,
}

/// A block of recognized text, in reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    pub confidence: f32,
}

/// A region that looks like text. `bounds` is `None` for backends that only
/// report line structure.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    pub bounds: Option<Quadrilateral>,
    pub confidence: f32,
}

/// Abstraction over a text detection/recognition backend.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn detect_regions(&self, image: &DynamicImage) -> Result<Vec<TextRegion>, DetectionError>;

    async fn recognize(
        &self,
        image: &DynamicImage,
        mode: RecognitionMode,
    ) -> Result<Vec<RecognizedText>, DetectionError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Reports a fixed number of regions and a pre-set list of text blocks,
/// regardless of the image.
#[derive(Debug, Clone, Default)]
pub struct MockTextRecognizer {
    pub regions: usize,
    pub blocks: Vec<String>,
    pub fail: bool,
}

impl MockTextRecognizer {
    pub fn new<I, S>(regions: usize, blocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            regions,
            blocks: blocks.into_iter().map(Into::into).collect(),
            fail: false,
        }
    }

    /// A backend whose every call errors.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }
}

#[async_trait]
impl TextRecognizer for MockTextRecognizer {
    async fn detect_regions(&self, _image: &DynamicImage) -> Result<Vec<TextRegion>, DetectionError> {
        if self.fail {
            return Err(DetectionError::Backend("mock failure".into()));
        }
        Ok((0..self.regions)
            .map(|_| TextRegion { bounds: None, confidence: 0.9 })
            .collect())
    }

    async fn recognize(
        &self,
        _image: &DynamicImage,
        _mode: RecognitionMode,
    ) -> Result<Vec<RecognizedText>, DetectionError> {
        if self.fail {
            return Err(DetectionError::Backend("mock failure".into()));
        }
        Ok(self
            .blocks
            .iter()
            .map(|text| RecognizedText { text: text.clone(), confidence: 0.9 })
            .collect())
    }
}

// ── Per-image result cache ────────────────────────────────────────────────────

/// Key identifying an image by size and pixel content.
#[cfg(any(feature = "tesseract", test))]
pub(crate) fn image_key(image: &DynamicImage) -> String {
    format!("{}x{}-{}", image.width(), image.height(), crate::hash::content_key(image.as_bytes()))
}

/// Small FIFO of recent engine outputs, so region detection and recognition
/// on the same image share one engine pass.
#[cfg(any(feature = "tesseract", test))]
pub(crate) struct PassCache<V> {
    entries: Mutex<VecDeque<(String, V)>>,
    capacity: usize,
}

#[cfg(any(feature = "tesseract", test))]
impl<V: Clone> PassCache<V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { entries: Mutex::new(VecDeque::with_capacity(capacity)), capacity: capacity.max(1) }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<(String, V)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self, key: &str) -> Option<V> {
        self.entries().iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    pub(crate) fn insert(&self, key: String, value: V) {
        let mut entries = self.entries();
        entries.retain(|(k, _)| *k != key);
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back((key, value));
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{image_key, PassCache, RecognitionMode, RecognizedText, TextRecognizer, TextRegion};
    use crate::error::DetectionError;
    use async_trait::async_trait;
    use image::DynamicImage;
    use leptess::LepTess;

    /// Enough for a full gallery batch analyzed concurrently.
    const CACHED_PASSES: usize = 8;

    type Pass = (Vec<String>, f32);

    /// Tesseract has no fast/accurate switch and reports lines without
    /// geometry here, so every non-empty line is one region and one block.
    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
        passes: PassCache<Pass>,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string(), passes: PassCache::new(CACHED_PASSES) }
        }

        async fn lines(&self, image: &DynamicImage) -> Result<Pass, DetectionError> {
            let key = image_key(image);
            if let Some(pass) = self.passes.get(&key) {
                return Ok(pass);
            }
            let pass = self.run_engine(image).await?;
            self.passes.insert(key, pass.clone());
            Ok(pass)
        }

        async fn run_engine(&self, image: &DynamicImage) -> Result<Pass, DetectionError> {
            let png = crate::codec::encode_png(image)
                .map_err(|e| DetectionError::Backend(e.to_string()))?;
            let data_path = self.data_path.clone();
            let lang = self.lang.clone();

            tokio::task::spawn_blocking(move || {
                let mut lt = LepTess::new(data_path.as_deref(), &lang)
                    .map_err(|_| DetectionError::NotAvailable)?;
                lt.set_image_from_mem(&png)
                    .map_err(|e| DetectionError::Backend(e.to_string()))?;
                let text = lt
                    .get_utf8_text()
                    .map_err(|e| DetectionError::Backend(e.to_string()))?;
                let confidence = (lt.mean_text_conf() as f32 / 100.0).clamp(0.0, 1.0);
                let lines = text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect();
                Ok((lines, confidence))
            })
            .await
            .map_err(|e| DetectionError::Backend(e.to_string()))?
        }
    }

    #[async_trait]
    impl TextRecognizer for TesseractRecognizer {
        async fn detect_regions(&self, image: &DynamicImage) -> Result<Vec<TextRegion>, DetectionError> {
            let (lines, confidence) = self.lines(image).await?;
            Ok(lines.iter().map(|_| TextRegion { bounds: None, confidence }).collect())
        }

        async fn recognize(
            &self,
            image: &DynamicImage,
            mode: RecognitionMode,
        ) -> Result<Vec<RecognizedText>, DetectionError> {
            tracing::debug!(?mode, "Tesseract ignores recognition mode");
            let (lines, confidence) = self.lines(image).await?;
            Ok(lines
                .into_iter()
                .map(|text| RecognizedText { text, confidence })
                .collect())
        }
    }
}
