use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tillroll_core::{DetectionConstraints, Quadrilateral};
use tracing::{debug, warn};

use crate::error::DetectionError;

/// Parameters passed to a rectangle backend. Backends may use them to prune
/// early; [`DocumentDetector`] re-checks every candidate regardless.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionRequest {
    pub max_candidates: usize,
    pub aspect_ratio_range: (f32, f32),
    pub min_relative_size: f32,
    pub min_confidence: f32,
}

impl From<&DetectionConstraints> for DetectionRequest {
    fn from(c: &DetectionConstraints) -> Self {
        Self {
            max_candidates: c.max_candidates,
            aspect_ratio_range: (c.min_aspect_ratio, c.max_aspect_ratio),
            min_relative_size: c.min_relative_size,
            min_confidence: c.min_confidence,
        }
    }
}

impl DetectionRequest {
    /// Whether `quad` satisfies every constraint for an image of the given size.
    pub fn accepts(&self, quad: &Quadrilateral, width: u32, height: u32) -> bool {
        let aspect = quad.aspect_ratio(width, height);
        let (min_aspect, max_aspect) = self.aspect_ratio_range;
        quad.confidence >= self.min_confidence
            && quad.relative_area() >= self.min_relative_size
            && aspect >= min_aspect
            && aspect <= max_aspect
    }
}

/// Abstraction over a rectangle-finding backend.
#[async_trait]
pub trait RectangleDetector: Send + Sync {
    async fn detect(
        &self,
        image: &DynamicImage,
        request: &DetectionRequest,
    ) -> Result<Vec<Quadrilateral>, DetectionError>;
}

/// Await a backend call, giving up after `limit`.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, DetectionError>
where
    F: Future<Output = Result<T, DetectionError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| DetectionError::Timeout(limit))?
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set candidate list, unfiltered, optionally after a delay.
#[derive(Debug, Clone, Default)]
pub struct MockRectangleDetector {
    pub candidates: Vec<Quadrilateral>,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl MockRectangleDetector {
    pub fn new(candidates: Vec<Quadrilateral>) -> Self {
        Self { candidates, ..Self::default() }
    }

    /// A backend that never finds anything.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl RectangleDetector for MockRectangleDetector {
    async fn detect(
        &self,
        _image: &DynamicImage,
        _request: &DetectionRequest,
    ) -> Result<Vec<Quadrilateral>, DetectionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(DetectionError::Backend("mock failure".into()));
        }
        Ok(self.candidates.clone())
    }
}

// ── Document detection ────────────────────────────────────────────────────────

/// Finds the document boundary in a capture: the largest backend candidate
/// that passes every [`DetectionConstraints`] rule.
#[derive(Clone)]
pub struct DocumentDetector {
    backend: Arc<dyn RectangleDetector>,
    request: DetectionRequest,
    timeout: Duration,
}

impl DocumentDetector {
    pub fn new(
        backend: Arc<dyn RectangleDetector>,
        constraints: &DetectionConstraints,
        timeout: Duration,
    ) -> Self {
        Self { backend, request: DetectionRequest::from(constraints), timeout }
    }

    pub fn request(&self) -> &DetectionRequest {
        &self.request
    }

    /// `None` means "no document found" and callers fall back to the full
    /// frame. Backend errors and timeouts end up here too.
    pub async fn detect(&self, image: &DynamicImage) -> Option<Quadrilateral> {
        let (width, height) = image.dimensions();
        let candidates = match bounded(self.timeout, self.backend.detect(image, &self.request)).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "Rectangle detection failed; treating as no document");
                return None;
            }
        };

        let reported = candidates.len();
        let best = candidates
            .into_iter()
            .take(self.request.max_candidates)
            .filter(|q| self.request.accepts(q, width, height))
            .max_by(|a, b| a.relative_area().total_cmp(&b.relative_area()));

        debug!(
            reported,
            found = best.is_some(),
            area = best.map(|q| q.relative_area()),
            "Document detection finished"
        );
        best
    }
}
