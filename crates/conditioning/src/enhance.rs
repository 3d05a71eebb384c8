use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgb32FImage};
use tillroll_core::EnhancementConfig;
use tracing::{debug, warn};

type Luma32FImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Radius (Gaussian sigma) of the local neighbourhood used by sharpening and denoising.
const NEIGHBOURHOOD_SIGMA: f32 = 1.0;

/// One named transform in the enhancement chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterStep {
    /// Multiply by 2^ev.
    Exposure { ev: f32 },
    /// Add a constant on the [0,1] scale.
    Brightness { amount: f32 },
    /// Scale distance from mid-grey.
    Contrast { factor: f32 },
    /// Unsharp mask on luminance only, so edges sharpen without colour fringing.
    Sharpen { amount: f32 },
    /// Scale distance from each pixel's luminance. 1.0 is a no-op, 0.0 is grayscale.
    Saturation { factor: f32 },
    /// Pull pixels within `level` of their local mean onto the mean; larger
    /// differences (text edges) are left alone.
    Denoise { level: f32 },
}

impl FilterStep {
    pub fn name(&self) -> &'static str {
        match self {
            FilterStep::Exposure { .. } => "exposure",
            FilterStep::Brightness { .. } => "brightness",
            FilterStep::Contrast { .. } => "contrast",
            FilterStep::Sharpen { .. } => "sharpen",
            FilterStep::Saturation { .. } => "saturation",
            FilterStep::Denoise { .. } => "denoise",
        }
    }

    fn parameter(&self) -> f32 {
        match *self {
            FilterStep::Exposure { ev } => ev,
            FilterStep::Brightness { amount } => amount,
            FilterStep::Contrast { factor } => factor,
            FilterStep::Sharpen { amount } => amount,
            FilterStep::Saturation { factor } => factor,
            FilterStep::Denoise { level } => level,
        }
    }

    /// `None` when the step cannot produce an image (empty input, non-finite parameter).
    pub fn apply(&self, img: &Rgb32FImage) -> Option<Rgb32FImage> {
        if img.width() == 0 || img.height() == 0 || !self.parameter().is_finite() {
            return None;
        }
        let out = match *self {
            FilterStep::Exposure { ev } => {
                let gain = 2f32.powf(ev);
                map_channels(img, |v| v * gain)
            }
            FilterStep::Brightness { amount } => map_channels(img, |v| v + amount),
            FilterStep::Contrast { factor } => map_channels(img, |v| (v - 0.5) * factor + 0.5),
            FilterStep::Saturation { factor } => map_pixels(img, |p| {
                let l = luminance(p);
                Rgb([
                    l + (p[0] - l) * factor,
                    l + (p[1] - l) * factor,
                    l + (p[2] - l) * factor,
                ])
            }),
            FilterStep::Sharpen { amount } => sharpen_luminance(img, amount),
            FilterStep::Denoise { level } => denoise(img, level),
        };
        Some(out)
    }
}

/// An explicit, ordered list of [`FilterStep`]s. Output depends on order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnhancementPipeline {
    steps: Vec<FilterStep>,
}

impl EnhancementPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical order: exposure → brightness → contrast → sharpen →
    /// saturation → denoise.
    pub fn from_config(config: &EnhancementConfig) -> Self {
        Self::new()
            .exposure(config.exposure_adjustment)
            .brightness(config.brightness_boost)
            .contrast(config.contrast_multiplier)
            .sharpen(config.sharpness_amount)
            .saturation(config.saturation)
            .denoise(config.noise_reduction_amount)
    }

    pub fn then(mut self, step: FilterStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn exposure(self, ev: f32) -> Self {
        self.then(FilterStep::Exposure { ev })
    }

    pub fn brightness(self, amount: f32) -> Self {
        self.then(FilterStep::Brightness { amount })
    }

    pub fn contrast(self, factor: f32) -> Self {
        self.then(FilterStep::Contrast { factor })
    }

    pub fn sharpen(self, amount: f32) -> Self {
        self.then(FilterStep::Sharpen { amount })
    }

    pub fn saturation(self, factor: f32) -> Self {
        self.then(FilterStep::Saturation { factor })
    }

    pub fn denoise(self, level: f32) -> Self {
        self.then(FilterStep::Denoise { level })
    }

    pub fn steps(&self) -> &[FilterStep] {
        &self.steps
    }

    /// Run every step in order. A step that yields nothing is skipped and
    /// the previous stage's image carries on.
    pub fn run(&self, image: &DynamicImage) -> DynamicImage {
        if self.steps.is_empty() || image.width() == 0 || image.height() == 0 {
            return image.clone();
        }

        let mut current = image.to_rgb32f();
        for step in &self.steps {
            match step.apply(&current) {
                Some(next) => current = next,
                None => warn!(step = step.name(), "Filter step produced no output; passing input through"),
            }
        }
        debug!(steps = self.steps.len(), width = image.width(), height = image.height(), "Enhancement finished");
        DynamicImage::ImageRgb8(DynamicImage::ImageRgb32F(current).into_rgb8())
    }
}

/// Down-scale so the longest side fits `max_dimension`. Never upscales.
pub fn resize_to_fit(img: &DynamicImage, max_dimension: u32) -> DynamicImage {
    if img.width() > max_dimension || img.height() > max_dimension {
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        img.clone()
    }
}

fn luminance(p: &Rgb<f32>) -> f32 {
    0.2126 * p[0] + 0.7152 * p[1] + 0.0722 * p[2]
}

fn map_pixels(img: &Rgb32FImage, f: impl Fn(&Rgb<f32>) -> Rgb<f32>) -> Rgb32FImage {
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let Rgb([r, g, b]) = f(img.get_pixel(x, y));
        Rgb([r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)])
    })
}

fn map_channels(img: &Rgb32FImage, f: impl Fn(f32) -> f32) -> Rgb32FImage {
    map_pixels(img, |p| Rgb([f(p[0]), f(p[1]), f(p[2])]))
}

fn sharpen_luminance(img: &Rgb32FImage, amount: f32) -> Rgb32FImage {
    if amount == 0.0 {
        return img.clone();
    }
    let luma: Luma32FImage =
        ImageBuffer::from_fn(img.width(), img.height(), |x, y| Luma([luminance(img.get_pixel(x, y))]));
    let blurred = imageops::blur(&luma, NEIGHBOURHOOD_SIGMA);
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let delta = amount * (luma.get_pixel(x, y)[0] - blurred.get_pixel(x, y)[0]);
        let p = img.get_pixel(x, y);
        Rgb([
            (p[0] + delta).clamp(0.0, 1.0),
            (p[1] + delta).clamp(0.0, 1.0),
            (p[2] + delta).clamp(0.0, 1.0),
        ])
    })
}

fn denoise(img: &Rgb32FImage, level: f32) -> Rgb32FImage {
    if level <= 0.0 {
        return img.clone();
    }
    let mean = imageops::blur(img, NEIGHBOURHOOD_SIGMA);
    ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
        let (p, m) = (img.get_pixel(x, y), mean.get_pixel(x, y));
        let pick = |c: usize| if (p[c] - m[c]).abs() <= level { m[c] } else { p[c] };
        Rgb([pick(0), pick(1), pick(2)])
    })
}
