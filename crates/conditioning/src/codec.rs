use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;

use crate::error::ConditioningError;

/// Decode raw bytes (JPEG / PNG / WEBP / …) into an image.
pub fn decode(data: &[u8]) -> Result<DynamicImage, ConditioningError> {
    Ok(image::load_from_memory(data)?)
}

/// Read and decode an image file.
pub fn open(path: &Path) -> Result<DynamicImage, ConditioningError> {
    let data = std::fs::read(path)?;
    decode(&data)
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ConditioningError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| ConditioningError::Encode(e.to_string()))?;
    Ok(buf)
}

/// JPEG has no alpha channel, so the image is flattened to RGB first.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ConditioningError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder
        .encode_image(&img.to_rgb8())
        .map_err(|e| ConditioningError::Encode(e.to_string()))?;
    Ok(buf)
}
