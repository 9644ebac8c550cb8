use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use nailtry_contracts::receipts::UploadSummary;
use sha2::{Digest, Sha256};

use crate::error::GenerationError;

pub const JPEG_MIME: &str = "image/jpeg";

/// An image ready to be inlined into a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    pub fn summary(&self, role: &str) -> UploadSummary {
        UploadSummary {
            role: role.to_string(),
            width: self.width,
            height: self.height,
            mime_type: self.mime_type.clone(),
            byte_len: self.bytes.len(),
            sha256: self.sha256(),
        }
    }
}

pub fn load_source(path: &Path) -> Result<DynamicImage, GenerationError> {
    let bytes = std::fs::read(path).map_err(|err| {
        GenerationError::ImageProcessing(format!("failed reading {}: {err}", path.display()))
    })?;
    decode_source(&bytes)
}

pub fn decode_source(bytes: &[u8]) -> Result<DynamicImage, GenerationError> {
    if bytes.is_empty() {
        return Err(GenerationError::ImageProcessing(
            "source image is empty".to_string(),
        ));
    }
    image::load_from_memory(bytes)
        .map_err(|err| GenerationError::ImageProcessing(format!("source decode failed: {err}")))
}

/// Target size whose longer side is `max_dimension`, keeping aspect ratio.
pub fn bounded_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width >= height {
        let scaled = (f64::from(max_dimension) * f64::from(height) / f64::from(width)).round();
        (max_dimension, (scaled as u32).max(1))
    } else {
        let scaled = (f64::from(max_dimension) * f64::from(width) / f64::from(height)).round();
        ((scaled as u32).max(1), max_dimension)
    }
}

/// Scales `image` so its longer side equals `max_dimension` and re-encodes it
/// as JPEG at `quality`. Small sources are scaled up.
pub fn encode_for_upload(
    image: &DynamicImage,
    max_dimension: u32,
    quality: u8,
) -> Result<EncodedImage, GenerationError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(GenerationError::ImageProcessing(
            "source image has zero size".to_string(),
        ));
    }
    if max_dimension == 0 {
        return Err(GenerationError::ImageProcessing(
            "target dimension must be positive".to_string(),
        ));
    }

    let (width, height) = bounded_dimensions(image.width(), image.height(), max_dimension);
    let flattened = DynamicImage::ImageRgb8(flatten_onto_white(image));
    let resized = flattened
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8();

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    encoder
        .encode_image(&DynamicImage::ImageRgb8(resized))
        .map_err(|err| GenerationError::ImageProcessing(format!("jpeg encode failed: {err}")))?;
    if bytes.is_empty() {
        return Err(GenerationError::ImageProcessing(
            "jpeg encoder produced no output".to_string(),
        ));
    }

    Ok(EncodedImage {
        bytes,
        mime_type: JPEG_MIME.to_string(),
        width,
        height,
    })
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}
