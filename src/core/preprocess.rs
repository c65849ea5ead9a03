// MedScan - core/preprocess.rs
//
// Normalises an arbitrary input image into a bounded payload: the larger
// dimension is clamped to `max_dimension` (aspect ratio preserved, never
// upscaled) and the result is re-encoded as JPEG at a bounded quality.
//
// Failures are local. The caller discards the image; nothing is retried.

use crate::core::model::{EncodedImage, RawImage};
use crate::util::constants;
use crate::util::error::PreprocessError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

/// Preprocessing limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessConfig {
    /// Larger output dimension in pixels.
    pub max_dimension: u32,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Inputs larger than this are rejected before decoding.
    pub max_input_bytes: u64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_dimension: constants::DEFAULT_MAX_IMAGE_DIMENSION,
            jpeg_quality: constants::DEFAULT_JPEG_QUALITY,
            max_input_bytes: constants::DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

/// Output size for a `width` x `height` source.
///
/// scale = min(1, max_dimension / larger side); each side is rounded to the
/// nearest integer and kept at least 1 pixel.
pub fn scaled_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let larger = width.max(height);
    if larger == 0 {
        return (width, height);
    }
    let scale = (f64::from(max_dimension) / f64::from(larger)).min(1.0);
    let scale_side = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (scale_side(width), scale_side(height))
}

/// Decode, resize and re-encode `raw`.
pub fn preprocess(
    raw: &RawImage,
    config: &PreprocessConfig,
) -> Result<EncodedImage, PreprocessError> {
    let size = raw.bytes.len() as u64;
    if size == 0 {
        return Err(PreprocessError::Empty {
            label: raw.label.clone(),
        });
    }
    if size > config.max_input_bytes {
        return Err(PreprocessError::TooLarge {
            label: raw.label.clone(),
            size,
            max: config.max_input_bytes,
        });
    }

    let decoded =
        image::load_from_memory(&raw.bytes).map_err(|source| PreprocessError::Decode {
            label: raw.label.clone(),
            source,
        })?;

    let (src_w, src_h) = (decoded.width(), decoded.height());
    let (width, height) = scaled_dimensions(src_w, src_h, config.max_dimension);

    let resized = if (width, height) == (src_w, src_h) {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::CatmullRom)
    };

    // JPEG has no alpha channel.
    let rgb = resized.to_rgb8();
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, config.jpeg_quality);
    encoder
        .encode_image(&rgb)
        .map_err(|source| PreprocessError::Encode {
            label: raw.label.clone(),
            source,
        })?;

    tracing::debug!(
        image = %raw.label,
        src_width = src_w,
        src_height = src_h,
        width,
        height,
        input_bytes = size,
        output_bytes = bytes.len(),
        "Image preprocessed"
    );

    Ok(EncodedImage {
        label: raw.label.clone(),
        bytes,
        width,
        height,
        mime_type: constants::PAYLOAD_MIME_TYPE,
    })
}
