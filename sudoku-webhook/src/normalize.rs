//! Screenshot normalisation
//!
//! Screenshots arrive in whatever format the phone produced. The vision API
//! request always declares `image/jpeg`, so every input is decoded (format
//! sniffed from the bytes) and re-encoded as JPEG.

use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;
use tracing::debug;

/// Default JPEG quality
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to open file as image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to convert image to JPEG: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decode `bytes` and re-encode as JPEG at `quality`.
///
/// Alpha is dropped: JPEG has no alpha channel.
pub fn normalize_image(bytes: &[u8], quality: u8) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory(bytes).map_err(ImageError::Decode)?;
    let rgb = decoded.to_rgb8();

    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode_image(&rgb).map_err(ImageError::Encode)?;

    debug!(
        width = rgb.width(),
        height = rgb.height(),
        input_bytes = bytes.len(),
        output_bytes = buffer.len(),
        "Normalised screenshot to JPEG"
    );
    Ok(buffer)
}
