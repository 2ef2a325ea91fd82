//! Per-format encoders for the working image

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};

use super::OutputFormat;
use super::pdf::wrap_jpeg_in_pdf;
use crate::error::AppError;

/// Encode `image` as `format` at `quality` (1-100).
///
/// PNG ignores `quality` and always uses the strongest zlib setting with
/// adaptive filtering. JPEG drops any alpha channel.
pub fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, AppError> {
    match format {
        OutputFormat::Jpeg => encode_jpeg(image, quality),
        OutputFormat::Png => encode_png(image),
        OutputFormat::Pdf => {
            let jpeg = encode_jpeg(image, quality)?;
            wrap_jpeg_in_pdf(&jpeg, image.width(), image.height())
        }
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, AppError> {
    let rgb = image.to_rgb8();
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder
        .encode_image(&rgb)
        .map_err(|e| AppError::Encode(format!("jpeg encode failed: {e}")))?;
    Ok(buffer)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, AppError> {
    let mut buffer = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| AppError::Encode(format!("png encode failed: {e}")))?;
    Ok(buffer)
}
