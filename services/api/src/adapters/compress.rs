//! services/api/src/adapters/compress.rs
//!
//! Implements the `ImageCompressor` port with the `image` crate. Decoding,
//! resizing and encoding run on tokio's blocking pool.

use async_trait::async_trait;
use collection_core::domain::{CompressedImage, CompressionOptions, RasterFormat};
use collection_core::ports::{ImageCompressor, PortError, PortResult};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};

#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCompressor;

#[async_trait]
impl ImageCompressor for RasterCompressor {
    async fn compress(
        &self,
        source: &[u8],
        options: &CompressionOptions,
    ) -> PortResult<CompressedImage> {
        let source = source.to_vec();
        let options = *options;
        tokio::task::spawn_blocking(move || compress_blocking(&source, &options))
            .await
            .map_err(|e| PortError::Unexpected(format!("Compression task failed: {e}")))?
    }
}

fn compress_blocking(source: &[u8], options: &CompressionOptions) -> PortResult<CompressedImage> {
    let decoded = image::load_from_memory(source)
        .map_err(|e| PortError::Unexpected(format!("Could not read image: {e}")))?;
    let resized = fit_within(decoded, options.max_dimension);

    let bytes = match options.format {
        RasterFormat::Jpeg => encode_jpeg(&resized, options.quality)?,
    };
    Ok(CompressedImage {
        bytes,
        format: options.format,
    })
}

/// Scales down so the longer side is at most `max_dimension`. Smaller images are kept as-is.
fn fit_within(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    if image.width() <= max_dimension && image.height() <= max_dimension {
        return image;
    }
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

fn encode_jpeg(image: &DynamicImage, quality: f32) -> PortResult<Vec<u8>> {
    let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality)
        .encode_image(&rgb)
        .map_err(|e| PortError::Unexpected(format!("Could not encode image: {e}")))?;
    Ok(bytes)
}
