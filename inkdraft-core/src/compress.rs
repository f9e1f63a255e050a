//! Image compressor.
//!
//! Decodes any raster format the `image` crate reads, shrinks it to fit
//! `max_dimension` and re-encodes it as JPEG, lowering quality until the
//! output fits `max_bytes` or the quality floor is reached. JPEG has no alpha
//! channel, so transparent pixels are flattened onto white first.
//! Compression is an optimization: every failure yields the original bytes.

use std::io::Cursor;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage, Rgba};
use inkdraft_blob::EncodedImage;
use tracing::{debug, warn};

use crate::config::CompressionConfig;
use crate::error::CompressionError;

const OUTPUT_MIME: &str = "image/jpeg";

/// Normalizes an encoded image; never fails
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(&self, input: EncodedImage) -> EncodedImage;
}

/// Compressor that stores files unchanged
#[derive(Debug, Clone, Default)]
pub struct NoopCompressor;

#[async_trait]
impl Compressor for NoopCompressor {
    async fn compress(&self, input: EncodedImage) -> EncodedImage {
        input
    }
}

/// Resize and JPEG re-encode on the blocking pool
#[derive(Debug, Clone, Default)]
pub struct ImageCompressor {
    config: CompressionConfig,
}

impl ImageCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }
}

#[async_trait]
impl Compressor for ImageCompressor {
    async fn compress(&self, input: EncodedImage) -> EncodedImage {
        let config = self.config.clone();
        let worker_input = input.clone();
        let joined =
            tokio::task::spawn_blocking(move || compress_blocking(&config, &worker_input)).await;

        let result = joined.unwrap_or_else(|e| {
            Err(CompressionError::Worker {
                message: e.to_string(),
            })
        });

        match result {
            Ok(output) => {
                debug!(
                    before = input.len(),
                    after = output.len(),
                    mime = %output.mime_type,
                    "Compressed image"
                );
                output
            }
            Err(e) => {
                warn!(
                    error = %e,
                    mime = %input.mime_type,
                    "Compression failed, keeping original bytes"
                );
                input
            }
        }
    }
}

/// Pick the compressor for `config`
pub fn compressor_for(config: &CompressionConfig) -> std::sync::Arc<dyn Compressor> {
    if config.enabled {
        std::sync::Arc::new(ImageCompressor::new(config.clone()))
    } else {
        std::sync::Arc::new(NoopCompressor)
    }
}

fn compress_blocking(
    config: &CompressionConfig,
    input: &EncodedImage,
) -> Result<EncodedImage, CompressionError> {
    let decoded = image::load_from_memory(&input.bytes)
        .map_err(|e| CompressionError::decode(e.to_string()))?;

    let max = config.max_dimension;
    let oversized = max > 0 && (decoded.width() > max || decoded.height() > max);
    let fitted = if oversized {
        decoded.resize(max, max, FilterType::Lanczos3)
    } else {
        decoded
    };
    let rgb = if fitted.color().has_alpha() {
        flatten_onto_white(&fitted)
    } else {
        fitted.to_rgb8()
    };

    let mut quality = config.initial_quality.clamp(1, 100);
    let floor = config.min_quality.clamp(1, quality);
    let step = config.quality_step.max(1);

    let mut encoded = encode_jpeg(&rgb, quality)?;
    while encoded.len() as u64 > config.max_bytes && quality > floor {
        quality = quality.saturating_sub(step).max(floor);
        encoded = encode_jpeg(&rgb, quality)?;
    }

    if encoded.len() as u64 > config.max_bytes {
        debug!(bytes = encoded.len(), quality, "Size target not reached at quality floor");
    }

    // Re-encoding a small, already efficient file can only make it worse
    if !oversized && encoded.len() >= input.len() {
        return Ok(input.clone());
    }

    Ok(EncodedImage::new(encoded, OUTPUT_MIME))
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>, CompressionError> {
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(rgb)
        .map_err(|e| CompressionError::encode(e.to_string()))?;
    Ok(out.into_inner())
}
