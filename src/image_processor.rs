//! # Image Processing Module
//!
//! Servizio di compressione immagini di default: re-encode in-process con il
//! crate `image`, senza tool esterni.
//!
//! ## Pipeline di compressione
//!
//! 1. **Rilevamento formato**: dai magic bytes del payload (non dal nome file)
//! 2. **Decode** in memoria
//! 3. **Resize** se il lato più lungo supera `max_dimension` (aspect ratio preservato, Lanczos3)
//! 4. **Encode**:
//!    - PNG resta PNG (compressione lossless massima, filtro adattivo)
//!    - Immagini con canale alpha diventano PNG
//!    - Tutto il resto diventa JPEG con qualità `round(target_quality * 100)`
//! 5. **Budget di dimensione** (opzionale): la qualità JPEG scende a passi di 0.1
//!    finché l'output non rientra nel budget o si raggiunge la qualità minima
//!
//! ## Mappatura qualità
//!
//! | target_quality | Qualità JPEG |
//! |----------------|--------------|
//! | 1.0            | 100          |
//! | 0.75           | 75           |
//! | 0.0            | 1            |
//!
//! Il lavoro CPU-bound gira su `spawn_blocking` per non bloccare il runtime.
//!
//! ## Esempio
//!
//! ```rust,ignore
//! let processor = ImageProcessor::new();
//! let output = processor.compress(&payload, &options).await?;
//! ```

use crate::compressor::{CompressedOutput, ImageCompressor, ImageOptions};
use crate::error::{CompressError, Result};
use crate::media::{MediaKind, SourcePayload};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat};
use tracing::debug;

const QUALITY_STEP: f64 = 0.1;

/// Re-encodes still images in memory
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    /// Lowest quality the size budget loop may reach
    min_quality: f64,
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self { min_quality: 0.1 }
    }
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocking part of the pipeline: decode, resize, encode.
    fn reencode(&self, bytes: &[u8], options: &ImageOptions) -> Result<CompressedOutput> {
        let format = image::guess_format(bytes)?;
        let img = image::load_from_memory_with_format(bytes, format)?;
        let img = Self::fit_within(img, options.max_dimension);

        if format == ImageFormat::Png || img.color().has_alpha() {
            return Ok(CompressedOutput::new(Self::encode_png(&img)?, "image/png"));
        }

        let mut quality = options.target_quality.value();
        let mut encoded = Self::encode_jpeg(&img, quality)?;

        if let Some(budget) = options.max_size_bytes {
            while encoded.len() as u64 > budget && quality - QUALITY_STEP >= self.min_quality {
                quality -= QUALITY_STEP;
                debug!(
                    "Image over budget ({} > {} bytes), retrying at quality {:.2}",
                    encoded.len(),
                    budget,
                    quality
                );
                encoded = Self::encode_jpeg(&img, quality)?;
            }
        }

        Ok(CompressedOutput::new(encoded, "image/jpeg"))
    }

    /// Downscale so the longest side is at most `max_dimension`
    fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
        if img.width() <= max_dimension && img.height() <= max_dimension {
            return img;
        }
        debug!(
            "Resizing {}x{} to fit within {}px",
            img.width(),
            img.height(),
            max_dimension
        );
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    }

    pub fn jpeg_quality(quality: f64) -> u8 {
        ((quality * 100.0).round() as u8).clamp(1, 100)
    }

    fn encode_jpeg(img: &DynamicImage, quality: f64) -> Result<Vec<u8>> {
        let rgb = img.to_rgb8();
        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, Self::jpeg_quality(quality));
        encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
        Ok(buffer)
    }

    fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
        let rgba = img.to_rgba8();
        let mut buffer = Vec::new();
        let encoder = PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, PngFilter::Adaptive);
        encoder.write_image(rgba.as_raw(), rgba.width(), rgba.height(), ColorType::Rgba8)?;
        Ok(buffer)
    }
}

#[async_trait]
impl ImageCompressor for ImageProcessor {
    async fn compress(&self, payload: &SourcePayload, options: &ImageOptions) -> Result<CompressedOutput> {
        debug!("Re-encoding image {} ({} bytes)", payload.name, payload.size());

        let processor = self.clone();
        let bytes = payload.bytes.clone();
        let options = options.clone();

        tokio::task::spawn_blocking(move || processor.reencode(&bytes, &options))
            .await
            .map_err(|e| CompressError::service(MediaKind::Image, format!("encoder task failed: {}", e)))?
    }
}
