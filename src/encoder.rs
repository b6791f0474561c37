//! Screenshot re-encoding.
//!
//! The browser always hands back lossless PNG. This module decodes it and
//! re-encodes it into the configured output format.
//!
//! - **JPEG** honours the request quality and is the default output.
//! - **WebP** uses the lossless encoder, so quality has no effect.
//! - **PNG** is re-encoded losslessly, which also validates the capture.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder as _};

use crate::config::OutputFormat;
use crate::ScreenshotError;

/// PNG bytes exactly as produced by the browser capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBitmap(pub Vec<u8>);

impl RawBitmap {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Compressed output ready to send to the caller
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

/// Encoder for one output format.
///
/// Stateless and deterministic: the same bitmap and quality always produce the
/// same bytes. Callers on the async runtime should run it through
/// `tokio::task::spawn_blocking`.
#[derive(Debug, Clone, Copy)]
pub struct BitmapEncoder {
    format: OutputFormat,
}

impl BitmapEncoder {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Decode `raw` and re-encode it at `quality` (1-100).
    ///
    /// # Errors
    ///
    /// Returns [`ScreenshotError::EncodingFailed`] if the bitmap is not a
    /// decodable image or the encoder rejects it.
    pub fn encode(&self, raw: &RawBitmap, quality: u8) -> Result<EncodedImage, ScreenshotError> {
        let img = image::load_from_memory(&raw.0)?;
        let (width, height) = (img.width(), img.height());

        let mut bytes = Vec::new();
        match self.format {
            OutputFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = img.to_rgb8();
                JpegEncoder::new_with_quality(&mut bytes, quality.clamp(crate::MIN_QUALITY, crate::MAX_QUALITY))
                    .encode_image(&rgb)?;
            }
            OutputFormat::Webp => {
                let rgba = img.to_rgba8();
                WebPEncoder::new_lossless(&mut bytes).encode(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)?;
            }
            OutputFormat::Png => {
                let rgba = img.to_rgba8();
                PngEncoder::new(&mut bytes).write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)?;
            }
        }

        Ok(EncodedImage {
            bytes,
            format: self.format,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn gradient_png(width: u32, height: u32) -> RawBitmap {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 255 / width) as u8, (y * 255 / height) as u8, 128, 255])
        });
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
        RawBitmap(buf)
    }

    fn mean_abs_diff(a: &RgbaImage, b: &RgbaImage) -> f64 {
        let total: u64 = a
            .as_raw()
            .iter()
            .zip(b.as_raw())
            .map(|(x, y)| (*x as i16 - *y as i16).unsigned_abs() as u64)
            .sum();
        total as f64 / a.as_raw().len() as f64
    }

    #[test]
    fn test_jpeg_within_tolerance() {
        let raw = gradient_png(320, 200);
        let encoded = BitmapEncoder::new(OutputFormat::Jpeg).encode(&raw, 90).unwrap();

        assert_eq!(encoded.format, OutputFormat::Jpeg);
        assert_eq!((encoded.width, encoded.height), (320, 200));
        assert_eq!(&encoded.bytes[..2], &[0xFF, 0xD8]);

        let source = image::load_from_memory(&raw.0).unwrap().to_rgba8();
        let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), source.dimensions());
        assert!(mean_abs_diff(&source, &decoded) < 4.0);
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let raw = gradient_png(400, 300);
        let encoder = BitmapEncoder::new(OutputFormat::Jpeg);
        let high = encoder.encode(&raw, 95).unwrap();
        let low = encoder.encode(&raw, 10).unwrap();
        assert!(low.bytes.len() < high.bytes.len());
    }

    #[test]
    fn test_lossless_formats_preserve_pixels() {
        let raw = gradient_png(64, 48);
        let source = image::load_from_memory(&raw.0).unwrap().to_rgba8();

        for format in [OutputFormat::Webp, OutputFormat::Png] {
            let encoded = BitmapEncoder::new(format).encode(&raw, 80).unwrap();
            let decoded = image::load_from_memory(&encoded.bytes).unwrap().to_rgba8();
            assert_eq!(decoded, source, "{format:?} should be lossless");
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let raw = gradient_png(128, 128);
        for format in [OutputFormat::Jpeg, OutputFormat::Webp, OutputFormat::Png] {
            let encoder = BitmapEncoder::new(format);
            let first = encoder.encode(&raw, 75).unwrap();
            let second = encoder.encode(&raw, 75).unwrap();
            assert_eq!(first.bytes, second.bytes);
        }
    }

    #[test]
    fn test_malformed_input() {
        let encoder = BitmapEncoder::new(OutputFormat::Jpeg);
        let err = encoder.encode(&RawBitmap(b"definitely not a png".to_vec()), 80).unwrap_err();
        assert!(matches!(err, ScreenshotError::EncodingFailed(_)));

        let err = encoder.encode(&RawBitmap(Vec::new()), 80).unwrap_err();
        assert!(matches!(err, ScreenshotError::EncodingFailed(_)));
    }
}
