//! Raster decode, resize and encode.
//!
//! The pipeline only sees [`ImageCodec`]; [`RasterCodec`] is the production
//! implementation on top of the `image` and `webp` crates.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageOutputFormat, RgbaImage};

use crate::error::CodecError;
use crate::pipeline::MediaType;

/// Decoded RGBA8 pixels.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

pub trait ImageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, CodecError>;

    fn resize(&self, pixels: &PixelBuffer, width: u32, height: u32)
        -> Result<PixelBuffer, CodecError>;

    /// Encode at `quality` in `(0, 1]`. Lossless formats ignore it.
    fn encode(
        &self,
        pixels: &PixelBuffer,
        format: MediaType,
        quality: f32,
    ) -> Result<Vec<u8>, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

impl RasterCodec {
    fn to_image(pixels: &PixelBuffer) -> Result<RgbaImage, CodecError> {
        RgbaImage::from_raw(pixels.width, pixels.height, pixels.rgba.clone()).ok_or(
            CodecError::Dimensions {
                width: pixels.width,
                height: pixels.height,
            },
        )
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.01, 1.0) * 100.0).round() as u8
}

impl ImageCodec for RasterCodec {
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer, CodecError> {
        let img = image::load_from_memory(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        let rgba = img.to_rgba8();
        Ok(PixelBuffer {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }

    fn resize(
        &self,
        pixels: &PixelBuffer,
        width: u32,
        height: u32,
    ) -> Result<PixelBuffer, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::Dimensions { width, height });
        }
        let img = Self::to_image(pixels)?;
        let resized = image::imageops::resize(&img, width, height, FilterType::Triangle);
        Ok(PixelBuffer {
            width,
            height,
            rgba: resized.into_raw(),
        })
    }

    fn encode(
        &self,
        pixels: &PixelBuffer,
        format: MediaType,
        quality: f32,
    ) -> Result<Vec<u8>, CodecError> {
        let img = DynamicImage::ImageRgba8(Self::to_image(pixels)?);
        let encode_error = |reason: String| CodecError::Encode {
            format: format.mime(),
            reason,
        };

        let mut out = Vec::new();
        match format {
            MediaType::Jpeg => {
                let rgb = img.to_rgb8();
                JpegEncoder::new_with_quality(&mut out, jpeg_quality(quality))
                    .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
                    .map_err(|e| encode_error(e.to_string()))?;
            }
            MediaType::Png => img
                .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
                .map_err(|e| encode_error(e.to_string()))?,
            MediaType::Gif => img
                .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Gif)
                .map_err(|e| encode_error(e.to_string()))?,
            MediaType::Webp => {
                let encoder = webp::Encoder::from_image(&img)
                    .map_err(|e| encode_error(e.to_string()))?;
                // WebPMemory is !Send; copy it out.
                out = encoder.encode(quality * 100.0).to_vec();
            }
        }
        Ok(out)
    }
}
