//! Still images rendered from a video frame.

use crate::capture::{FacingMode, Frame};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while rendering or encoding images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("frame buffer does not match {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },
    #[error("image encoding failed: {0}")]
    Encode(String),
    #[error("payload serialization failed: {0}")]
    Serialize(String),
    #[error(
        "payload of {smallest} bytes exceeds the {ceiling} byte limit after {attempts} attempts"
    )]
    PayloadTooLarge {
        smallest: usize,
        ceiling: usize,
        attempts: usize,
    },
}

/// Output encoding for stills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

/// Encoded image bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    format: ImageFormat,
}

impl EncodedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `data:<mime>;base64,<bytes>` form used for manual copy and the bridge.
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime_type(),
            STANDARD.encode(&self.bytes)
        )
    }
}

impl std::fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedImage")
            .field("format", &self.format)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Encodes an RGB buffer.
pub(crate) fn encode_rgb(
    canvas: &RgbImage,
    format: ImageFormat,
    quality: u8,
) -> Result<EncodedImage, ImageError> {
    let mut bytes = Vec::new();
    let (width, height) = canvas.dimensions();
    let result = match format {
        ImageFormat::Jpeg => JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
            .write_image(canvas.as_raw(), width, height, ExtendedColorType::Rgb8),
        ImageFormat::Png => PngEncoder::new(&mut bytes).write_image(
            canvas.as_raw(),
            width,
            height,
            ExtendedColorType::Rgb8,
        ),
    };
    result.map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(EncodedImage { bytes, format })
}

/// A still taken from the video stream.
///
/// The canvas is fixed at creation; a later capture produces a new value
/// rather than modifying this one.
#[derive(Clone)]
pub struct CapturedImage {
    canvas: RgbImage,
    format: ImageFormat,
    quality: u8,
    sequence: u64,
    facing: Option<FacingMode>,
    captured_at: DateTime<Utc>,
}

impl CapturedImage {
    /// Renders `frame` onto a canvas of `canvas_width` x `canvas_height`,
    /// scaling if the frame was delivered at a different size.
    pub fn render(
        frame: Frame,
        canvas_width: u32,
        canvas_height: u32,
        format: ImageFormat,
        quality: u8,
    ) -> Result<Self, ImageError> {
        let ((width, height), sequence) = (frame.dimensions(), frame.sequence());
        let drawn = frame
            .into_image()
            .ok_or(ImageError::InvalidFrame { width, height })?;

        let canvas = if (width, height) == (canvas_width, canvas_height) {
            drawn
        } else {
            imageops::resize(&drawn, canvas_width, canvas_height, FilterType::Triangle)
        };

        Ok(Self {
            canvas,
            format,
            quality,
            sequence,
            facing: None,
            captured_at: Utc::now(),
        })
    }

    /// Records which camera the still came from.
    pub fn with_facing(mut self, facing: Option<FacingMode>) -> Self {
        self.facing = facing;
        self
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn facing(&self) -> Option<FacingMode> {
        self.facing
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn canvas(&self) -> &RgbImage {
        &self.canvas
    }

    /// Encodes with the capture's own format and quality.
    pub fn encode(&self) -> Result<EncodedImage, ImageError> {
        encode_rgb(&self.canvas, self.format, self.quality)
    }

    /// Lossless bitmap encoding for clipboard writes.
    pub fn encode_png(&self) -> Result<EncodedImage, ImageError> {
        encode_rgb(&self.canvas, ImageFormat::Png, 100)
    }
}

impl std::fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedImage")
            .field("width", &self.canvas.width())
            .field("height", &self.canvas.height())
            .field("format", &self.format)
            .field("quality", &self.quality)
            .field("sequence", &self.sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![120u8; (width * height * 3) as usize], width, height, 1)
    }

    #[test]
    fn test_render_keeps_canvas_size() {
        let image = CapturedImage::render(gray_frame(64, 48), 64, 48, ImageFormat::Jpeg, 80)
            .unwrap();
        assert_eq!((image.width(), image.height()), (64, 48));
        assert_eq!(image.sequence(), 1);
    }

    #[test]
    fn test_render_scales_to_canvas() {
        let image = CapturedImage::render(gray_frame(64, 48), 32, 24, ImageFormat::Jpeg, 80)
            .unwrap();
        assert_eq!((image.width(), image.height()), (32, 24));
    }

    #[test]
    fn test_render_rejects_bad_frame() {
        let frame = Frame::new(vec![0u8; 10], 64, 48, 1);
        assert_eq!(
            CapturedImage::render(frame, 64, 48, ImageFormat::Jpeg, 80).unwrap_err(),
            ImageError::InvalidFrame {
                width: 64,
                height: 48
            }
        );
    }

    #[test]
    fn test_jpeg_encoding_decodes_to_canvas_size() {
        let image = CapturedImage::render(gray_frame(40, 30), 40, 30, ImageFormat::Jpeg, 80)
            .unwrap();
        let encoded = image.encode().unwrap();

        assert_eq!(encoded.format(), ImageFormat::Jpeg);
        assert_eq!(&encoded.bytes()[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(encoded.bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[test]
    fn test_data_url_prefix() {
        let image = CapturedImage::render(gray_frame(8, 8), 8, 8, ImageFormat::Png, 100).unwrap();
        let url = image.encode().unwrap().data_url();
        assert!(url.starts_with("data:image/png;base64,iVBOR"));
    }
}
