//! Size-bounded payloads for the host data channel.
//!
//! The channel accepts a few kilobytes at most, so a capture is first
//! downscaled to a target width and then re-encoded at decreasing JPEG
//! qualities. If the quality floor is reached the width is halved and the
//! ladder is walked again, up to a fixed number of downscales. The total
//! number of encode attempts is therefore fixed by the limits.

use super::captured::{encode_rgb, CapturedImage, ImageError, ImageFormat};
use crate::capture::ConfigError;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

/// Limits for payloads sent over the host data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadLimits {
    /// Maximum serialized payload size in bytes.
    pub max_bytes: usize,
    /// Width the capture is scaled down to before encoding.
    pub target_width: u32,
    /// First JPEG quality tried.
    pub initial_quality: u8,
    /// Lowest JPEG quality tried.
    pub min_quality: u8,
    /// Quality decrement between attempts.
    pub quality_step: u8,
    /// How many times the width may be halved after the quality floor.
    pub max_downscale_steps: u32,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 4000, // channel hard limit is 4096
            target_width: 320,
            initial_quality: 70,
            min_quality: 10,
            quality_step: 10,
            max_downscale_steps: 2,
        }
    }
}

impl PayloadLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::InvalidPayloadLimits(msg.to_string()));
        if self.max_bytes == 0 {
            return invalid("max_bytes must be positive");
        }
        if self.target_width == 0 {
            return invalid("target_width must be positive");
        }
        if self.quality_step == 0 {
            return invalid("quality_step must be positive");
        }
        if self.min_quality == 0
            || self.initial_quality > 100
            || self.min_quality > self.initial_quality
        {
            return invalid("qualities must satisfy 1 <= min_quality <= initial_quality <= 100");
        }
        Ok(())
    }

    /// Qualities tried at each width, highest first, always ending at the floor.
    pub fn quality_ladder(&self) -> Vec<u8> {
        let floor = self.min_quality.max(1);
        let step = self.quality_step.max(1) as usize;
        let top = self.initial_quality.clamp(floor, 100);
        let mut ladder: Vec<u8> = (floor..=top).rev().step_by(step).collect();
        if ladder.last() != Some(&floor) {
            ladder.push(floor);
        }
        ladder
    }

    /// Upper bound on encode attempts for one payload.
    pub fn max_attempts(&self) -> usize {
        self.quality_ladder().len() * (self.max_downscale_steps as usize + 1)
    }
}

#[derive(Serialize)]
struct PhotoEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    width: u32,
    height: u32,
    data: &'a str,
}

/// A serialized capture that fits the destination ceiling.
///
/// Built for a single delivery attempt and dropped afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPayload {
    body: String,
    width: u32,
    height: u32,
    quality: u8,
    attempts: usize,
}

impl DeliveryPayload {
    /// The JSON envelope handed to the channel.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode attempts it took to fit.
    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

fn scaled_height(src_width: u32, src_height: u32, width: u32) -> u32 {
    let h = (src_height as u64 * width as u64 + src_width as u64 / 2) / src_width.max(1) as u64;
    (h as u32).max(1)
}

/// Produces a payload no larger than `min(limits.max_bytes, ceiling)`.
pub fn fit_payload(
    image: &CapturedImage,
    limits: &PayloadLimits,
    ceiling: usize,
) -> Result<DeliveryPayload, ImageError> {
    let ceiling = limits.max_bytes.min(ceiling);
    let ladder = limits.quality_ladder();
    let (src_width, src_height) = (image.width(), image.height());

    let mut width = src_width.min(limits.target_width).max(1);
    let mut attempts = 0;
    let mut smallest = usize::MAX;

    for downscale in 0..=limits.max_downscale_steps {
        let height = scaled_height(src_width, src_height, width);
        let scaled = if (width, height) == (src_width, src_height) {
            image.canvas().clone()
        } else {
            imageops::resize(image.canvas(), width, height, FilterType::Triangle)
        };

        for &quality in &ladder {
            attempts += 1;
            let encoded = encode_rgb(&scaled, ImageFormat::Jpeg, quality)?;
            let data = encoded.data_url();
            let body = serde_json::to_string(&PhotoEnvelope {
                kind: "photo",
                width,
                height,
                data: &data,
            })
            .map_err(|e| ImageError::Serialize(e.to_string()))?;

            tracing::trace!(
                width,
                height,
                quality,
                size = body.len(),
                ceiling,
                "Payload attempt"
            );

            if body.len() <= ceiling {
                tracing::debug!(
                    width,
                    quality,
                    size = body.len(),
                    attempts,
                    "Payload fits data channel"
                );
                return Ok(DeliveryPayload {
                    body,
                    width,
                    height,
                    quality,
                    attempts,
                });
            }
            smallest = smallest.min(body.len());
        }

        if width == 1 || downscale == limits.max_downscale_steps {
            break;
        }
        width = (width / 2).max(1);
    }

    tracing::warn!(smallest, ceiling, attempts, "Payload exceeds data channel limit");
    Err(ImageError::PayloadTooLarge {
        smallest,
        ceiling,
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Frame;

    fn flat_capture(width: u32, height: u32) -> CapturedImage {
        let frame = Frame::new(vec![90u8; (width * height * 3) as usize], width, height, 1);
        CapturedImage::render(frame, width, height, ImageFormat::Jpeg, 92).unwrap()
    }

    #[test]
    fn test_quality_ladder() {
        let limits = PayloadLimits::default();
        assert_eq!(limits.quality_ladder(), vec![70, 60, 50, 40, 30, 20, 10]);
        assert_eq!(limits.max_attempts(), 21);

        let uneven = PayloadLimits {
            initial_quality: 50,
            min_quality: 5,
            quality_step: 20,
            ..Default::default()
        };
        assert_eq!(uneven.quality_ladder(), vec![50, 30, 10, 5]);
    }

    #[test]
    fn test_flat_capture_fits_first_try() {
        let payload =
            fit_payload(&flat_capture(640, 360), &PayloadLimits::default(), 4096).unwrap();

        assert!(payload.len() <= 4000);
        assert_eq!(payload.width(), 320);
        assert_eq!(payload.height(), 180);
        assert_eq!(payload.attempts(), 1);
        assert!(payload.body().starts_with(r#"{"type":"photo","width":320"#));
    }

    #[test]
    fn test_small_capture_not_upscaled() {
        let payload = fit_payload(&flat_capture(100, 50), &PayloadLimits::default(), 4096).unwrap();
        assert_eq!((payload.width(), payload.height()), (100, 50));
    }

    #[test]
    fn test_unreachable_ceiling_reports_too_large() {
        let limits = PayloadLimits::default();
        let result = fit_payload(&flat_capture(640, 360), &limits, 64);

        match result {
            Err(ImageError::PayloadTooLarge {
                ceiling, attempts, ..
            }) => {
                assert_eq!(ceiling, 64);
                assert_eq!(attempts, limits.max_attempts());
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_limits() {
        let limits = PayloadLimits {
            min_quality: 80,
            initial_quality: 70,
            ..Default::default()
        };
        assert!(limits.validate().is_err());
        assert!(PayloadLimits::default().validate().is_ok());
    }
}
