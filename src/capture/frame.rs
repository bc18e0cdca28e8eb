//! Frames as handed over by a media stream.

use image::RgbImage;
use std::time::{Duration, Instant};

/// One RGB8 frame grabbed from a live track.
///
/// Backends pass along whatever the driver produced; a buffer that does
/// not match the reported dimensions is only rejected when the frame is
/// turned into an image.
#[derive(Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    sequence: u64,
    grabbed_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
            grabbed_at: Instant::now(),
        }
    }

    pub fn from_image(image: RgbImage, sequence: u64) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, sequence)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Position of the frame within its stream, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Time since the backend handed the frame over.
    pub fn age(&self) -> Duration {
        self.grabbed_at.elapsed()
    }

    /// True when the buffer holds exactly `width * height` RGB pixels.
    pub fn is_complete(&self) -> bool {
        let expected = (self.width as usize) * (self.height as usize) * 3;
        self.width > 0 && self.height > 0 && self.data.len() == expected
    }

    pub fn into_image(self) -> Option<RgbImage> {
        if !self.is_complete() {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frame(#{} {}x{}, {} bytes)",
            self.sequence,
            self.width,
            self.height,
            self.data.len()
        )
    }
}
