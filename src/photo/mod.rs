//! Still-image rendering and encoding.
//!
//! A capture is rendered once from a video frame into a [`CapturedImage`]
//! and encoded on demand: at full size for downloads and the local store,
//! as a lossless bitmap for the clipboard, and through [`fit_payload`] for
//! the size-bounded host data channel.

mod captured;
mod recompress;

pub use captured::{CapturedImage, EncodedImage, ImageError, ImageFormat};
pub use recompress::{fit_payload, DeliveryPayload, PayloadLimits};
