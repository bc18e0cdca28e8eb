//! Write-only clipboard access.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClipboardError {
    #[error("clipboard is not available")]
    Unavailable,
    #[error("clipboard write failed: {0}")]
    WriteFailed(String),
}

/// Destination for image copies. There is no read path.
pub trait Clipboard {
    /// Writes a PNG-encoded bitmap.
    fn write_image(&mut self, png: &[u8]) -> Result<(), ClipboardError>;
}

/// Clipboard held in memory, optionally refusing every write.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Option<Vec<u8>>,
    refuse: bool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// A clipboard whose writes always fail, as when the page lacks focus.
    pub fn refusing() -> Self {
        Self {
            contents: None,
            refuse: true,
        }
    }

    pub fn contents(&self) -> Option<&[u8]> {
        self.contents.as_deref()
    }
}

impl Clipboard for MemoryClipboard {
    fn write_image(&mut self, png: &[u8]) -> Result<(), ClipboardError> {
        if self.refuse {
            return Err(ClipboardError::WriteFailed("document is not focused".to_string()));
        }
        self.contents = Some(png.to_vec());
        Ok(())
    }
}
