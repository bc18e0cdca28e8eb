//! Getting a capture out of the app.

use super::bridge::{BridgeError, HostBridge};
use super::clipboard::Clipboard;
use super::store::{ImageStore, StoreError};
use crate::capture::DeliveryConfig;
use crate::events::StatusMessage;
use crate::photo::{fit_payload, CapturedImage, ImageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("failed to write download: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0} is not available")]
    Unavailable(&'static str),
}

impl DeliveryError {
    pub fn user_message(&self) -> String {
        match self {
            DeliveryError::Image(ImageError::PayloadTooLarge { .. }) => {
                "The photo is too large to send. Retake it with less detail.".to_string()
            }
            DeliveryError::Image(_) => "Could not encode the photo.".to_string(),
            DeliveryError::Io(_) => "Could not save the photo.".to_string(),
            DeliveryError::Bridge(BridgeError::Unsupported(what)) => {
                format!("This app version does not support {what}.")
            }
            DeliveryError::Bridge(_) => "The photo could not be sent.".to_string(),
            DeliveryError::Store(_) => "Could not store the photo.".to_string(),
            DeliveryError::Unavailable(what) => format!("{what} is not available here."),
        }
    }
}

/// Where a capture should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    /// The host data channel when embedded, a download otherwise.
    Auto,
    Download,
    Clipboard,
    Bridge,
    Store,
}

/// What a delivery produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Downloaded { path: PathBuf },
    Copied { bytes: usize },
    /// The clipboard was unusable; the data URL is offered for manual copy.
    ManualCopy { data_url: String },
    Sent {
        bytes: usize,
        width: u32,
        height: u32,
        quality: u8,
        attempts: usize,
    },
    Stored { id: u64 },
}

impl DeliveryOutcome {
    pub fn method(&self) -> DeliveryMethod {
        match self {
            DeliveryOutcome::Downloaded { .. } => DeliveryMethod::Download,
            DeliveryOutcome::Copied { .. } | DeliveryOutcome::ManualCopy { .. } => {
                DeliveryMethod::Clipboard
            }
            DeliveryOutcome::Sent { .. } => DeliveryMethod::Bridge,
            DeliveryOutcome::Stored { .. } => DeliveryMethod::Store,
        }
    }

    pub fn status(&self) -> StatusMessage {
        match self {
            DeliveryOutcome::Downloaded { path } => {
                StatusMessage::success(format!("Saved {}", path.display()))
            }
            DeliveryOutcome::Copied { .. } => StatusMessage::success("Photo copied to clipboard"),
            DeliveryOutcome::ManualCopy { .. } => {
                StatusMessage::info("Clipboard unavailable. Copy the image data manually.")
            }
            DeliveryOutcome::Sent { .. } => StatusMessage::success("Photo sent"),
            DeliveryOutcome::Stored { id } => {
                StatusMessage::success(format!("Photo saved (#{id})"))
            }
        }
    }
}

/// Writes the capture into `dir` using its own format and quality.
pub fn write_download(dir: &Path, image: &CapturedImage) -> Result<PathBuf, DeliveryError> {
    let encoded = image.encode()?;
    std::fs::create_dir_all(dir)?;
    let name = format!(
        "photo_{}_{}.{}",
        image.captured_at().format("%Y%m%d_%H%M%S"),
        image.sequence(),
        image.format().extension()
    );
    let path = dir.join(name);
    std::fs::write(&path, encoded.bytes())?;
    tracing::info!(path = %path.display(), bytes = encoded.len(), "Photo downloaded");
    Ok(path)
}

/// Routes captures to a destination.
pub struct DeliveryAdapter {
    config: DeliveryConfig,
    clipboard: Option<Box<dyn Clipboard>>,
    store: Option<ImageStore>,
}

impl DeliveryAdapter {
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            clipboard: None,
            store: None,
        }
    }

    pub fn with_clipboard(mut self, clipboard: Box<dyn Clipboard>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    pub fn with_store(mut self, store: ImageStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&ImageStore> {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> Option<&mut ImageStore> {
        self.store.as_mut()
    }

    /// Resolves `Auto` against the environment: embedded in a host with a
    /// data channel, or standalone.
    pub fn resolve(method: DeliveryMethod, bridge: Option<&dyn HostBridge>) -> DeliveryMethod {
        match method {
            DeliveryMethod::Auto => {
                let embedded = bridge.is_some_and(|b| b.capabilities().data_channel.is_some());
                if embedded {
                    DeliveryMethod::Bridge
                } else {
                    DeliveryMethod::Download
                }
            }
            other => other,
        }
    }

    pub fn deliver(
        &mut self,
        image: &CapturedImage,
        method: DeliveryMethod,
        bridge: Option<&mut dyn HostBridge>,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let method = Self::resolve(method, bridge.as_deref());
        tracing::debug!(?method, sequence = image.sequence(), "Delivering photo");

        match method {
            DeliveryMethod::Download | DeliveryMethod::Auto => self.download(image),
            DeliveryMethod::Clipboard => self.copy(image),
            DeliveryMethod::Store => self.save(image),
            DeliveryMethod::Bridge => match bridge {
                Some(bridge) => self.send(image, bridge),
                None => Err(DeliveryError::Unavailable("host bridge")),
            },
        }
    }

    pub fn download(&self, image: &CapturedImage) -> Result<DeliveryOutcome, DeliveryError> {
        let path = write_download(&self.config.download_dir, image)?;
        Ok(DeliveryOutcome::Downloaded { path })
    }

    /// Copies the bitmap, falling back to a data URL when the clipboard is
    /// missing or refuses the write.
    pub fn copy(&mut self, image: &CapturedImage) -> Result<DeliveryOutcome, DeliveryError> {
        if let Some(clipboard) = self.clipboard.as_mut() {
            let png = image.encode_png()?;
            match clipboard.write_image(png.bytes()) {
                Ok(()) => {
                    tracing::info!(bytes = png.len(), "Photo copied to clipboard");
                    return Ok(DeliveryOutcome::Copied { bytes: png.len() });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Clipboard write failed, offering manual copy")
                }
            }
        } else {
            tracing::info!("No clipboard, offering manual copy");
        }
        let data_url = image.encode()?.data_url();
        Ok(DeliveryOutcome::ManualCopy { data_url })
    }

    /// Recompresses until the payload fits the host channel, then sends it.
    pub fn send(
        &self,
        image: &CapturedImage,
        bridge: &mut dyn HostBridge,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let ceiling = bridge
            .capabilities()
            .data_channel
            .ok_or(DeliveryError::Bridge(BridgeError::Unsupported("data channel")))?;
        let payload = fit_payload(image, &self.config.payload, ceiling)?;
        bridge.send_data(payload.body())?;

        tracing::info!(
            bytes = payload.len(),
            width = payload.width(),
            quality = payload.quality(),
            "Photo sent to host"
        );
        Ok(DeliveryOutcome::Sent {
            bytes: payload.len(),
            width: payload.width(),
            height: payload.height(),
            quality: payload.quality(),
            attempts: payload.attempts(),
        })
    }

    pub fn save(&mut self, image: &CapturedImage) -> Result<DeliveryOutcome, DeliveryError> {
        let store = self
            .store
            .as_mut()
            .ok_or(DeliveryError::Unavailable("local storage"))?;
        let encoded = image.encode()?;
        let id = store.put(image, &encoded)?;
        Ok(DeliveryOutcome::Stored { id })
    }
}

impl std::fmt::Debug for DeliveryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryAdapter")
            .field("config", &self.config)
            .field("clipboard", &self.clipboard.is_some())
            .field("store", &self.store.as_ref().map(|s| s.len()))
            .finish()
    }
}
