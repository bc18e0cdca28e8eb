//! Image hand-off.
//!
//! A capture leaves the app through one of four routes: a download
//! artifact, the clipboard (with a manual-copy fallback), the local image
//! store, or the host bridge's size-bounded data channel.

mod adapter;
mod bridge;
mod clipboard;
mod store;

pub use adapter::{write_download, DeliveryAdapter, DeliveryError, DeliveryMethod, DeliveryOutcome};
pub use bridge::{BridgeCall, BridgeCapabilities, BridgeError, HapticStyle, HostBridge, MockBridge};
pub use clipboard::{Clipboard, ClipboardError, MemoryClipboard};
pub use store::{ImageStore, StoreError, StoredImage};
