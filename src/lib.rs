//! Camera Share Library
//!
//! Camera session management and photo delivery for a capture mini-app
//! that runs standalone or embedded in a messaging host.
//!
//! # Architecture
//!
//! ```text
//! media devices → session → captured image → delivery adapter
//!                    ↓                          ↓
//!                 events               download / clipboard /
//!             (status, controls)        store / host bridge
//! ```
//!
//! # Design Principles
//!
//! - **One stream at a time**: a session never holds more than one live stream
//! - **Refuse, don't queue**: operations in flight disable the controls
//! - **Bounded payloads**: host sends are recompressed until they fit
//! - **Capability checks**: optional host hooks are checked before use
//!
//! # Example
//!
//! ```no_run
//! use camera_share::{
//!     capture::{CameraSession, CaptureConfig, DeliveryConfig, FacingMode, MockMediaDevices},
//!     delivery::{DeliveryAdapter, DeliveryMethod},
//! };
//!
//! let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());
//! session.start(FacingMode::Front).unwrap();
//!
//! let image = session.capture().unwrap();
//! let mut delivery = DeliveryAdapter::new(DeliveryConfig::default());
//! let outcome = delivery.deliver(&image, DeliveryMethod::Download, None).unwrap();
//! println!("{}", outcome.status().text);
//!
//! session.stop();
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod app;
pub mod capture;
pub mod delivery;
pub mod error;
pub mod events;
pub mod metrics;
pub mod photo;

// Re-export commonly used types at crate root
pub use app::{App, UiAction};
pub use capture::{CameraSession, CaptureConfig, FacingMode, FileConfig, MediaDevices, SessionError};
pub use delivery::{DeliveryAdapter, DeliveryMethod, DeliveryOutcome, HostBridge};
pub use error::{Error, ErrorKind};
pub use events::{SessionEvent, StatusMessage};
pub use photo::{CapturedImage, PayloadLimits};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
