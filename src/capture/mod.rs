//! Camera session management.
//!
//! This module owns everything between the platform's media capability
//! and a rendered still: stream constraints and acquisition, the session
//! state machine, and the configuration that drives them.

mod config;
mod device;
mod frame;
#[cfg(feature = "camera")]
mod native;
mod session;

pub use config::{
    BridgeConfig, CaptureConfig, ConfigError, DeliveryConfig, FileConfig, StorageConfig,
};
pub use device::{
    AcquireError, DeviceInfo, FacingMode, MediaDevices, MediaStream, MockMediaDevices, MockStream,
    StreamSettings, VideoConstraints,
};
pub use frame::Frame;
#[cfg(feature = "camera")]
pub use native::{NativeMediaDevices, NativeStream};
pub use session::{CameraSession, PermissionState, SessionError, SessionState, Visibility};
