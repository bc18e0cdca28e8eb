//! Error classification.
//!
//! Module errors stay specific; [`ErrorKind`] groups them by what the user
//! can do about it, which decides how the app reacts.

use crate::capture::SessionError;
use crate::delivery::{BridgeError, DeliveryError};
use crate::photo::ImageError;
use serde::Serialize;
use thiserror::Error;

/// How a failure affects the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Refused by the user or platform; fixed only in external settings.
    PermissionDenied,
    /// No camera, or the camera is held elsewhere.
    DeviceUnavailable,
    /// The platform lacks the feature; the control is disabled.
    CapabilityUnsupported,
    /// The operation was abandoned; the previous state is kept.
    TransientOperationFailure,
    /// Recompression could not fit the destination limit.
    PayloadTooLarge,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::DeviceUnavailable => "device_unavailable",
            ErrorKind::CapabilityUnsupported => "capability_unsupported",
            ErrorKind::TransientOperationFailure => "transient",
            ErrorKind::PayloadTooLarge => "payload_too_large",
        }
    }

    /// True when retrying inside the app cannot help.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::PermissionDenied
                | ErrorKind::DeviceUnavailable
                | ErrorKind::CapabilityUnsupported
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::PermissionDenied => ErrorKind::PermissionDenied,
            SessionError::DeviceNotFound | SessionError::DeviceInUse => {
                ErrorKind::DeviceUnavailable
            }
            SessionError::Unsupported => ErrorKind::CapabilityUnsupported,
            SessionError::NotActive
            | SessionError::Acquisition(_)
            | SessionError::Capture(_) => ErrorKind::TransientOperationFailure,
        }
    }
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeliveryError::Image(ImageError::PayloadTooLarge { .. }) => ErrorKind::PayloadTooLarge,
            DeliveryError::Bridge(BridgeError::Unsupported(_)) | DeliveryError::Unavailable(_) => {
                ErrorKind::CapabilityUnsupported
            }
            _ => ErrorKind::TransientOperationFailure,
        }
    }
}

/// Any failure of a user action.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Session(e) => e.kind(),
            Error::Delivery(e) => e.kind(),
        }
    }

    /// Text shown in the status line or host alert.
    pub fn user_message(&self) -> String {
        match self {
            Error::Session(e) => e.user_message().to_string(),
            Error::Delivery(e) => e.user_message(),
        }
    }
}
