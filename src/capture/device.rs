//! Media device abstraction.
//!
//! The session talks to cameras only through [`MediaDevices`] and
//! [`MediaStream`], so the platform backend (a native webcam, a browser
//! bridge) and the scripted [`MockMediaDevices`] used in tests are
//! interchangeable.

use super::Frame;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use thiserror::Error;

/// Logical camera selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// User-facing camera.
    Front,
    /// Environment-facing camera.
    Back,
}

impl FacingMode {
    /// Returns the opposite facing mode.
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::Front => FacingMode::Back,
            FacingMode::Back => FacingMode::Front,
        }
    }

    /// Constraint value understood by media capture APIs.
    pub fn as_constraint(self) -> &'static str {
        match self {
            FacingMode::Front => "user",
            FacingMode::Back => "environment",
        }
    }
}

impl std::fmt::Display for FacingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacingMode::Front => f.write_str("front"),
            FacingMode::Back => f.write_str("back"),
        }
    }
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(FacingMode::Front),
            "back" | "environment" | "rear" => Ok(FacingMode::Back),
            other => Err(format!("unknown facing mode: {other}")),
        }
    }
}

/// Constraints for a video stream request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoConstraints {
    pub ideal_width: Option<u32>,
    pub ideal_height: Option<u32>,
    pub facing: Option<FacingMode>,
    /// Exact device id; takes precedence over `facing`.
    pub device_id: Option<String>,
    pub frame_rate: Option<u32>,
}

impl VideoConstraints {
    /// Any camera, no hints.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn ideal(width: u32, height: u32) -> Self {
        Self {
            ideal_width: Some(width),
            ideal_height: Some(height),
            ..Default::default()
        }
    }

    pub fn with_facing(mut self, facing: FacingMode) -> Self {
        self.facing = Some(facing);
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: Option<u32>) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Drops resolution and frame-rate hints, keeping device selection.
    pub fn selection_only(&self) -> Self {
        Self {
            facing: self.facing,
            device_id: self.device_id.clone(),
            ..Default::default()
        }
    }

    pub fn has_resolution(&self) -> bool {
        self.ideal_width.is_some() || self.ideal_height.is_some()
    }

    pub fn has_selection(&self) -> bool {
        self.facing.is_some() || self.device_id.is_some()
    }
}

/// What the device actually negotiated for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
    pub facing: Option<FacingMode>,
    pub device_id: String,
}

/// A video input reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
    pub facing: Option<FacingMode>,
}

/// Classified stream acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error("camera access was denied")]
    Denied,
    #[error("no camera device found")]
    NotFound,
    #[error("camera is in use by another application")]
    InUse,
    #[error("media capture is not supported")]
    Unsupported,
    #[error("constraints could not be satisfied: {0}")]
    Overconstrained(String),
    #[error("video track has ended")]
    Ended,
    #[error("camera error: {0}")]
    Other(String),
}

/// A live video stream. Dropping the handle does not release the device;
/// call [`MediaStream::stop`].
pub trait MediaStream {
    /// Negotiated stream parameters.
    fn settings(&self) -> StreamSettings;

    /// True while at least one video track is live.
    fn is_live(&self) -> bool;

    /// Reads the current frame.
    fn grab_frame(&mut self) -> Result<Frame, AcquireError>;

    /// Stops every track. Calling it on a stopped stream does nothing.
    fn stop(&mut self);
}

/// Source of video streams.
pub trait MediaDevices {
    type Stream: MediaStream;

    /// False when the platform has no media capture capability at all.
    fn is_supported(&self) -> bool;

    /// Requests a stream, prompting for permission if needed.
    fn get_user_media(
        &mut self,
        constraints: &VideoConstraints,
    ) -> Result<Self::Stream, AcquireError>;

    /// Lists the discrete video inputs.
    fn enumerate_video_inputs(&mut self) -> Result<Vec<DeviceInfo>, AcquireError>;
}

#[derive(Debug, Clone)]
struct MockDevice {
    info: DeviceInfo,
    native_width: u32,
    native_height: u32,
}

/// Scripted media devices for tests and the demo binary.
///
/// Streams produce a smooth synthetic gradient. Failures can be queued
/// with [`MockMediaDevices::fail_next`] and are consumed one per request.
#[derive(Debug)]
pub struct MockMediaDevices {
    devices: Vec<MockDevice>,
    supported: bool,
    reject_combined: bool,
    frame_size: Option<(u32, u32)>,
    failures: VecDeque<AcquireError>,
    requests: Vec<VideoConstraints>,
    tracks: Vec<Rc<Cell<bool>>>,
}

impl MockMediaDevices {
    /// One front and one back camera, both 1920x1080.
    pub fn new() -> Self {
        Self::empty()
            .with_device("front-0", FacingMode::Front, 1920, 1080)
            .with_device("back-0", FacingMode::Back, 1920, 1080)
    }

    /// A platform with media support but no cameras.
    pub fn empty() -> Self {
        Self {
            devices: Vec::new(),
            supported: true,
            reject_combined: false,
            frame_size: None,
            failures: VecDeque::new(),
            requests: Vec::new(),
            tracks: Vec::new(),
        }
    }

    /// A platform without media capture.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::empty()
        }
    }

    pub fn with_device(
        mut self,
        device_id: &str,
        facing: FacingMode,
        native_width: u32,
        native_height: u32,
    ) -> Self {
        self.devices.push(MockDevice {
            info: DeviceInfo {
                device_id: device_id.to_string(),
                label: format!("{facing} camera ({device_id})"),
                facing: Some(facing),
            },
            native_width,
            native_height,
        });
        self
    }

    /// Rejects requests that combine resolution hints with a camera
    /// selection, as some mobile browsers do.
    pub fn rejecting_combined_constraints(mut self) -> Self {
        self.reject_combined = true;
        self
    }

    /// Produces frames of a fixed size regardless of the negotiated one.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }

    /// Queues a failure for the next acquisition request.
    pub fn fail_next(&mut self, error: AcquireError) {
        self.failures.push_back(error);
    }

    /// Every constraint set requested so far.
    pub fn requests(&self) -> &[VideoConstraints] {
        &self.requests
    }

    /// Number of tracks currently live.
    pub fn live_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.get()).count()
    }

    /// Ends every live track, as when the device is unplugged.
    pub fn end_all_tracks(&mut self) {
        for track in &self.tracks {
            track.set(false);
        }
    }

    fn select(&self, constraints: &VideoConstraints) -> Result<&MockDevice, AcquireError> {
        if let Some(id) = &constraints.device_id {
            return self
                .devices
                .iter()
                .find(|d| &d.info.device_id == id)
                .ok_or(AcquireError::NotFound);
        }
        let preferred = constraints
            .facing
            .and_then(|f| self.devices.iter().find(|d| d.info.facing == Some(f)));
        preferred
            .or_else(|| self.devices.first())
            .ok_or(AcquireError::NotFound)
    }
}

impl Default for MockMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDevices for MockMediaDevices {
    type Stream = MockStream;

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn get_user_media(
        &mut self,
        constraints: &VideoConstraints,
    ) -> Result<MockStream, AcquireError> {
        self.requests.push(constraints.clone());

        if !self.supported {
            return Err(AcquireError::Unsupported);
        }
        if let Some(error) = self.failures.pop_front() {
            return Err(error);
        }
        if self.reject_combined && constraints.has_resolution() && constraints.has_selection() {
            return Err(AcquireError::Overconstrained(
                "resolution with camera selection".to_string(),
            ));
        }

        let device = self.select(constraints)?;
        let width = constraints
            .ideal_width
            .map_or(device.native_width, |w| w.min(device.native_width));
        let height = constraints
            .ideal_height
            .map_or(device.native_height, |h| h.min(device.native_height));

        let settings = StreamSettings {
            width,
            height,
            facing: device.info.facing,
            device_id: device.info.device_id.clone(),
        };
        let live = Rc::new(Cell::new(true));
        self.tracks.retain(|t| t.get());
        self.tracks.push(Rc::clone(&live));

        tracing::debug!(
            device = %settings.device_id,
            width,
            height,
            "MockMediaDevices opened stream"
        );

        Ok(MockStream {
            frame_size: self.frame_size.unwrap_or((width, height)),
            settings,
            live,
            sequence: 0,
        })
    }

    fn enumerate_video_inputs(&mut self) -> Result<Vec<DeviceInfo>, AcquireError> {
        if !self.supported {
            return Err(AcquireError::Unsupported);
        }
        Ok(self.devices.iter().map(|d| d.info.clone()).collect())
    }
}

/// Stream handed out by [`MockMediaDevices`].
#[derive(Debug)]
pub struct MockStream {
    settings: StreamSettings,
    frame_size: (u32, u32),
    live: Rc<Cell<bool>>,
    sequence: u64,
}

impl MediaStream for MockStream {
    fn settings(&self) -> StreamSettings {
        self.settings.clone()
    }

    fn is_live(&self) -> bool {
        self.live.get()
    }

    fn grab_frame(&mut self) -> Result<Frame, AcquireError> {
        if !self.live.get() {
            return Err(AcquireError::Ended);
        }
        let (width, height) = self.frame_size;
        let shift = (self.sequence % 256) as u32;
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                // Smooth gradient, cheap to compress.
                pixels.push(((x * 255 / width.max(1) + shift) % 256) as u8);
                pixels.push(((y * 255 / height.max(1)) % 256) as u8);
                pixels.push(128);
            }
        }
        self.sequence += 1;
        Ok(Frame::new(pixels, width, height, self.sequence))
    }

    fn stop(&mut self) {
        if self.live.replace(false) {
            tracing::debug!(device = %self.settings.device_id, "MockStream stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiates_down_to_ideal() {
        let mut devices = MockMediaDevices::new();
        let stream = devices
            .get_user_media(&VideoConstraints::ideal(1280, 720).with_facing(FacingMode::Front))
            .unwrap();

        let settings = stream.settings();
        assert_eq!((settings.width, settings.height), (1280, 720));
        assert_eq!(settings.facing, Some(FacingMode::Front));
        assert_eq!(settings.device_id, "front-0");
    }

    #[test]
    fn test_stream_stop_is_idempotent() {
        let mut devices = MockMediaDevices::new();
        let mut stream = devices.get_user_media(&VideoConstraints::any()).unwrap();
        assert_eq!(devices.live_tracks(), 1);

        stream.stop();
        stream.stop();
        assert!(!stream.is_live());
        assert_eq!(devices.live_tracks(), 0);
        assert_eq!(stream.grab_frame().unwrap_err(), AcquireError::Ended);
    }

    #[test]
    fn test_scripted_failure_consumed_once() {
        let mut devices = MockMediaDevices::new();
        devices.fail_next(AcquireError::InUse);

        assert_eq!(
            devices.get_user_media(&VideoConstraints::any()).unwrap_err(),
            AcquireError::InUse
        );
        assert!(devices.get_user_media(&VideoConstraints::any()).is_ok());
    }

    #[test]
    fn test_combined_constraints_rejected() {
        let mut devices = MockMediaDevices::new().rejecting_combined_constraints();
        let full = VideoConstraints::ideal(1280, 720).with_facing(FacingMode::Back);

        assert!(matches!(
            devices.get_user_media(&full),
            Err(AcquireError::Overconstrained(_))
        ));
        assert!(devices.get_user_media(&full.selection_only()).is_ok());
    }

    #[test]
    fn test_frame_matches_settings() {
        let mut devices = MockMediaDevices::new();
        let mut stream = devices
            .get_user_media(&VideoConstraints::ideal(64, 48))
            .unwrap();

        let frame = stream.grab_frame().unwrap();
        assert!(frame.is_complete());
        assert_eq!((frame.width(), frame.height()), (64, 48));
    }

    #[test]
    fn test_facing_mode_parse() {
        assert_eq!("user".parse::<FacingMode>().unwrap(), FacingMode::Front);
        assert_eq!("Back".parse::<FacingMode>().unwrap(), FacingMode::Back);
        assert!("sideways".parse::<FacingMode>().is_err());
        assert_eq!(FacingMode::Front.toggled(), FacingMode::Back);
    }
}
