//! Camera session lifecycle.
//!
//! A [`CameraSession`] owns at most one live stream. Operations take
//! `&mut self` and run to completion on the caller's thread, so they never
//! overlap. While one is in flight the session publishes every control as
//! disabled; the page re-enables its buttons from the settled set published
//! when the operation ends.
//!
//! ```text
//! Idle --start ok--> Active --stop/hide/unload--> Idle
//! Active --switch ok--> Active        Active --switch fails--> Idle
//! Idle --visible, paused by hide, permission granted--> Active
//! ```

use super::device::{AcquireError, MediaDevices, MediaStream, StreamSettings, VideoConstraints};
use super::{CaptureConfig, FacingMode};
use crate::events::{Controls, EventDispatcher, HandlerId, SessionEvent, StatusMessage, StopReason};
use crate::photo::{CapturedImage, ImageError};
use thiserror::Error;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

/// Camera permission as far as this session knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

/// Page visibility reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Session operation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device found")]
    DeviceNotFound,
    #[error("camera is in use by another application")]
    DeviceInUse,
    #[error("media capture is not supported")]
    Unsupported,
    #[error("camera is not active")]
    NotActive,
    #[error("failed to acquire camera: {0}")]
    Acquisition(String),
    #[error("failed to capture photo: {0}")]
    Capture(String),
}

impl SessionError {
    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::PermissionDenied => {
                "Camera access was denied. Allow camera access in your settings and reopen the app."
            }
            SessionError::DeviceNotFound => "No camera was found on this device.",
            SessionError::DeviceInUse => "The camera is being used by another application.",
            SessionError::Unsupported => "Camera capture is not supported here.",
            SessionError::NotActive => "Start the camera first.",
            SessionError::Acquisition(_) => "Could not open the camera.",
            SessionError::Capture(_) => "Could not take a photo. Try again.",
        }
    }
}

impl From<AcquireError> for SessionError {
    fn from(e: AcquireError) -> Self {
        match e {
            AcquireError::Denied => SessionError::PermissionDenied,
            AcquireError::NotFound => SessionError::DeviceNotFound,
            AcquireError::InUse => SessionError::DeviceInUse,
            AcquireError::Unsupported => SessionError::Unsupported,
            other => SessionError::Acquisition(other.to_string()),
        }
    }
}

impl From<ImageError> for SessionError {
    fn from(e: ImageError) -> Self {
        SessionError::Capture(e.to_string())
    }
}

/// Owner of the device stream.
pub struct CameraSession<D: MediaDevices> {
    devices: D,
    config: CaptureConfig,
    stream: Option<D::Stream>,
    facing: FacingMode,
    permission: PermissionState,
    controls: Controls,
    paused_by_hide: bool,
    events: EventDispatcher<SessionEvent>,
}

impl<D: MediaDevices> CameraSession<D> {
    pub fn new(devices: D, config: CaptureConfig) -> Self {
        let facing = config.facing;
        let mut session = Self {
            devices,
            config,
            stream: None,
            facing,
            permission: PermissionState::Unknown,
            controls: Controls::all_disabled(),
            paused_by_hide: false,
            events: EventDispatcher::new(),
        };
        session.controls = session.settled_controls();
        session
    }

    /// Registers a handler for session events.
    pub fn subscribe(&mut self, handler: impl FnMut(&SessionEvent) + 'static) -> HandlerId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn state(&self) -> SessionState {
        if self.is_active() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    /// True iff a stream is held and still live.
    pub fn is_active(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_live())
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    /// Facing mode of the current (or most recent) stream.
    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Negotiated settings of the live stream.
    pub fn settings(&self) -> Option<StreamSettings> {
        self.stream
            .as_ref()
            .filter(|s| s.is_live())
            .map(|s| s.settings())
    }

    pub fn devices(&self) -> &D {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut D {
        &mut self.devices
    }

    /// Starts the camera, reusing a cached live stream when there is one.
    pub fn start(&mut self, facing: FacingMode) -> Result<StreamSettings, SessionError> {
        if let Some(settings) = self.settings() {
            tracing::debug!(device = %settings.device_id, "Reusing cached stream");
            self.emit_ready(&settings);
            return Ok(settings);
        }
        // A held stream whose track ended is released before re-acquiring.
        self.release(StopReason::TrackEnded);

        if !self.devices.is_supported() {
            self.publish_controls();
            return Err(self.fail(SessionError::Unsupported));
        }
        if self.permission == PermissionState::Denied {
            return Err(self.fail(SessionError::PermissionDenied));
        }

        self.set_controls(Controls::all_disabled());
        self.status(StatusMessage::info("Requesting camera access..."));

        let constraints = self.base_constraints().with_facing(facing);
        let result = self.acquire(&constraints);

        match result {
            Ok(stream) => {
                let settings = self.adopt(stream, facing);
                tracing::info!(
                    width = settings.width,
                    height = settings.height,
                    facing = %self.facing,
                    "Camera started"
                );
                self.publish_controls();
                self.emit_ready(&settings);
                Ok(settings)
            }
            Err(e) => {
                let error = self.classify(e);
                self.publish_controls();
                Err(self.fail(error))
            }
        }
    }

    /// Stops every track and clears the cached stream. Does nothing when
    /// already stopped.
    pub fn stop(&mut self) {
        self.paused_by_hide = false;
        if self.release(StopReason::Requested) {
            self.publish_controls();
            self.status(StatusMessage::info("Camera stopped"));
        }
    }

    /// Switches to the next camera.
    ///
    /// With several discrete inputs the device ids are cycled; otherwise
    /// the facing mode is toggled. The current stream is released before
    /// the new one is requested, so a failure leaves the session idle with
    /// its start control enabled again.
    pub fn switch_facing(&mut self) -> Result<StreamSettings, SessionError> {
        let current = match self.settings() {
            Some(settings) => settings,
            None => return Err(self.fail(SessionError::NotActive)),
        };

        self.set_controls(Controls::all_disabled());

        let (constraints, facing) = self.next_camera(&current);
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        tracing::debug!(from = %current.device_id, ?constraints, "Switching camera");

        let result = self.acquire(&constraints);

        match result {
            Ok(stream) => {
                let settings = self.adopt(stream, facing);
                tracing::info!(
                    device = %settings.device_id,
                    facing = %self.facing,
                    "Camera switched"
                );
                self.publish_controls();
                self.emit_ready(&settings);
                Ok(settings)
            }
            Err(e) => {
                let error = self.classify(e);
                self.events.emit(&SessionEvent::Stopped {
                    reason: StopReason::SwitchFailed,
                });
                self.publish_controls();
                Err(self.fail(error))
            }
        }
    }

    /// Renders the current frame onto a canvas of the negotiated size.
    pub fn capture(&mut self) -> Result<CapturedImage, SessionError> {
        let settings = match self.settings() {
            Some(settings) => settings,
            None => return Err(self.fail(SessionError::NotActive)),
        };

        self.set_controls(Controls::all_disabled());

        let frame = match self.stream.as_mut() {
            Some(stream) => stream.grab_frame(),
            None => Err(AcquireError::Ended),
        };
        let result = frame.map_err(SessionError::from).and_then(|frame| {
            tracing::trace!(sequence = frame.sequence(), age = ?frame.age(), "Rendering frame");
            CapturedImage::render(
                frame,
                settings.width,
                settings.height,
                self.config.format,
                self.config.quality,
            )
            .map_err(SessionError::from)
        });

        match result {
            Ok(image) => {
                self.publish_controls();
                tracing::info!(
                    width = image.width(),
                    height = image.height(),
                    sequence = image.sequence(),
                    "Photo captured"
                );
                self.status(StatusMessage::success("Photo captured"));
                Ok(image.with_facing(settings.facing))
            }
            Err(error) => {
                if !self.is_active() {
                    self.release(StopReason::TrackEnded);
                }
                self.publish_controls();
                Err(self.fail(error))
            }
        }
    }

    /// Pauses on hide; resumes on show if the pause came from a hide and
    /// permission was granted earlier. Returns the settings when resumed.
    pub fn set_visibility(
        &mut self,
        visibility: Visibility,
    ) -> Result<Option<StreamSettings>, SessionError> {
        match visibility {
            Visibility::Hidden => {
                if self.release(StopReason::Hidden) {
                    self.paused_by_hide = true;
                    self.publish_controls();
                    tracing::info!("Camera paused while hidden");
                }
                Ok(None)
            }
            Visibility::Visible => {
                if !self.paused_by_hide || self.permission != PermissionState::Granted {
                    return Ok(None);
                }
                self.paused_by_hide = false;
                tracing::info!("Resuming camera");
                self.start(self.facing).map(Some)
            }
        }
    }

    /// Forces a stop when the page goes away.
    pub fn unload(&mut self) {
        self.paused_by_hide = false;
        if self.release(StopReason::Unload) {
            self.publish_controls();
        }
    }

    /// Releases a held stream whose track ended on its own.
    pub fn check_tracks(&mut self) -> bool {
        if self.stream.is_some() && !self.is_active() {
            self.release(StopReason::TrackEnded);
            self.publish_controls();
            self.status(StatusMessage::error("Camera disconnected"));
            return true;
        }
        false
    }

    fn base_constraints(&self) -> VideoConstraints {
        VideoConstraints::ideal(self.config.ideal_width, self.config.ideal_height)
            .with_frame_rate(self.config.frame_rate)
    }

    fn next_camera(&mut self, current: &StreamSettings) -> (VideoConstraints, FacingMode) {
        let inputs = match self.devices.enumerate_video_inputs() {
            Ok(inputs) => inputs,
            Err(e) => {
                tracing::debug!(error = %e, "Device enumeration failed, toggling facing mode");
                Vec::new()
            }
        };

        if inputs.len() > 1 {
            let index = inputs
                .iter()
                .position(|d| d.device_id == current.device_id)
                .map_or(0, |i| (i + 1) % inputs.len());
            let next = &inputs[index];
            let facing = next.facing.unwrap_or_else(|| self.facing.toggled());
            (self.base_constraints().with_device(&next.device_id), facing)
        } else {
            let facing = self.facing.toggled();
            (self.base_constraints().with_facing(facing), facing)
        }
    }

    /// Requests a stream, relaxing constraints only when the device
    /// rejects the combination.
    fn acquire(&mut self, constraints: &VideoConstraints) -> Result<D::Stream, AcquireError> {
        let mut attempts = vec![constraints.clone()];
        for fallback in [constraints.selection_only(), VideoConstraints::any()] {
            if !attempts.contains(&fallback) {
                attempts.push(fallback);
            }
        }

        let mut last_error = AcquireError::NotFound;
        for attempt in &attempts {
            match self.devices.get_user_media(attempt) {
                Ok(stream) => return Ok(stream),
                Err(AcquireError::Overconstrained(reason)) => {
                    tracing::debug!(%reason, ?attempt, "Constraints rejected, relaxing");
                    last_error = AcquireError::Overconstrained(reason);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    fn adopt(&mut self, stream: D::Stream, requested: FacingMode) -> StreamSettings {
        let settings = stream.settings();
        self.facing = settings.facing.unwrap_or(requested);
        self.permission = PermissionState::Granted;
        self.stream = Some(stream);
        settings
    }

    fn classify(&mut self, error: AcquireError) -> SessionError {
        tracing::warn!(error = %error, "Camera acquisition failed");
        if error == AcquireError::Denied {
            self.permission = PermissionState::Denied;
        }
        SessionError::from(error)
    }

    fn release(&mut self, reason: StopReason) -> bool {
        match self.stream.take() {
            Some(mut stream) => {
                stream.stop();
                tracing::info!(?reason, "Camera stream released");
                self.events.emit(&SessionEvent::Stopped { reason });
                true
            }
            None => false,
        }
    }

    fn settled_controls(&self) -> Controls {
        let active = self.is_active();
        Controls {
            start: !active
                && self.devices.is_supported()
                && self.permission != PermissionState::Denied,
            stop: active,
            switch: active,
            capture: active,
        }
    }

    fn publish_controls(&mut self) {
        let controls = self.settled_controls();
        self.set_controls(controls);
    }

    fn set_controls(&mut self, controls: Controls) {
        if self.controls != controls {
            self.controls = controls;
            self.events.emit(&SessionEvent::ControlsChanged(controls));
        }
    }

    fn emit_ready(&mut self, settings: &StreamSettings) {
        self.events.emit(&SessionEvent::Ready {
            width: settings.width,
            height: settings.height,
            facing: self.facing,
        });
        self.status(StatusMessage::success(format!(
            "Camera ready ({}x{})",
            settings.width, settings.height
        )));
    }

    fn status(&mut self, message: StatusMessage) {
        self.events.emit(&SessionEvent::Status(message));
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        self.status(StatusMessage::error(error.user_message()));
        error
    }
}

impl<D: MediaDevices> Drop for CameraSession<D> {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockMediaDevices;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn session() -> CameraSession<MockMediaDevices> {
        CameraSession::new(MockMediaDevices::new(), CaptureConfig::default())
    }

    fn recorded(
        session: &mut CameraSession<MockMediaDevices>,
    ) -> Rc<RefCell<Vec<SessionEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        session.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        events
    }

    #[test]
    fn test_start_negotiates_and_grants() {
        let mut session = session();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.controls().start);

        let settings = session.start(FacingMode::Front).unwrap();

        assert_eq!((settings.width, settings.height), (1280, 720));
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.permission(), PermissionState::Granted);
        assert_eq!(session.facing(), FacingMode::Front);
        let controls = session.controls();
        assert!(!controls.start && controls.stop && controls.switch && controls.capture);
    }

    #[test]
    fn test_start_reuses_cached_stream() {
        let mut session = session();
        session.start(FacingMode::Back).unwrap();
        session.start(FacingMode::Back).unwrap();

        assert_eq!(session.devices().requests().len(), 1);
        assert_eq!(session.devices().live_tracks(), 1);
    }

    #[test]
    fn test_start_falls_back_on_overconstrained() {
        let devices = MockMediaDevices::new().rejecting_combined_constraints();
        let mut session = CameraSession::new(devices, CaptureConfig::default());

        let settings = session.start(FacingMode::Back).unwrap();

        assert_eq!(session.devices().requests().len(), 2);
        assert!(!session.devices().requests()[1].has_resolution());
        assert_eq!(settings.device_id, "back-0");
    }

    #[test]
    fn test_denied_is_sticky() {
        let mut session = session();
        session.devices_mut().fail_next(AcquireError::Denied);

        assert_eq!(
            session.start(FacingMode::Back).unwrap_err(),
            SessionError::PermissionDenied
        );
        assert_eq!(session.permission(), PermissionState::Denied);
        assert!(!session.controls().start);

        assert_eq!(
            session.start(FacingMode::Back).unwrap_err(),
            SessionError::PermissionDenied
        );
        assert_eq!(session.devices().requests().len(), 1);
    }

    #[test]
    fn test_failures_are_classified() {
        for (injected, expected) in [
            (AcquireError::NotFound, SessionError::DeviceNotFound),
            (AcquireError::InUse, SessionError::DeviceInUse),
        ] {
            let mut session = session();
            session.devices_mut().fail_next(injected);
            assert_eq!(session.start(FacingMode::Back).unwrap_err(), expected);
            assert_eq!(session.state(), SessionState::Idle);
            assert!(session.controls().start);
        }
    }

    #[test]
    fn test_unsupported_disables_start() {
        let mut session =
            CameraSession::new(MockMediaDevices::unsupported(), CaptureConfig::default());
        assert!(!session.controls().start);
        assert_eq!(
            session.start(FacingMode::Back).unwrap_err(),
            SessionError::Unsupported
        );
        assert!(session.devices().requests().is_empty());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut session = session();
        let events = recorded(&mut session);
        session.start(FacingMode::Back).unwrap();

        session.stop();
        let after_first = (session.state(), session.controls(), events.borrow().len());
        session.stop();
        let after_second = (session.state(), session.controls(), events.borrow().len());

        assert_eq!(after_first, after_second);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.devices().live_tracks(), 0);
    }

    #[test]
    fn test_switch_cycles_devices() {
        let mut session = session();
        session.start(FacingMode::Front).unwrap();

        let settings = session.switch_facing().unwrap();
        assert_eq!(settings.device_id, "back-0");
        assert_eq!(session.facing(), FacingMode::Back);

        let settings = session.switch_facing().unwrap();
        assert_eq!(settings.device_id, "front-0");
        assert_eq!(session.devices().live_tracks(), 1);
    }

    #[test]
    fn test_switch_toggles_facing_with_single_device() {
        let devices = MockMediaDevices::empty().with_device("cam", FacingMode::Back, 1280, 720);
        let mut session = CameraSession::new(devices, CaptureConfig::default());
        session.start(FacingMode::Back).unwrap();

        session.switch_facing().unwrap();

        let last = session.devices().requests().last().unwrap().clone();
        assert_eq!(last.facing, Some(FacingMode::Front));
        assert!(last.device_id.is_none());
    }

    #[test]
    fn test_switch_requires_active_session() {
        let mut session = session();
        assert_eq!(session.switch_facing().unwrap_err(), SessionError::NotActive);
    }

    #[test]
    fn test_switch_failure_restores_controls() {
        let mut session = session();
        let events = recorded(&mut session);
        session.start(FacingMode::Front).unwrap();
        session.devices_mut().fail_next(AcquireError::InUse);

        assert_eq!(session.switch_facing().unwrap_err(), SessionError::DeviceInUse);

        assert_eq!(session.state(), SessionState::Idle);
        let controls = session.controls();
        assert!(controls.start);
        assert!(!controls.switch && !controls.capture && !controls.stop);

        let events = events.borrow();
        assert!(events.contains(&SessionEvent::ControlsChanged(Controls::all_disabled())));
        assert!(events.contains(&SessionEvent::Stopped {
            reason: StopReason::SwitchFailed
        }));
        assert_eq!(
            events.iter().rev().find_map(|e| match e {
                SessionEvent::ControlsChanged(c) => Some(*c),
                _ => None,
            }),
            Some(controls)
        );
    }

    #[test]
    fn test_capture_matches_negotiated_size() {
        let mut session = session();
        session.start(FacingMode::Front).unwrap();

        let image = session.capture().unwrap();
        assert_eq!((image.width(), image.height()), (1280, 720));
        assert_eq!(image.quality(), 92);
        assert_eq!(image.facing(), Some(FacingMode::Front));
    }

    #[test]
    fn test_capture_scales_mismatched_frames() {
        let devices = MockMediaDevices::new().with_frame_size(640, 360);
        let mut session = CameraSession::new(devices, CaptureConfig::default());
        session.start(FacingMode::Back).unwrap();

        let image = session.capture().unwrap();
        assert_eq!((image.width(), image.height()), (1280, 720));
    }

    #[test]
    fn test_capture_without_stream() {
        let mut session = session();
        assert_eq!(session.capture().unwrap_err(), SessionError::NotActive);
    }

    #[test]
    fn test_hide_then_show_resumes() {
        let mut session = session();
        session.start(FacingMode::Front).unwrap();

        session.set_visibility(Visibility::Hidden).unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.devices().live_tracks(), 0);

        let resumed = session.set_visibility(Visibility::Visible).unwrap();
        assert!(resumed.is_some());
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.facing(), FacingMode::Front);
    }

    #[test]
    fn test_show_without_grant_never_prompts() {
        let mut session = session();
        session.devices_mut().fail_next(AcquireError::Denied);
        let _ = session.start(FacingMode::Back);

        session.set_visibility(Visibility::Hidden).unwrap();
        assert!(session.set_visibility(Visibility::Visible).unwrap().is_none());
        assert_eq!(session.devices().requests().len(), 1);
    }

    #[test]
    fn test_explicit_stop_is_not_resumed() {
        let mut session = session();
        session.start(FacingMode::Back).unwrap();
        session.stop();

        session.set_visibility(Visibility::Hidden).unwrap();
        assert!(session.set_visibility(Visibility::Visible).unwrap().is_none());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_unload_stops_and_clears_resume() {
        let mut session = session();
        session.start(FacingMode::Back).unwrap();
        session.set_visibility(Visibility::Hidden).unwrap();
        session.unload();

        assert!(session.set_visibility(Visibility::Visible).unwrap().is_none());
        assert_eq!(session.devices().live_tracks(), 0);
    }

    #[test]
    fn test_ended_track_is_released() {
        let mut session = session();
        session.start(FacingMode::Back).unwrap();
        session.devices_mut().end_all_tracks();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.check_tracks());
        assert!(session.controls().start);

        session.start(FacingMode::Back).unwrap();
        assert_eq!(session.devices().requests().len(), 2);
    }
}
