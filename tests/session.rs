use camera_share::capture::{
    AcquireError, CameraSession, CaptureConfig, FacingMode, MockMediaDevices, PermissionState,
    SessionError, SessionState, Visibility,
};
use camera_share::events::{SessionEvent, StopReason};
use std::cell::RefCell;
use std::rc::Rc;

fn recording(session: &mut CameraSession<MockMediaDevices>) -> Rc<RefCell<Vec<SessionEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    session.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    events
}

#[test]
fn front_capture_at_negotiated_resolution() {
    let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());
    let events = recording(&mut session);

    let settings = session.start(FacingMode::Front).unwrap();
    assert_eq!((settings.width, settings.height), (1280, 720));
    assert_eq!(session.state(), SessionState::Active);
    assert!(events.borrow().iter().any(|e| matches!(
        e,
        SessionEvent::Ready {
            width: 1280,
            height: 720,
            facing: FacingMode::Front
        }
    )));

    let image = session.capture().unwrap();
    assert_eq!((image.width(), image.height()), (1280, 720));
    assert_eq!(image.facing(), Some(FacingMode::Front));

    let jpeg = image.encode().unwrap();
    assert_eq!(&jpeg.bytes()[..2], &[0xFF, 0xD8]);
}

#[test]
fn start_twice_holds_one_stream() {
    let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());

    session.start(FacingMode::Back).unwrap();
    session.start(FacingMode::Back).unwrap();

    assert_eq!(session.devices().requests().len(), 1);
    assert_eq!(session.devices().live_tracks(), 1);
}

#[test]
fn stop_releases_tracks_and_is_idempotent() {
    let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());
    let events = recording(&mut session);

    session.start(FacingMode::Back).unwrap();
    session.stop();
    session.stop();

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.devices().live_tracks(), 0);
    let stops = events
        .borrow()
        .iter()
        .filter(|e| matches!(e, SessionEvent::Stopped { .. }))
        .count();
    assert_eq!(stops, 1);
}

#[test]
fn failed_switch_leaves_start_enabled() {
    let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());
    let events = recording(&mut session);
    session.start(FacingMode::Back).unwrap();

    session.devices_mut().fail_next(AcquireError::InUse);
    let result = session.switch_facing();

    assert!(matches!(result, Err(SessionError::DeviceInUse)));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.devices().live_tracks(), 0);

    let controls = session.controls();
    assert!(controls.start);
    assert!(!controls.stop);
    assert!(!controls.switch);
    assert!(!controls.capture);
    assert!(events.borrow().iter().any(|e| matches!(
        e,
        SessionEvent::Stopped {
            reason: StopReason::SwitchFailed
        }
    )));

    // The user can recover with a plain start.
    session.start(FacingMode::Back).unwrap();
    assert!(session.is_active());
}

#[test]
fn switch_cycles_between_cameras() {
    let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());
    session.start(FacingMode::Back).unwrap();

    let settings = session.switch_facing().unwrap();
    assert_eq!(settings.device_id, "front-0");
    assert_eq!(session.facing(), FacingMode::Front);
    assert_eq!(session.devices().live_tracks(), 1);

    let settings = session.switch_facing().unwrap();
    assert_eq!(settings.device_id, "back-0");
}

#[test]
fn overconstrained_request_is_relaxed() {
    let devices = MockMediaDevices::new().rejecting_combined_constraints();
    let mut session = CameraSession::new(devices, CaptureConfig::default());

    let settings = session.start(FacingMode::Front).unwrap();

    assert_eq!(session.devices().requests().len(), 2);
    assert_eq!(settings.facing, Some(FacingMode::Front));
    assert_eq!((settings.width, settings.height), (1920, 1080));
}

#[test]
fn denied_permission_is_sticky() {
    let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());
    session.devices_mut().fail_next(AcquireError::Denied);

    assert!(matches!(
        session.start(FacingMode::Back),
        Err(SessionError::PermissionDenied)
    ));
    assert_eq!(session.permission(), PermissionState::Denied);
    assert!(!session.controls().start);

    assert!(matches!(
        session.start(FacingMode::Back),
        Err(SessionError::PermissionDenied)
    ));
    assert_eq!(session.devices().requests().len(), 1);
}

#[test]
fn unsupported_platform_never_requests() {
    let mut session =
        CameraSession::new(MockMediaDevices::unsupported(), CaptureConfig::default());

    assert!(matches!(
        session.start(FacingMode::Back),
        Err(SessionError::Unsupported)
    ));
    assert!(session.devices().requests().is_empty());
    assert!(!session.controls().any_enabled());
}

#[test]
fn no_camera_reports_not_found() {
    let mut session = CameraSession::new(MockMediaDevices::empty(), CaptureConfig::default());

    let error = session.start(FacingMode::Back).unwrap_err();
    assert!(matches!(error, SessionError::DeviceNotFound));
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn hidden_page_pauses_and_resumes() {
    let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());
    session.start(FacingMode::Back).unwrap();

    session.set_visibility(Visibility::Hidden).unwrap();
    assert!(!session.is_active());
    assert_eq!(session.devices().live_tracks(), 0);

    let resumed = session.set_visibility(Visibility::Visible).unwrap();
    assert!(resumed.is_some());
    assert!(session.is_active());
    assert_eq!(session.facing(), FacingMode::Back);
}

#[test]
fn explicit_stop_is_not_resumed() {
    let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());
    session.start(FacingMode::Back).unwrap();
    session.set_visibility(Visibility::Hidden).unwrap();
    session.stop();

    assert!(session.set_visibility(Visibility::Visible).unwrap().is_none());
    assert!(!session.is_active());
}

#[test]
fn ended_track_is_detected() {
    let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());
    session.start(FacingMode::Back).unwrap();

    session.devices_mut().end_all_tracks();
    assert!(!session.is_active());
    assert!(session.check_tracks());
    assert!(matches!(session.capture(), Err(SessionError::NotActive)));

    session.start(FacingMode::Back).unwrap();
    assert!(session.is_active());
}

#[test]
fn unload_releases_stream() {
    let mut session = CameraSession::new(MockMediaDevices::new(), CaptureConfig::default());
    session.start(FacingMode::Back).unwrap();
    session.unload();

    assert_eq!(session.devices().live_tracks(), 0);
    assert_eq!(session.state(), SessionState::Idle);
}
