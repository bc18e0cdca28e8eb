//! The mini-app: a camera session, a delivery adapter and, when embedded,
//! the host bridge, driven by a queue of user actions.
//!
//! Host callbacks (the main button) only enqueue actions; [`App::run_pending`]
//! drains the queue on the owning thread, so every action sees the app in a
//! settled state.

use crate::capture::{BridgeConfig, CameraSession, MediaDevices, Visibility};
use crate::delivery::{
    BridgeError, DeliveryAdapter, DeliveryError, DeliveryMethod, DeliveryOutcome, HapticStyle,
    HostBridge,
};
use crate::error::Error;
use crate::events::{HandlerId, SessionEvent, StatusMessage};
use crate::metrics::MetricsRegistry;
use crate::photo::CapturedImage;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Something the user (or the page) asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    Start,
    Stop,
    SwitchCamera,
    Capture,
    /// Deliver the latest capture, taking one first if there is none.
    Deliver(DeliveryMethod),
    /// Hand the latest capture to the host's share sheet.
    Share,
    Visibility(Visibility),
    Unload,
}

type ActionQueue = Rc<RefCell<VecDeque<UiAction>>>;

/// Application state owned by the page.
pub struct App<D: MediaDevices> {
    session: CameraSession<D>,
    delivery: DeliveryAdapter,
    bridge: Option<Box<dyn HostBridge>>,
    bridge_config: BridgeConfig,
    metrics: Option<MetricsRegistry>,
    actions: ActionQueue,
    status: Rc<RefCell<Vec<StatusMessage>>>,
    last_capture: Option<CapturedImage>,
    last_outcome: Option<DeliveryOutcome>,
    main_button_visible: bool,
    main_button_handler: Option<HandlerId>,
}

impl<D: MediaDevices> App<D> {
    pub fn new(
        mut session: CameraSession<D>,
        delivery: DeliveryAdapter,
        bridge: Option<Box<dyn HostBridge>>,
        bridge_config: BridgeConfig,
    ) -> Self {
        let status = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&status);
        session.subscribe(move |event| {
            if let SessionEvent::Status(message) = event {
                sink.borrow_mut().push(message.clone());
            }
        });

        Self {
            session,
            delivery,
            bridge,
            bridge_config,
            metrics: None,
            actions: Rc::new(RefCell::new(VecDeque::new())),
            status,
            last_capture: None,
            last_outcome: None,
            main_button_visible: false,
            main_button_handler: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Announces the app to the host and wires the main button.
    pub fn setup(&mut self) {
        let queue = Rc::clone(&self.actions);
        let Some(bridge) = self.bridge.as_mut() else {
            tracing::info!("Running standalone");
            return;
        };

        bridge.ready();
        bridge.expand();
        bridge.set_header_color(&self.bridge_config.header_color);
        bridge.set_main_button_text(&self.bridge_config.main_button_text);

        if let Some(old) = self.main_button_handler.take() {
            bridge.off_main_button_click(old);
        }
        let id = bridge.on_main_button_click(Box::new(move || {
            queue
                .borrow_mut()
                .push_back(UiAction::Deliver(DeliveryMethod::Bridge));
        }));
        self.main_button_handler = Some(id);

        let caps = bridge.capabilities();
        tracing::info!(
            data_channel = ?caps.data_channel,
            haptics = caps.haptics,
            alerts = caps.alerts,
            "Embedded in host"
        );
    }

    /// True when running inside a host that accepts data.
    pub fn is_embedded(&self) -> bool {
        self.bridge
            .as_ref()
            .is_some_and(|b| b.capabilities().data_channel.is_some())
    }

    /// Queues an action for the next [`App::run_pending`].
    pub fn dispatch(&self, action: UiAction) {
        self.actions.borrow_mut().push_back(action);
    }

    /// Runs queued actions in order. Failures are reported to the user and
    /// never abort the remaining actions.
    pub fn run_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let next = self.actions.borrow_mut().pop_front();
            let Some(action) = next else { break };
            if let Err(e) = self.handle(action) {
                self.report(&e);
            }
            handled += 1;
        }
        handled
    }

    /// Runs one action immediately.
    pub fn handle(&mut self, action: UiAction) -> Result<(), Error> {
        tracing::debug!(?action, "Handling action");
        match action {
            UiAction::Start => {
                let facing = self.session.facing();
                let result = self.session.start(facing);
                self.record_start(&result.as_ref().map(|_| ()));
                result?;
            }
            UiAction::Stop => {
                self.session.stop();
                if self.last_capture.is_none() {
                    self.hide_main_button();
                }
            }
            UiAction::SwitchCamera => {
                let result = self.session.switch_facing();
                self.record_start(&result.as_ref().map(|_| ()));
                result?;
            }
            UiAction::Capture => {
                self.capture()?;
            }
            UiAction::Deliver(method) => {
                self.deliver(method)?;
            }
            UiAction::Share => {
                self.share()?;
            }
            UiAction::Visibility(visibility) => {
                let result = self.session.set_visibility(visibility);
                if let Ok(Some(_)) | Err(_) = &result {
                    self.record_start(&result.as_ref().map(|_| ()));
                }
                result?;
            }
            UiAction::Unload => {
                self.session.unload();
                if let (Some(bridge), Some(id)) =
                    (self.bridge.as_mut(), self.main_button_handler.take())
                {
                    bridge.off_main_button_click(id);
                }
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.set_active(self.session.is_active());
        }
        Ok(())
    }

    fn capture(&mut self) -> Result<(), Error> {
        let image = self.session.capture()?;
        if let Some(metrics) = &self.metrics {
            metrics.record_capture();
        }
        self.last_capture = Some(image);
        self.haptic(HapticStyle::Light);
        self.show_main_button();
        Ok(())
    }

    fn deliver(&mut self, method: DeliveryMethod) -> Result<(), Error> {
        if self.last_capture.is_none() {
            self.capture()?;
        }
        let Some(image) = self.last_capture.as_ref() else {
            return Ok(());
        };

        let bridge: Option<&mut dyn HostBridge> = match self.bridge.as_mut() {
            Some(bridge) => Some(&mut **bridge),
            None => None,
        };
        let result = self.delivery.deliver(image, method, bridge);

        match result {
            Ok(outcome) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_delivery(&outcome);
                }
                if let DeliveryOutcome::ManualCopy { data_url } = &outcome {
                    tracing::info!(length = data_url.len(), "Image data ready for manual copy");
                }
                let status = outcome.status();
                if matches!(outcome, DeliveryOutcome::Sent { .. }) {
                    self.alert(&status.text);
                }
                self.push_status(status);
                self.haptic(HapticStyle::Success);
                self.last_outcome = Some(outcome);
                Ok(())
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_delivery_failure(e.kind());
                }
                Err(e.into())
            }
        }
    }

    fn share(&mut self) -> Result<(), Error> {
        if self.last_capture.is_none() {
            self.capture()?;
        }
        let Some(image) = self.last_capture.as_ref() else {
            return Ok(());
        };
        let Some(bridge) = self.bridge.as_mut() else {
            return Err(DeliveryError::Unavailable("host bridge").into());
        };
        if !bridge.capabilities().share {
            return Err(DeliveryError::Bridge(BridgeError::Unsupported("sharing")).into());
        }

        let data_url = image.encode().map_err(DeliveryError::from)?.data_url();
        let caption = image.captured_at().format("Photo %Y-%m-%d %H:%M").to_string();
        bridge
            .share_image(&data_url, &caption)
            .map_err(DeliveryError::from)?;

        tracing::info!(length = data_url.len(), "Photo handed to share sheet");
        self.push_status(StatusMessage::success("Photo shared"));
        self.haptic(HapticStyle::Success);
        Ok(())
    }

    fn record_start(&self, result: &Result<(), &crate::capture::SessionError>) {
        if let Some(metrics) = &self.metrics {
            match result {
                Ok(()) => metrics.record_start(),
                Err(e) => metrics.record_acquisition_failure(e.kind()),
            }
        }
    }

    fn show_main_button(&mut self) {
        if self.main_button_visible {
            return;
        }
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.set_main_button_text(&self.bridge_config.main_button_text);
            bridge.show_main_button();
            self.main_button_visible = true;
        }
    }

    fn hide_main_button(&mut self) {
        if !self.main_button_visible {
            return;
        }
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.hide_main_button();
        }
        self.main_button_visible = false;
    }

    fn haptic(&mut self, style: HapticStyle) {
        if let Some(bridge) = self.bridge.as_mut() {
            if bridge.capabilities().haptics {
                if let Err(e) = bridge.haptic(style) {
                    tracing::debug!(error = %e, "Haptic feedback failed");
                }
            }
        }
    }

    fn push_status(&mut self, message: StatusMessage) {
        self.status.borrow_mut().push(message);
    }

    /// Shows a failure to the user: status line, host alert and haptics
    /// where the host offers them. Session errors have already reached the
    /// status line through the session's own events.
    fn report(&mut self, error: &Error) {
        tracing::warn!(kind = %error.kind(), error = %error, "Action failed");
        let text = error.user_message();
        if matches!(error, Error::Delivery(_)) {
            self.push_status(StatusMessage::error(text.clone()));
        }
        self.haptic(HapticStyle::Error);
        self.alert(&text);
    }

    fn alert(&mut self, text: &str) {
        if let Some(bridge) = self.bridge.as_mut() {
            if bridge.capabilities().alerts {
                if let Err(e) = bridge.show_alert(text) {
                    tracing::debug!(error = %e, "Alert failed");
                }
            }
        }
    }

    pub fn session(&self) -> &CameraSession<D> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut CameraSession<D> {
        &mut self.session
    }

    pub fn metrics(&self) -> Option<&MetricsRegistry> {
        self.metrics.as_ref()
    }

    pub fn delivery(&self) -> &DeliveryAdapter {
        &self.delivery
    }

    pub fn last_capture(&self) -> Option<&CapturedImage> {
        self.last_capture.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&DeliveryOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn main_button_visible(&self) -> bool {
        self.main_button_visible
    }

    /// Every status message shown so far, oldest first.
    pub fn status_log(&self) -> Vec<StatusMessage> {
        self.status.borrow().clone()
    }

    pub fn last_status(&self) -> Option<StatusMessage> {
        self.status.borrow().last().cloned()
    }
}

/// Last-resort handler for errors nothing else caught. Logs only.
pub fn report_unhandled(error: &dyn std::error::Error) {
    tracing::error!(error = %error, "Unhandled error");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureConfig, DeliveryConfig, MockMediaDevices};
    use crate::delivery::{BridgeCall, MockBridge};

    fn standalone() -> App<MockMediaDevices> {
        let session =
            CameraSession::new(MockMediaDevices::new(), CaptureConfig::with_dimensions(64, 48));
        App::new(
            session,
            DeliveryAdapter::new(DeliveryConfig::default()),
            None,
            BridgeConfig::default(),
        )
    }

    #[test]
    fn test_standalone_setup_is_noop() {
        let mut app = standalone();
        app.setup();
        assert!(!app.is_embedded());
    }

    #[test]
    fn test_actions_run_in_order() {
        let mut app = standalone();
        app.dispatch(UiAction::Start);
        app.dispatch(UiAction::Capture);
        app.dispatch(UiAction::Stop);

        assert_eq!(app.run_pending(), 3);
        assert!(app.last_capture().is_some());
        assert!(!app.session().is_active());
    }

    #[test]
    fn test_failures_reach_status_log() {
        let mut app = standalone();
        app.dispatch(UiAction::Capture);
        app.run_pending();

        let last = app.last_status().unwrap();
        assert_eq!(last.text, "Start the camera first.");
    }

    #[test]
    fn test_main_button_shown_once() {
        let bridge = Rc::new(RefCell::new(MockBridge::new()));
        let session =
            CameraSession::new(MockMediaDevices::new(), CaptureConfig::with_dimensions(64, 48));
        let mut app = App::new(
            session,
            DeliveryAdapter::new(DeliveryConfig::default()),
            Some(Box::new(Rc::clone(&bridge))),
            BridgeConfig::default(),
        );
        app.setup();
        app.handle(UiAction::Start).unwrap();
        app.handle(UiAction::Capture).unwrap();
        app.handle(UiAction::Capture).unwrap();

        let bridge = bridge.borrow();
        assert_eq!(bridge.count(&BridgeCall::ShowMainButton), 1);
        assert!(bridge.main_button_visible());
        assert_eq!(bridge.count(&BridgeCall::Haptic(HapticStyle::Light)), 2);
    }
}
