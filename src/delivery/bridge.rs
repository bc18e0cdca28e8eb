//! Host application bridge.
//!
//! When the app runs embedded in a messaging host, the host exposes a
//! bridge object with lifecycle, UI and data-exchange hooks. Which of the
//! optional hooks exist varies between host versions, so the bridge
//! advertises them up front in [`BridgeCapabilities`] and callers branch on
//! that descriptor instead of probing.

use crate::events::{EventDispatcher, HandlerId};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Errors returned by bridge calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("host bridge does not support {0}")]
    Unsupported(&'static str),
    #[error("payload of {size} bytes exceeds the {limit} byte data channel")]
    TooLarge { size: usize, limit: usize },
    #[error("host rejected the request: {0}")]
    Rejected(String),
}

/// Optional hooks offered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeCapabilities {
    pub haptics: bool,
    pub alerts: bool,
    /// Maximum outbound payload in bytes; `None` when there is no channel.
    pub data_channel: Option<usize>,
    pub open_link: bool,
    pub share: bool,
}

impl BridgeCapabilities {
    /// Everything a current host offers, with the usual 4096 byte channel.
    pub fn full() -> Self {
        Self {
            haptics: true,
            alerts: true,
            data_channel: Some(4096),
            open_link: true,
            share: true,
        }
    }
}

/// Haptic feedback styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticStyle {
    Light,
    Medium,
    Success,
    Error,
}

/// The host application's bridge object.
///
/// The required methods exist on every host. Optional ones fail with
/// [`BridgeError::Unsupported`] unless the implementation overrides them
/// and advertises them in [`HostBridge::capabilities`].
pub trait HostBridge {
    fn capabilities(&self) -> BridgeCapabilities;

    /// Tells the host the app has finished loading.
    fn ready(&mut self);

    /// Expands the app to full height.
    fn expand(&mut self);

    fn set_header_color(&mut self, color: &str);

    fn set_main_button_text(&mut self, text: &str);

    fn show_main_button(&mut self);

    fn hide_main_button(&mut self);

    /// Registers a main-button click handler.
    fn on_main_button_click(&mut self, handler: Box<dyn FnMut()>) -> HandlerId;

    /// Removes a click handler registered with `on_main_button_click`.
    fn off_main_button_click(&mut self, id: HandlerId) -> bool;

    fn haptic(&mut self, _style: HapticStyle) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("haptic feedback"))
    }

    fn show_alert(&mut self, _text: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("alerts"))
    }

    /// Sends data to the bot behind the app. The host closes the app after
    /// a successful call.
    fn send_data(&mut self, _data: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("data channel"))
    }

    fn open_link(&mut self, _url: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("link opening"))
    }

    fn share_image(&mut self, _data_url: &str, _caption: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported("sharing"))
    }
}

/// A bridge shared with the page's event loop.
impl<B: HostBridge + ?Sized> HostBridge for Rc<RefCell<B>> {
    fn capabilities(&self) -> BridgeCapabilities {
        self.borrow().capabilities()
    }

    fn ready(&mut self) {
        self.borrow_mut().ready()
    }

    fn expand(&mut self) {
        self.borrow_mut().expand()
    }

    fn set_header_color(&mut self, color: &str) {
        self.borrow_mut().set_header_color(color)
    }

    fn set_main_button_text(&mut self, text: &str) {
        self.borrow_mut().set_main_button_text(text)
    }

    fn show_main_button(&mut self) {
        self.borrow_mut().show_main_button()
    }

    fn hide_main_button(&mut self) {
        self.borrow_mut().hide_main_button()
    }

    fn on_main_button_click(&mut self, handler: Box<dyn FnMut()>) -> HandlerId {
        self.borrow_mut().on_main_button_click(handler)
    }

    fn off_main_button_click(&mut self, id: HandlerId) -> bool {
        self.borrow_mut().off_main_button_click(id)
    }

    fn haptic(&mut self, style: HapticStyle) -> Result<(), BridgeError> {
        self.borrow_mut().haptic(style)
    }

    fn show_alert(&mut self, text: &str) -> Result<(), BridgeError> {
        self.borrow_mut().show_alert(text)
    }

    fn send_data(&mut self, data: &str) -> Result<(), BridgeError> {
        self.borrow_mut().send_data(data)
    }

    fn open_link(&mut self, url: &str) -> Result<(), BridgeError> {
        self.borrow_mut().open_link(url)
    }

    fn share_image(&mut self, data_url: &str, caption: &str) -> Result<(), BridgeError> {
        self.borrow_mut().share_image(data_url, caption)
    }
}

/// A call observed by [`MockBridge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCall {
    Ready,
    Expand,
    HeaderColor(String),
    MainButtonText(String),
    ShowMainButton,
    HideMainButton,
    Haptic(HapticStyle),
    Alert(String),
    SendData(String),
    OpenLink(String),
    ShareImage(String),
}

/// In-memory bridge recording every call.
#[derive(Debug)]
pub struct MockBridge {
    capabilities: BridgeCapabilities,
    calls: Vec<BridgeCall>,
    main_button_visible: bool,
    clicks: EventDispatcher<()>,
    reject_next_send: Option<String>,
}

impl MockBridge {
    pub fn new() -> Self {
        Self::with_capabilities(BridgeCapabilities::full())
    }

    pub fn with_capabilities(capabilities: BridgeCapabilities) -> Self {
        Self {
            capabilities,
            calls: Vec::new(),
            main_button_visible: false,
            clicks: EventDispatcher::new(),
            reject_next_send: None,
        }
    }

    pub fn calls(&self) -> &[BridgeCall] {
        &self.calls
    }

    /// Number of recorded calls equal to `call`.
    pub fn count(&self, call: &BridgeCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    /// Payloads passed to `send_data`.
    pub fn sent(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                BridgeCall::SendData(data) => Some(data.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn main_button_visible(&self) -> bool {
        self.main_button_visible
    }

    pub fn click_handlers(&self) -> usize {
        self.clicks.len()
    }

    /// Simulates the user pressing the main button.
    pub fn click_main_button(&mut self) {
        self.clicks.emit(&());
    }

    /// Makes the next `send_data` fail as if the host refused it.
    pub fn reject_next_send(&mut self, reason: impl Into<String>) {
        self.reject_next_send = Some(reason.into());
    }
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBridge for MockBridge {
    fn capabilities(&self) -> BridgeCapabilities {
        self.capabilities
    }

    fn ready(&mut self) {
        self.calls.push(BridgeCall::Ready);
    }

    fn expand(&mut self) {
        self.calls.push(BridgeCall::Expand);
    }

    fn set_header_color(&mut self, color: &str) {
        self.calls.push(BridgeCall::HeaderColor(color.to_string()));
    }

    fn set_main_button_text(&mut self, text: &str) {
        self.calls.push(BridgeCall::MainButtonText(text.to_string()));
    }

    fn show_main_button(&mut self) {
        self.main_button_visible = true;
        self.calls.push(BridgeCall::ShowMainButton);
    }

    fn hide_main_button(&mut self) {
        self.main_button_visible = false;
        self.calls.push(BridgeCall::HideMainButton);
    }

    fn on_main_button_click(&mut self, mut handler: Box<dyn FnMut()>) -> HandlerId {
        self.clicks.subscribe(move |_| handler())
    }

    fn off_main_button_click(&mut self, id: HandlerId) -> bool {
        self.clicks.unsubscribe(id)
    }

    fn haptic(&mut self, style: HapticStyle) -> Result<(), BridgeError> {
        if !self.capabilities.haptics {
            return Err(BridgeError::Unsupported("haptic feedback"));
        }
        self.calls.push(BridgeCall::Haptic(style));
        Ok(())
    }

    fn show_alert(&mut self, text: &str) -> Result<(), BridgeError> {
        if !self.capabilities.alerts {
            return Err(BridgeError::Unsupported("alerts"));
        }
        self.calls.push(BridgeCall::Alert(text.to_string()));
        Ok(())
    }

    fn send_data(&mut self, data: &str) -> Result<(), BridgeError> {
        let limit = self
            .capabilities
            .data_channel
            .ok_or(BridgeError::Unsupported("data channel"))?;
        if data.len() > limit {
            return Err(BridgeError::TooLarge {
                size: data.len(),
                limit,
            });
        }
        if let Some(reason) = self.reject_next_send.take() {
            return Err(BridgeError::Rejected(reason));
        }
        self.calls.push(BridgeCall::SendData(data.to_string()));
        Ok(())
    }

    fn open_link(&mut self, url: &str) -> Result<(), BridgeError> {
        if !self.capabilities.open_link {
            return Err(BridgeError::Unsupported("link opening"));
        }
        self.calls.push(BridgeCall::OpenLink(url.to_string()));
        Ok(())
    }

    fn share_image(&mut self, data_url: &str, _caption: &str) -> Result<(), BridgeError> {
        if !self.capabilities.share {
            return Err(BridgeError::Unsupported("sharing"));
        }
        self.calls.push(BridgeCall::ShareImage(data_url.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct MinimalBridge;

    impl HostBridge for MinimalBridge {
        fn capabilities(&self) -> BridgeCapabilities {
            BridgeCapabilities::default()
        }
        fn ready(&mut self) {}
        fn expand(&mut self) {}
        fn set_header_color(&mut self, _color: &str) {}
        fn set_main_button_text(&mut self, _text: &str) {}
        fn show_main_button(&mut self) {}
        fn hide_main_button(&mut self) {}
        fn on_main_button_click(&mut self, _handler: Box<dyn FnMut()>) -> HandlerId {
            EventDispatcher::<()>::new().subscribe(|_| {})
        }
        fn off_main_button_click(&mut self, _id: HandlerId) -> bool {
            false
        }
    }

    #[test]
    fn test_optional_hooks_default_to_unsupported() {
        let mut bridge = MinimalBridge;
        assert_eq!(bridge.capabilities().data_channel, None);
        assert!(matches!(
            bridge.send_data("x"),
            Err(BridgeError::Unsupported(_))
        ));
        assert!(matches!(
            bridge.haptic(HapticStyle::Light),
            Err(BridgeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_mock_enforces_channel_limit() {
        let mut bridge = MockBridge::with_capabilities(BridgeCapabilities {
            data_channel: Some(8),
            ..Default::default()
        });
        assert_eq!(
            bridge.send_data("0123456789"),
            Err(BridgeError::TooLarge { size: 10, limit: 8 })
        );
        bridge.send_data("short").unwrap();
        assert_eq!(bridge.sent(), vec!["short"]);
    }

    #[test]
    fn test_click_handlers() {
        let mut bridge = MockBridge::new();
        let clicks = Rc::new(Cell::new(0));

        let c = Rc::clone(&clicks);
        let id = bridge.on_main_button_click(Box::new(move || c.set(c.get() + 1)));
        bridge.click_main_button();
        assert!(bridge.off_main_button_click(id));
        bridge.click_main_button();

        assert_eq!(clicks.get(), 1);
        assert_eq!(bridge.click_handlers(), 0);
    }

    #[test]
    fn test_link_and_share_follow_capabilities() {
        let mut bridge = MockBridge::new();
        bridge.open_link("https://example.org/help").unwrap();
        bridge.share_image("data:image/jpeg;base64,AA==", "Photo").unwrap();
        assert_eq!(
            bridge.calls(),
            &[
                BridgeCall::OpenLink("https://example.org/help".into()),
                BridgeCall::ShareImage("data:image/jpeg;base64,AA==".into()),
            ]
        );

        let mut older = MockBridge::with_capabilities(BridgeCapabilities::default());
        assert_eq!(
            older.open_link("https://example.org/help"),
            Err(BridgeError::Unsupported("link opening"))
        );
        assert!(older.calls().is_empty());
    }
}
