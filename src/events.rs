//! Typed event dispatch.
//!
//! Handlers are registered explicitly and addressed by [`HandlerId`], so a
//! subscriber can be removed again (the `onClick`/`offClick` pattern of the
//! host bridge). Everything runs on the caller's thread; `emit` invokes the
//! handlers in registration order.

use crate::capture::FacingMode;
use serde::Serialize;

/// Identifier returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

type Handler<E> = Box<dyn FnMut(&E)>;

/// Registry of handlers for one event type.
pub struct EventDispatcher<E> {
    handlers: Vec<(HandlerId, Handler<E>)>,
    next_id: u64,
}

impl<E> EventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }

    /// Registers a handler and returns its id.
    pub fn subscribe(&mut self, handler: impl FnMut(&E) + 'static) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers.push((id, Box::new(handler)));
        id
    }

    /// Removes a handler. Returns false if the id was not registered.
    pub fn unsubscribe(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        self.handlers.len() != before
    }

    /// Delivers an event to every registered handler.
    pub fn emit(&mut self, event: &E) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(event);
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<E> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventDispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Enabled state of the user-facing controls.
///
/// Controls are the re-entrancy guard: an operation whose control is
/// disabled is refused rather than queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Controls {
    pub start: bool,
    pub stop: bool,
    pub switch: bool,
    pub capture: bool,
}

impl Controls {
    /// Every control disabled, used while an operation is in flight.
    pub fn all_disabled() -> Self {
        Self::default()
    }

    /// True if at least one control can be used.
    pub fn any_enabled(&self) -> bool {
        self.start || self.stop || self.switch || self.capture
    }
}

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Error,
}

/// User-visible status text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub level: StatusLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Success,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: StatusLevel::Error,
            text: text.into(),
        }
    }
}

/// Why a session went idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Requested,
    Hidden,
    Unload,
    SwitchFailed,
    TrackEnded,
}

/// Events published by a camera session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A stream is live with the negotiated dimensions.
    Ready {
        width: u32,
        height: u32,
        facing: FacingMode,
    },
    Stopped {
        reason: StopReason,
    },
    ControlsChanged(Controls),
    Status(StatusMessage),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_emit_reaches_handlers_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = EventDispatcher::<u32>::new();

        let a = Rc::clone(&seen);
        dispatcher.subscribe(move |e| a.borrow_mut().push(("a", *e)));
        let b = Rc::clone(&seen);
        dispatcher.subscribe(move |e| b.borrow_mut().push(("b", *e)));

        dispatcher.emit(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut dispatcher = EventDispatcher::<()>::new();

        let c = Rc::clone(&count);
        let id = dispatcher.subscribe(move |_| *c.borrow_mut() += 1);
        dispatcher.emit(&());
        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.emit(&());

        assert_eq!(*count.borrow(), 1);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_controls_all_disabled() {
        assert!(!Controls::all_disabled().any_enabled());
    }
}
