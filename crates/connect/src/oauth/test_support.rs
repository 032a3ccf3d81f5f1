//! In-memory popup host shared by the coordinator and link service tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use super::{CrossWindowMessage, PopupHost, PopupOpenError, PopupSpec, PopupWindow, WindowBounds};

#[derive(Default)]
pub struct FakeWindow {
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl FakeWindow {
    /// The user closes the window themselves.
    pub fn user_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl PopupWindow for FakeWindow {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Parent window of 1600x1000 at the origin. Messages are delivered to the
/// latest subscriber only.
#[derive(Default)]
pub struct FakeHost {
    pub window: Arc<FakeWindow>,
    blocked: bool,
    sender: Mutex<Option<mpsc::UnboundedSender<CrossWindowMessage>>>,
    opened: Mutex<Vec<PopupSpec>>,
}

impl FakeHost {
    pub fn blocking() -> Self {
        Self {
            blocked: true,
            ..Self::default()
        }
    }

    /// Posts a message as if sent from `origin`. False if nobody listens.
    pub fn post(&self, origin: &str, data: Value) -> bool {
        match self.sender.lock().unwrap().as_ref() {
            Some(sender) => sender.send(CrossWindowMessage::new(origin, data)).is_ok(),
            None => false,
        }
    }

    pub fn listener_removed(&self) -> bool {
        self.sender
            .lock()
            .unwrap()
            .as_ref()
            .map(|sender| sender.is_closed())
            .unwrap_or(true)
    }

    pub fn opened(&self) -> Vec<PopupSpec> {
        self.opened.lock().unwrap().clone()
    }
}

impl PopupHost for FakeHost {
    fn parent_bounds(&self) -> WindowBounds {
        WindowBounds::new(0, 0, 1600, 1000)
    }

    fn open_popup(&self, spec: &PopupSpec) -> Result<Arc<dyn PopupWindow>, PopupOpenError> {
        if self.blocked {
            return Err(PopupOpenError::Blocked);
        }
        self.opened.lock().unwrap().push(spec.clone());
        Ok(self.window.clone())
    }

    fn subscribe_messages(&self) -> mpsc::UnboundedReceiver<CrossWindowMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock().unwrap() = Some(tx);
        rx
    }
}
