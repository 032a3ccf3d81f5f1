//! Host-window abstraction for the popup flow.
//!
//! The coordinator never touches a real browser. Runtimes (a webview shell,
//! a desktop wrapper, a test fake) implement [`PopupHost`] and hand it in.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use super::message::CrossWindowMessage;

/// Screen rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowBounds {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowBounds {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// A `width` x `height` rectangle centered on `parent`, never placed at
    /// negative screen coordinates.
    pub fn centered_within(parent: &WindowBounds, width: u32, height: u32) -> Self {
        let offset = |outer: u32, inner: u32| (i64::from(outer) - i64::from(inner)) / 2;
        let left = i64::from(parent.left) + offset(parent.width, width);
        let top = i64::from(parent.top) + offset(parent.height, height);
        Self {
            left: left.clamp(0, i64::from(i32::MAX)) as i32,
            top: top.clamp(0, i64::from(i32::MAX)) as i32,
            width,
            height,
        }
    }
}

/// What the coordinator asks the host to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupSpec {
    pub url: String,
    pub name: String,
    pub bounds: WindowBounds,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PopupOpenError {
    /// The environment refused to create the window (popup blocker).
    #[error("Popup was blocked")]
    Blocked,

    #[error("Failed to open popup: {0}")]
    Failed(String),
}

/// A window opened by the host.
pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> bool;

    /// Closes the window. Closing an already closed window is a no-op.
    fn close(&self);
}

/// The embedding page: opens popups and delivers messages posted to it.
pub trait PopupHost: Send + Sync {
    /// Bounds of the invoking window, used to center the popup.
    fn parent_bounds(&self) -> WindowBounds;

    fn open_popup(
        &self,
        spec: &PopupSpec,
    ) -> std::result::Result<Arc<dyn PopupWindow>, PopupOpenError>;

    /// Registers a message listener. Dropping the receiver unregisters it.
    fn subscribe_messages(&self) -> mpsc::UnboundedReceiver<CrossWindowMessage>;
}
