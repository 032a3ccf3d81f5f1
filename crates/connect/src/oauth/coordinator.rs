//! Drives the cross-window OAuth handshake and reports one terminal outcome.

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};

use super::message::{parse_signal, CrossWindowMessage, OAuthSignal};
use super::origin::OriginPolicy;
use super::settlement::Settlement;
use super::window::{PopupHost, PopupOpenError, PopupSpec, PopupWindow, WindowBounds};
use crate::config::{ConnectConfig, PopupConfig};

/// Why a popup flow ended in error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupErrorCode {
    /// The environment refused to open the window. The user can allow
    /// popups and try again.
    PopupBlocked,
    /// The provider reported a failure. The message is passed through as-is.
    #[serde(rename = "oauth_error")]
    OAuthError,
}

impl PopupErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopupErrorCode::PopupBlocked => "popup_blocked",
            PopupErrorCode::OAuthError => "oauth_error",
        }
    }
}

/// Terminal outcome of a popup flow. Reported at most once per flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PopupOutcome {
    #[serde(rename_all = "camelCase")]
    Success { connection_id: String },
    Error {
        code: PopupErrorCode,
        message: Option<String>,
    },
    /// The user closed the popup before any terminal message arrived.
    Cancelled,
}

impl PopupOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PopupOutcome::Success { .. })
    }

    pub fn error_code(&self) -> Option<PopupErrorCode> {
        match self {
            PopupOutcome::Error { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Everything needed to run one popup flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRequest {
    pub connection_id: String,
    pub redirect_url: String,
    /// Origins allowed to settle this flow: the page that embeds it and the
    /// provider hosting the consent pages.
    pub origins: OriginPolicy,
    /// Overrides [`PopupConfig::close_on_error`] for this flow.
    pub close_on_error: Option<bool>,
}

impl PopupRequest {
    pub fn new(
        connection_id: impl Into<String>,
        redirect_url: impl Into<String>,
        origins: OriginPolicy,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            redirect_url: redirect_url.into(),
            origins,
            close_on_error: None,
        }
    }

    pub fn with_close_on_error(mut self, close_on_error: bool) -> Self {
        self.close_on_error = Some(close_on_error);
        self
    }
}

/// Opens OAuth popups and supervises them until they settle.
///
/// Each flow listens for cross-window messages and polls the popup for
/// closure concurrently. Whichever produces a terminal result first settles
/// the flow; later signals are dropped.
pub struct OAuthPopupCoordinator {
    host: Arc<dyn PopupHost>,
    config: PopupConfig,
}

impl OAuthPopupCoordinator {
    pub fn new(host: Arc<dyn PopupHost>, config: PopupConfig) -> Self {
        Self { host, config }
    }

    pub fn from_config(host: Arc<dyn PopupHost>, config: &ConnectConfig) -> Self {
        Self::new(host, config.popup.clone())
    }

    pub fn config(&self) -> &PopupConfig {
        &self.config
    }

    /// Starts a flow, invoking `on_outcome` exactly once when it settles, or
    /// never if the flow is cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F>(&self, request: PopupRequest, on_outcome: F) -> PopupHandle
    where
        F: FnOnce(PopupOutcome) + Send + 'static,
    {
        let settlement = Arc::new(Settlement::new(on_outcome));
        let spec = PopupSpec {
            url: request.redirect_url.clone(),
            name: format!("banklink-oauth-{}", request.connection_id),
            bounds: WindowBounds::centered_within(
                &self.host.parent_bounds(),
                self.config.width,
                self.config.height,
            ),
        };

        let messages = self.host.subscribe_messages();
        let window = match self.host.open_popup(&spec) {
            Ok(window) => window,
            Err(err) => {
                warn!(
                    "[OAuthPopup] Could not open popup for connection {}: {}",
                    request.connection_id, err
                );
                let message = match err {
                    PopupOpenError::Blocked => None,
                    PopupOpenError::Failed(reason) => Some(reason),
                };
                settlement.settle(PopupOutcome::Error {
                    code: PopupErrorCode::PopupBlocked,
                    message,
                });
                return PopupHandle::new(settlement, None, false);
            }
        };
        debug!(
            "[OAuthPopup] Opened popup for connection {} at {:?}",
            request.connection_id, spec.bounds
        );

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let close_on_error = request
            .close_on_error
            .unwrap_or(self.config.close_on_error);
        let supervisor = Supervisor {
            policy: request.origins,
            connection_id: request.connection_id,
            window,
            settlement: settlement.clone(),
            config: self.config.clone(),
            close_on_error,
        };
        tokio::spawn(supervisor.run(messages, cancel_rx));

        PopupHandle::new(settlement, Some(cancel_tx), true)
    }

    /// Starts a flow whose outcome is awaited instead of called back.
    pub fn open(&self, request: PopupRequest) -> PopupSession {
        let (tx, rx) = oneshot::channel();
        let handle = self.start(request, move |outcome| {
            let _ = tx.send(outcome);
        });
        PopupSession {
            handle,
            outcome: rx,
        }
    }
}

struct HandleInner {
    settlement: Arc<Settlement<PopupOutcome>>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
    window_opened: bool,
}

/// Caller-side control over a running flow. Cheap to clone.
#[derive(Clone)]
pub struct PopupHandle {
    inner: Arc<HandleInner>,
}

impl PopupHandle {
    fn new(
        settlement: Arc<Settlement<PopupOutcome>>,
        cancel: Option<oneshot::Sender<()>>,
        window_opened: bool,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                settlement,
                cancel: Mutex::new(cancel),
                window_opened,
            }),
        }
    }

    /// Abandons the flow: closes the popup if still open, stops polling and
    /// removes the message listener. No outcome is reported.
    ///
    /// Returns `false` (and does nothing) if the flow already settled or was
    /// already cancelled.
    pub fn cancel(&self) -> bool {
        if !self.inner.settlement.discard() {
            return false;
        }
        let sender = self
            .inner
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
        true
    }

    /// True once an outcome was reported or the flow was cancelled.
    pub fn is_settled(&self) -> bool {
        self.inner.settlement.is_settled()
    }

    pub fn window_opened(&self) -> bool {
        self.inner.window_opened
    }
}

impl std::fmt::Debug for PopupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopupHandle")
            .field("settled", &self.is_settled())
            .field("window_opened", &self.inner.window_opened)
            .finish()
    }
}

/// A flow whose outcome can be awaited.
pub struct PopupSession {
    handle: PopupHandle,
    outcome: oneshot::Receiver<PopupOutcome>,
}

impl PopupSession {
    /// Waits for the terminal outcome. `None` means the flow was cancelled.
    pub async fn outcome(self) -> Option<PopupOutcome> {
        self.outcome.await.ok()
    }

    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    /// A handle that can cancel this flow while its outcome is awaited.
    pub fn canceller(&self) -> PopupHandle {
        self.handle.clone()
    }
}

enum Exit {
    Succeeded,
    Failed,
    Cancelled,
    WindowClosed,
}

struct Supervisor {
    policy: OriginPolicy,
    connection_id: String,
    window: Arc<dyn PopupWindow>,
    settlement: Arc<Settlement<PopupOutcome>>,
    config: PopupConfig,
    close_on_error: bool,
}

impl Supervisor {
    async fn run(
        self,
        mut messages: mpsc::UnboundedReceiver<CrossWindowMessage>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let interval = self.config.poll_interval;
        let mut poll = time::interval_at(Instant::now() + interval, interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cancel_armed = true;
        let mut listening = true;

        let exit = loop {
            tokio::select! {
                biased;

                cancelled = &mut cancel_rx, if cancel_armed => {
                    if cancelled.is_ok() {
                        break Exit::Cancelled;
                    }
                    // Every handle dropped; the flow keeps running unattended.
                    cancel_armed = false;
                }

                message = messages.recv(), if listening => match message {
                    Some(message) => {
                        if let Some(exit) = self.handle_message(message) {
                            break exit;
                        }
                    }
                    None => {
                        debug!("[OAuthPopup] Message channel closed for connection {}", self.connection_id);
                        listening = false;
                    }
                },

                _ = poll.tick() => {
                    if self.window.is_closed() {
                        if self.settlement.settle(PopupOutcome::Cancelled) {
                            info!("[OAuthPopup] Popup closed by user for connection {}", self.connection_id);
                            break Exit::WindowClosed;
                        }
                        break Exit::Cancelled;
                    }
                }
            }
        };

        // Stops the listener before any grace delay.
        drop(messages);

        match exit {
            Exit::Succeeded => {
                time::sleep(self.config.success_close_delay).await;
                self.window.close();
            }
            Exit::Failed => {
                if self.close_on_error {
                    self.window.close();
                }
            }
            Exit::Cancelled => {
                if !self.window.is_closed() {
                    self.window.close();
                }
                debug!("[OAuthPopup] Flow cancelled for connection {}", self.connection_id);
            }
            Exit::WindowClosed => {}
        }
    }

    fn handle_message(&self, message: CrossWindowMessage) -> Option<Exit> {
        if !self.policy.is_trusted(&message.origin) {
            trace!("[OAuthPopup] Ignoring message from {}", message.origin);
            return None;
        }
        let Some(signal) = parse_signal(&message.data) else {
            trace!("[OAuthPopup] Ignoring unrecognized message from {}", message.origin);
            return None;
        };

        let outcome = match signal {
            OAuthSignal::Progress => {
                trace!("[OAuthPopup] Progress message for connection {}", self.connection_id);
                return None;
            }
            OAuthSignal::Success { connection_id } => {
                if let Some(reported) = connection_id.filter(|id| *id != self.connection_id) {
                    debug!(
                        "[OAuthPopup] Provider reported id {} for connection {}",
                        reported, self.connection_id
                    );
                }
                PopupOutcome::Success {
                    connection_id: self.connection_id.clone(),
                }
            }
            OAuthSignal::Error { message } => PopupOutcome::Error {
                code: PopupErrorCode::OAuthError,
                message,
            },
        };

        let succeeded = outcome.is_success();
        if !self.settlement.settle(outcome) {
            return Some(Exit::Cancelled);
        }
        if succeeded {
            info!("[OAuthPopup] Authorization completed for connection {}", self.connection_id);
            Some(Exit::Succeeded)
        } else {
            warn!("[OAuthPopup] Provider reported an error for connection {}", self.connection_id);
            Some(Exit::Failed)
        }
    }
}
