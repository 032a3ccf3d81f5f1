//! OAuth popup flow: opens the provider's consent page in a popup and
//! settles on exactly one outcome.

mod coordinator;
mod message;
mod origin;
mod settlement;
mod window;

pub use coordinator::{
    OAuthPopupCoordinator, PopupErrorCode, PopupHandle, PopupOutcome, PopupRequest, PopupSession,
};
pub use message::{parse_signal, CrossWindowMessage, OAuthSignal};
pub use origin::OriginPolicy;
pub use settlement::Settlement;
pub use window::{PopupHost, PopupOpenError, PopupSpec, PopupWindow, WindowBounds};

#[cfg(test)]
pub(crate) mod test_support;
