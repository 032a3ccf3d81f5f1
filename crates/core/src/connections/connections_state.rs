//! Connection lifecycle state machine.
//!
//! ```text
//! PENDING ──popup opened──▶ IN_PROGRESS ──authorized──▶ AUTHORIZED ──revoke──▶ REVOKED
//!    │                           │                          └────────expire──▶ EXPIRED
//!    └──────────fail─────────────┴──fail──▶ FAILED
//! ```
//!
//! There is no path back to `PENDING`; re-linking always creates a new
//! connection.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::connections_model::{BankConnection, ConnectionStatus};
use crate::errors::{Result, TransitionError};

const MACHINE: &str = "connection";

/// Events that drive a connection through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionEvent {
    /// The authorization popup was opened
    PopupOpened,
    /// The provider confirmed the grant
    Authorize,
    /// The user disconnected
    Revoke,
    /// A sync failure revealed the provider token is no longer valid
    Expire,
    /// OAuth error, blocked popup, or the popup was closed before completion
    Fail,
}

impl ConnectionEvent {
    pub const ALL: [ConnectionEvent; 5] = [
        ConnectionEvent::PopupOpened,
        ConnectionEvent::Authorize,
        ConnectionEvent::Revoke,
        ConnectionEvent::Expire,
        ConnectionEvent::Fail,
    ];
}

impl std::fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionEvent::PopupOpened => "POPUP_OPENED",
            ConnectionEvent::Authorize => "AUTHORIZE",
            ConnectionEvent::Revoke => "REVOKE",
            ConnectionEvent::Expire => "EXPIRE",
            ConnectionEvent::Fail => "FAIL",
        };
        f.write_str(name)
    }
}

/// Computes the next connection status, or fails with `InvalidTransition`.
///
/// Unlisted pairs are rejected rather than clamped to a nearby state.
pub fn transition(current: ConnectionStatus, event: ConnectionEvent) -> Result<ConnectionStatus> {
    use ConnectionEvent as E;
    use ConnectionStatus as S;

    let next = match (current, event) {
        (S::Pending, E::PopupOpened) => S::InProgress,
        (S::Pending, E::Fail) => S::Failed,
        (S::InProgress, E::Authorize) => S::Authorized,
        (S::InProgress, E::Fail) => S::Failed,
        (S::Authorized, E::Revoke) => S::Revoked,
        (S::Authorized, E::Expire) => S::Expired,
        (from, event) => return Err(TransitionError::new(MACHINE, from, event).into()),
    };
    Ok(next)
}

impl BankConnection {
    /// Applies `event` in place, bumping `updated_at`. Returns the previous status.
    pub fn apply(&mut self, event: ConnectionEvent) -> Result<ConnectionStatus> {
        let next = transition(self.status, event)?;
        let previous = std::mem::replace(&mut self.status, next);
        self.updated_at = Utc::now();
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::BankProvider;
    use crate::errors::Error;

    #[test]
    fn test_happy_path_to_authorized() {
        let status = transition(ConnectionStatus::Pending, ConnectionEvent::PopupOpened).unwrap();
        assert_eq!(status, ConnectionStatus::InProgress);
        let status = transition(status, ConnectionEvent::Authorize).unwrap();
        assert_eq!(status, ConnectionStatus::Authorized);
    }

    #[test]
    fn test_authorized_only_leaves_to_revoked_or_expired() {
        assert_eq!(
            transition(ConnectionStatus::Authorized, ConnectionEvent::Revoke).unwrap(),
            ConnectionStatus::Revoked
        );
        assert_eq!(
            transition(ConnectionStatus::Authorized, ConnectionEvent::Expire).unwrap(),
            ConnectionStatus::Expired
        );
        assert!(transition(ConnectionStatus::Authorized, ConnectionEvent::Fail).is_err());
        assert!(transition(ConnectionStatus::Authorized, ConnectionEvent::PopupOpened).is_err());
    }

    #[test]
    fn test_revoked_to_authorized_fails_loudly() {
        let err = transition(ConnectionStatus::Revoked, ConnectionEvent::Authorize).unwrap_err();
        match err {
            Error::InvalidTransition(e) => {
                assert_eq!(e.machine, "connection");
                assert_eq!(e.from, "REVOKED");
                assert_eq!(e.event, "AUTHORIZE");
            }
            other => panic!("Expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_pending_can_fail_when_popup_is_blocked() {
        assert_eq!(
            transition(ConnectionStatus::Pending, ConnectionEvent::Fail).unwrap(),
            ConnectionStatus::Failed
        );
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        for from in ConnectionStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for event in ConnectionEvent::ALL {
                assert!(transition(*from, event).is_err(), "{} + {}", from, event);
            }
        }
    }

    #[test]
    fn test_apply_updates_connection() {
        let mut connection = BankConnection::new("conn-1", BankProvider::Tink);
        let previous = connection.apply(ConnectionEvent::PopupOpened).unwrap();
        assert_eq!(previous, ConnectionStatus::Pending);
        assert_eq!(connection.status, ConnectionStatus::InProgress);

        assert!(connection.apply(ConnectionEvent::Revoke).is_err());
        assert_eq!(connection.status, ConnectionStatus::InProgress);
    }

    #[test]
    fn test_mark_authorized_sets_expiry() {
        let mut connection = BankConnection::new("conn-1", BankProvider::Yapily);
        let now = Utc::now();
        connection.mark_authorized(now, Some(3600));
        assert_eq!(connection.authorized_at, Some(now));
        assert_eq!(connection.expires_at, Some(now + chrono::Duration::seconds(3600)));
        assert!(!connection.is_past_expiry(now));
        assert!(connection.is_past_expiry(now + chrono::Duration::seconds(3600)));

        connection.mark_authorized(now, None);
        assert!(connection.expires_at.is_none());
    }
}
