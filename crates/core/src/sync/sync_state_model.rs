//! Account sync state machine.
//!
//! Linked accounts move `PENDING → SYNCING → SYNCED | ERROR` on explicit
//! sync requests. Losing the owning connection forces `DISCONNECTED` from
//! any state, including mid-sync. Manual accounts never enter this machine.

use serde::{Deserialize, Serialize};

use crate::accounts::BankAccount;
use crate::connections::{BankConnection, ConnectionStatus};
use crate::errors::{Error, Result, TransitionError};

const MACHINE: &str = "account_sync";

/// Data-refresh status of a bank account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Never synced yet
    #[default]
    Pending,
    /// A sync call is in flight
    Syncing,
    /// Last sync succeeded
    Synced,
    /// Last sync failed; the last known balance is kept
    Error,
    /// The owning connection was revoked or expired
    Disconnected,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 5] = [
        SyncStatus::Pending,
        SyncStatus::Syncing,
        SyncStatus::Synced,
        SyncStatus::Error,
        SyncStatus::Disconnected,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "Waiting for first sync",
            SyncStatus::Syncing => "Syncing",
            SyncStatus::Synced => "Up to date",
            SyncStatus::Error => "Sync failed",
            SyncStatus::Disconnected => "Disconnected",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Syncing => "SYNCING",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Error => "ERROR",
            SyncStatus::Disconnected => "DISCONNECTED",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive an account's sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    Requested,
    Completed,
    Failed,
    /// The owning connection became REVOKED or EXPIRED
    ConnectionLost,
}

impl SyncEvent {
    pub const ALL: [SyncEvent; 4] = [
        SyncEvent::Requested,
        SyncEvent::Completed,
        SyncEvent::Failed,
        SyncEvent::ConnectionLost,
    ];
}

impl std::fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncEvent::Requested => "REQUESTED",
            SyncEvent::Completed => "COMPLETED",
            SyncEvent::Failed => "FAILED",
            SyncEvent::ConnectionLost => "CONNECTION_LOST",
        };
        f.write_str(name)
    }
}

/// Computes the next sync status, or fails with `InvalidTransition`.
///
/// `SYNCING + REQUESTED` stays `SYNCING`: a duplicate request is absorbed.
pub fn transition(current: SyncStatus, event: SyncEvent) -> Result<SyncStatus> {
    use SyncEvent as E;
    use SyncStatus as S;

    let next = match (current, event) {
        (_, E::ConnectionLost) => S::Disconnected,
        (S::Pending | S::Synced | S::Error, E::Requested) => S::Syncing,
        (S::Syncing, E::Requested) => S::Syncing,
        (S::Syncing, E::Completed) => S::Synced,
        (S::Syncing, E::Failed) => S::Error,
        (from, event) => return Err(TransitionError::new(MACHINE, from, event).into()),
    };
    Ok(next)
}

/// The status a caller should observe for `account`.
///
/// Manual accounts always read `SYNCED`. A stale owning connection dominates
/// whatever status was last stored.
pub fn effective_sync_status(
    account: &BankAccount,
    connection_status: Option<ConnectionStatus>,
) -> SyncStatus {
    if account.is_manual {
        return SyncStatus::Synced;
    }
    match connection_status {
        Some(status) if status.is_stale() => SyncStatus::Disconnected,
        _ => account.sync_status,
    }
}

/// Decision for an incoming sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStart {
    /// The account moved to `SYNCING`; the caller should perform the sync.
    Started,
    /// The stored status is already `SYNCING`. Whether a sync is actually
    /// running is up to the caller that tracks in-flight work.
    AlreadySyncing,
}

/// Validates a sync request for `account` owned by `connection` and returns
/// whether a new sync should begin.
pub fn plan_sync_request(account: &BankAccount, connection: &BankConnection) -> Result<SyncStart> {
    if account.is_manual {
        return Err(Error::SyncRejected {
            account_id: account.id.clone(),
            reason: "manual accounts are not sync-eligible".to_string(),
        });
    }

    let current = effective_sync_status(account, Some(connection.status));
    if current == SyncStatus::Syncing {
        return Ok(SyncStart::AlreadySyncing);
    }
    if current != SyncStatus::Disconnected && connection.status != ConnectionStatus::Authorized {
        return Err(Error::ConnectionNotReady {
            connection_id: connection.id.clone(),
            status: connection.status.to_string(),
        });
    }

    transition(current, SyncEvent::Requested)?;
    Ok(SyncStart::Started)
}
