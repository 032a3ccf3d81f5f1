//! Domain event types.

use serde::{Deserialize, Serialize};

use crate::connections::ConnectionStatus;
use crate::sync::SyncStatus;

/// Domain events emitted by services after successful mutations.
///
/// These are facts about state changes. Runtime adapters translate them into
/// follow-up work (starting a first sync after authorization, refreshing
/// account lists, notifying the UI).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A connection moved through its lifecycle.
    ConnectionStatusChanged {
        connection_id: String,
        old_status: ConnectionStatus,
        new_status: ConnectionStatus,
    },

    /// Accounts were forced to DISCONNECTED because their connection went stale.
    AccountsDisconnected {
        connection_id: String,
        account_ids: Vec<String>,
    },

    /// A sync run for an account finished (SYNCED or ERROR).
    AccountSyncFinished {
        account_id: String,
        status: SyncStatus,
    },

    /// An account was soft-deleted.
    AccountHidden { account_id: String },

    /// A hidden account was made active again.
    AccountRestored { account_id: String },

    /// An account was permanently removed.
    AccountDeleted { account_id: String },
}

impl DomainEvent {
    /// Creates a ConnectionStatusChanged event.
    pub fn connection_status_changed(
        connection_id: impl Into<String>,
        old_status: ConnectionStatus,
        new_status: ConnectionStatus,
    ) -> Self {
        Self::ConnectionStatusChanged {
            connection_id: connection_id.into(),
            old_status,
            new_status,
        }
    }

    /// Creates an AccountsDisconnected event.
    pub fn accounts_disconnected(connection_id: impl Into<String>, account_ids: Vec<String>) -> Self {
        Self::AccountsDisconnected {
            connection_id: connection_id.into(),
            account_ids,
        }
    }

    /// Creates an AccountSyncFinished event.
    pub fn account_sync_finished(account_id: impl Into<String>, status: SyncStatus) -> Self {
        Self::AccountSyncFinished {
            account_id: account_id.into(),
            status,
        }
    }

    pub fn account_hidden(account_id: impl Into<String>) -> Self {
        Self::AccountHidden {
            account_id: account_id.into(),
        }
    }

    pub fn account_restored(account_id: impl Into<String>) -> Self {
        Self::AccountRestored {
            account_id: account_id.into(),
        }
    }

    pub fn account_deleted(account_id: impl Into<String>) -> Self {
        Self::AccountDeleted {
            account_id: account_id.into(),
        }
    }
}
