//! Core error types for the banklink crates.
//!
//! This module defines storage-agnostic error types. Transport and storage
//! adapters convert their own failures into these types at the boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the bank-connection subsystem.
///
/// `RelinkRequired` and `LinkedTransfersExist` are expected, user-actionable
/// outcomes and are kept as distinct variants so callers can branch on them
/// instead of matching on messages.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error(
        "Account {account_id} has {linked_transfer_count} linked transfer(s) and cannot be deleted"
    )]
    LinkedTransfersExist {
        account_id: String,
        linked_transfer_count: usize,
    },

    #[error("{0}")]
    RelinkRequired(RelinkRequired),

    #[error("Connection {connection_id} is not ready (status {status})")]
    ConnectionNotReady {
        connection_id: String,
        status: String,
    },

    #[error("Sync rejected for account {account_id}: {reason}")]
    SyncRejected { account_id: String, reason: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider no longer honours the connection's grant.
    #[error("Provider authorization expired: {0}")]
    AuthorizationExpired(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a not-found database error for an entity
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::Database(DatabaseError::NotFound(format!("{} {}", entity, id)))
    }

    /// Whether the error is something the end user can act on, as opposed to
    /// a programming or infrastructure failure.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Error::LinkedTransfersExist { .. }
                | Error::RelinkRequired(_)
                | Error::ConnectionNotReady { .. }
                | Error::Validation(_)
        )
    }

    /// The message a caller should show, without our own prefixes.
    /// Provider-reported messages pass through verbatim.
    pub fn external_message(&self) -> String {
        match self {
            Error::Api { message, .. } => message.clone(),
            Error::AuthorizationExpired(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Returns the relink details if this error asks for re-authorization.
    pub fn as_relink_required(&self) -> Option<&RelinkRequired> {
        match self {
            Error::RelinkRequired(details) => Some(details),
            _ => None,
        }
    }
}

/// Storage-agnostic error type for repository operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The record changed between read and write.
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    /// Internal/unexpected storage error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Validation errors for domain data.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),
}

/// A state machine was asked to apply an event its current state does not accept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{machine}: event {event} is not allowed from state {from}")]
pub struct TransitionError {
    pub machine: &'static str,
    pub from: String,
    pub event: String,
}

impl TransitionError {
    pub fn new(machine: &'static str, from: impl ToString, event: impl ToString) -> Self {
        Self {
            machine,
            from: from.to_string(),
            event: event.to_string(),
        }
    }
}

/// Details returned when restoring an account needs a fresh connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelinkRequired {
    pub account_id: String,
    pub connection_id: String,
    /// Other accounts on the same connection that re-linking will affect.
    pub sibling_account_count: usize,
    pub provider_name: Option<String>,
    pub suggestion: String,
}

impl std::fmt::Display for RelinkRequired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Account {} requires re-linking connection {}: {}",
            self.account_id, self.connection_id, self.suggestion
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(ValidationError::InvalidInput(err.to_string()))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
