//! Bank connection domain models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// External aggregator that holds the authorization grant for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankProvider {
    Manual,
    #[serde(rename = "SALTEDGE")]
    SaltEdge,
    Tink,
    Yapily,
    #[serde(rename = "TRUELAYER")]
    TrueLayer,
}

impl BankProvider {
    pub const LINKABLE: [BankProvider; 4] = [
        BankProvider::SaltEdge,
        BankProvider::Tink,
        BankProvider::Yapily,
        BankProvider::TrueLayer,
    ];

    /// Human-readable provider name.
    pub fn display_name(&self) -> &'static str {
        match self {
            BankProvider::Manual => "Manual",
            BankProvider::SaltEdge => "Salt Edge",
            BankProvider::Tink => "Tink",
            BankProvider::Yapily => "Yapily",
            BankProvider::TrueLayer => "TrueLayer",
        }
    }

    /// Wire/config key, e.g. `SALTEDGE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            BankProvider::Manual => "MANUAL",
            BankProvider::SaltEdge => "SALTEDGE",
            BankProvider::Tink => "TINK",
            BankProvider::Yapily => "YAPILY",
            BankProvider::TrueLayer => "TRUELAYER",
        }
    }

    /// Manual accounts have no external grant and are never linked.
    pub fn is_linkable(&self) -> bool {
        !matches!(self, BankProvider::Manual)
    }
}

impl std::fmt::Display for BankProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BankProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MANUAL" => Ok(BankProvider::Manual),
            "SALTEDGE" => Ok(BankProvider::SaltEdge),
            "TINK" => Ok(BankProvider::Tink),
            "YAPILY" => Ok(BankProvider::Yapily),
            "TRUELAYER" => Ok(BankProvider::TrueLayer),
            other => Err(format!("Unknown bank provider: {}", other)),
        }
    }
}

/// Lifecycle status of a bank connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// Link requested, redirect URL not yet used
    #[default]
    Pending,
    /// Authorization popup is open
    InProgress,
    /// Grant is valid; owned accounts may sync
    Authorized,
    /// User disconnected the connection
    Revoked,
    /// Provider token lifetime elapsed
    Expired,
    /// OAuth error or the popup was abandoned
    Failed,
}

impl ConnectionStatus {
    pub const ALL: [ConnectionStatus; 6] = [
        ConnectionStatus::Pending,
        ConnectionStatus::InProgress,
        ConnectionStatus::Authorized,
        ConnectionStatus::Revoked,
        ConnectionStatus::Expired,
        ConnectionStatus::Failed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "Pending",
            ConnectionStatus::InProgress => "Connecting",
            ConnectionStatus::Authorized => "Connected",
            ConnectionStatus::Revoked => "Disconnected",
            ConnectionStatus::Expired => "Expired",
            ConnectionStatus::Failed => "Failed",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "PENDING",
            ConnectionStatus::InProgress => "IN_PROGRESS",
            ConnectionStatus::Authorized => "AUTHORIZED",
            ConnectionStatus::Revoked => "REVOKED",
            ConnectionStatus::Expired => "EXPIRED",
            ConnectionStatus::Failed => "FAILED",
        }
    }

    /// No event leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Revoked | ConnectionStatus::Expired | ConnectionStatus::Failed
        )
    }

    /// The grant is gone and only a brand-new connection can recover access.
    pub fn is_stale(&self) -> bool {
        matches!(self, ConnectionStatus::Revoked | ConnectionStatus::Expired)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization grant linking the application to a user's bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankConnection {
    pub id: String,
    pub provider: BankProvider,
    pub status: ConnectionStatus,
    pub authorized_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankConnection {
    /// A freshly initiated connection in `PENDING`.
    pub fn new(id: impl Into<String>, provider: BankProvider) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            provider,
            status: ConnectionStatus::Pending,
            authorized_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stamp authorization time and, when the provider told us the grant
    /// lifetime, the expiry.
    pub fn mark_authorized(&mut self, at: DateTime<Utc>, expires_in_secs: Option<i64>) {
        self.authorized_at = Some(at);
        self.expires_at = expires_in_secs
            .filter(|secs| *secs > 0)
            .map(|secs| at + Duration::seconds(secs));
    }

    /// True when the recorded expiry is in the past. Expiry is only acted on
    /// when a sync fails; this is informational.
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}
