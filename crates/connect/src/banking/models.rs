//! Banking API payloads and service results.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use banklink_core::accounts::{AccountBalanceUpdate, BankAccount};
use banklink_core::connections::BankProvider;

/// Request body for starting a provider link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateConnectionRequest {
    pub provider: BankProvider,
    /// Where the provider sends the user back after consent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_origin: Option<String>,
}

/// Response from the initiation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateConnectionResponse {
    pub connection_id: String,
    pub redirect_url: String,
    /// Lifetime of the resulting grant in seconds, if the provider reports one.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Fresh account data returned by the sync call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSyncResponse {
    pub account_id: String,
    pub balance: Decimal,
    #[serde(default)]
    pub available_balance: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl From<AccountSyncResponse> for AccountBalanceUpdate {
    fn from(response: AccountSyncResponse) -> Self {
        Self {
            account_id: response.account_id,
            balance: response.balance,
            available_balance: response.available_balance,
        }
    }
}

/// Result of a single sync request.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRequestOutcome {
    /// The account is now `SYNCED` with fresh balances.
    Completed(BankAccount),
    /// The account is now `ERROR`; balances are the last known ones.
    Failed { account: BankAccount, error: String },
    /// A sync for this account was already running; nothing was done.
    AlreadyInFlight,
    /// The provider reported the grant expired. The connection is `EXPIRED`
    /// and the account is `DISCONNECTED`.
    Disconnected(BankAccount),
}

impl SyncRequestOutcome {
    pub fn account(&self) -> Option<&BankAccount> {
        match self {
            SyncRequestOutcome::Completed(account)
            | SyncRequestOutcome::Disconnected(account)
            | SyncRequestOutcome::Failed { account, .. } => Some(account),
            SyncRequestOutcome::AlreadyInFlight => None,
        }
    }
}

/// Summary of syncing every account owned by a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSyncResult {
    pub connection_id: String,
    pub synced: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Set when the sync discovered the grant had expired.
    pub disconnected: bool,
    pub errors: Vec<String>,
}
