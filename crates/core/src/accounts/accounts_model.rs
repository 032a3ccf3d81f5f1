//! Bank account domain models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::connections::BankProvider;
use crate::errors::ValidationError;
use crate::sync::{transition, SyncEvent, SyncStatus};
use crate::{Error, Result};

/// Whether an account is shown or soft-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountVisibility {
    #[default]
    Active,
    Hidden,
}

/// Domain model representing a bank account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub id: String,
    pub name: String,
    /// Owning connection, `None` for manual accounts
    pub connection_id: Option<String>,
    /// Where the account's data comes from (`MANUAL` or a provider)
    pub source: BankProvider,
    pub sync_status: SyncStatus,
    pub balance: Decimal,
    pub available_balance: Option<Decimal>,
    pub currency: String,
    pub is_manual: bool,
    pub visibility: AccountVisibility,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BankAccount {
    /// A manually maintained account with no external connection.
    pub fn manual(
        id: impl Into<String>,
        name: impl Into<String>,
        currency: impl Into<String>,
        balance: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            connection_id: None,
            source: BankProvider::Manual,
            sync_status: SyncStatus::Synced,
            balance,
            available_balance: None,
            currency: currency.into(),
            is_manual: true,
            visibility: AccountVisibility::Active,
            last_synced_at: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An account owned by a provider connection, waiting for its first sync.
    pub fn linked(
        id: impl Into<String>,
        name: impl Into<String>,
        connection_id: impl Into<String>,
        provider: BankProvider,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            connection_id: Some(connection_id.into()),
            source: provider,
            sync_status: SyncStatus::Pending,
            balance: Decimal::ZERO,
            available_balance: None,
            currency: currency.into(),
            is_manual: false,
            visibility: AccountVisibility::Active,
            last_synced_at: None,
            last_sync_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.visibility == AccountVisibility::Hidden
    }

    /// Checks the manual/linked invariants.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Account name cannot be empty".to_string(),
            )));
        }
        if self.is_manual != (self.source == BankProvider::Manual) {
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Account {} source {} does not match is_manual={}",
                self.id, self.source, self.is_manual
            ))));
        }
        if self.is_manual {
            if self.connection_id.is_some() {
                return Err(Error::Validation(ValidationError::InvalidInput(format!(
                    "Manual account {} cannot reference a connection",
                    self.id
                ))));
            }
            if matches!(self.sync_status, SyncStatus::Syncing | SyncStatus::Error) {
                return Err(Error::Validation(ValidationError::InvalidInput(format!(
                    "Manual account {} cannot be {}",
                    self.id, self.sync_status
                ))));
            }
        } else if self.connection_id.is_none() {
            return Err(Error::Validation(ValidationError::MissingField(
                "connectionId".to_string(),
            )));
        }
        Ok(())
    }

    /// Applies a sync event to a linked account. Returns the previous status.
    pub fn apply_sync_event(&mut self, event: SyncEvent) -> Result<SyncStatus> {
        if self.is_manual {
            return Err(Error::SyncRejected {
                account_id: self.id.clone(),
                reason: "manual accounts are not sync-eligible".to_string(),
            });
        }
        let next = transition(self.sync_status, event)?;
        let previous = std::mem::replace(&mut self.sync_status, next);
        self.updated_at = Utc::now();
        Ok(previous)
    }

    /// Records a successful sync. Balance fields are only replaced here; a
    /// failed sync keeps the last known balance.
    pub fn record_sync_success(&mut self, update: &AccountBalanceUpdate) -> Result<()> {
        self.apply_sync_event(SyncEvent::Completed)?;
        self.balance = update.balance;
        self.available_balance = update.available_balance;
        self.last_synced_at = Some(Utc::now());
        self.last_sync_error = None;
        Ok(())
    }

    /// Records a failed sync, keeping the last known balance.
    pub fn record_sync_failure(&mut self, message: impl Into<String>) -> Result<()> {
        self.apply_sync_event(SyncEvent::Failed)?;
        self.last_sync_error = Some(message.into());
        Ok(())
    }
}

/// Fresh balance data returned by a provider sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalanceUpdate {
    pub account_id: String,
    pub balance: Decimal,
    pub available_balance: Option<Decimal>,
}

/// Another account sharing the same connection as the one being restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiblingAccount {
    pub id: String,
    pub name: String,
    pub is_hidden: bool,
}

impl From<&BankAccount> for SiblingAccount {
    fn from(account: &BankAccount) -> Self {
        Self {
            id: account.id.clone(),
            name: account.name.clone(),
            is_hidden: account.is_hidden(),
        }
    }
}
