//! Deletion and restore eligibility models.
//!
//! These are computed per request and never persisted.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::accounts_model::SiblingAccount;
use crate::connections::ConnectionStatus;

/// Which leg of a transfer the checked account holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferRole {
    Source,
    Destination,
}

/// A transfer that ties the checked account to another account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedTransfer {
    pub transaction_id: String,
    pub transfer_group_id: String,
    pub transfer_role: TransferRole,
    pub linked_account_id: String,
    pub linked_account_name: Option<String>,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: Option<String>,
}

/// Whether an account may be permanently deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionEligibility {
    pub account_id: String,
    pub can_delete: bool,
    /// Hiding is reversible and always allowed.
    pub can_hide: bool,
    pub blockers: Vec<LinkedTransfer>,
    pub linked_transfer_count: usize,
}

impl DeletionEligibility {
    pub fn from_blockers(account_id: impl Into<String>, blockers: Vec<LinkedTransfer>) -> Self {
        let linked_transfer_count = blockers.len();
        Self {
            account_id: account_id.into(),
            can_delete: linked_transfer_count == 0,
            can_hide: true,
            blockers,
            linked_transfer_count,
        }
    }
}

/// Whether a hidden account may be restored, and what re-linking would touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreEligibility {
    pub account_id: String,
    pub can_restore: bool,
    pub requires_relink: bool,
    pub sibling_accounts: Vec<SiblingAccount>,
    /// Sibling count plus the account itself; 0 when no relink is required
    pub total_connection_accounts: usize,
    pub provider_name: Option<String>,
    /// Owning connection, `None` for manual accounts
    pub connection_id: Option<String>,
    pub connection_status: Option<ConnectionStatus>,
}

impl RestoreEligibility {
    /// Manual accounts have no connection to go stale.
    pub fn manual(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            can_restore: true,
            requires_relink: false,
            sibling_accounts: Vec::new(),
            total_connection_accounts: 0,
            provider_name: None,
            connection_id: None,
            connection_status: None,
        }
    }
}
