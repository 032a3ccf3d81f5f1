//! Account repository and lifecycle service traits.
//!
//! These traits define the contract for account operations without any
//! storage-specific types, allowing for different storage implementations.

use async_trait::async_trait;

use super::accounts_model::BankAccount;
use super::lifecycle_model::{DeletionEligibility, RestoreEligibility};
use crate::errors::Result;

/// Trait defining the contract for BankAccount repository operations.
#[async_trait]
pub trait BankAccountRepositoryTrait: Send + Sync {
    /// Retrieves an account by its ID.
    fn get_by_id(&self, account_id: &str) -> Result<BankAccount>;

    /// Lists every account owned by a connection, hidden ones included.
    fn list_by_connection(&self, connection_id: &str) -> Result<Vec<BankAccount>>;

    /// Replaces the stored account with `account`.
    async fn update(&self, account: BankAccount) -> Result<BankAccount>;

    /// Permanently deletes an account by its ID.
    ///
    /// Returns the number of deleted records.
    async fn delete(&self, account_id: &str) -> Result<usize>;
}

/// Trait defining the account lifecycle operations exposed to callers.
///
/// The `check_*` methods are point-in-time reads. The imperative methods
/// re-validate against a fresh read before acting.
#[async_trait]
pub trait AccountLifecycleServiceTrait: Send + Sync {
    /// Computes whether the account can be permanently deleted.
    fn check_deletion_eligibility(&self, account_id: &str) -> Result<DeletionEligibility>;

    /// Computes whether a hidden account can be restored.
    fn check_restore_eligibility(&self, account_id: &str) -> Result<RestoreEligibility>;

    /// Soft-deletes the account. Always allowed.
    async fn hide_account(&self, account_id: &str) -> Result<BankAccount>;

    /// Permanently deletes the account, failing with `LinkedTransfersExist`
    /// when transfers tie it to other accounts.
    async fn delete_account(&self, account_id: &str) -> Result<()>;

    /// Restores a hidden account, failing with `RelinkRequired` when its
    /// connection was revoked or expired.
    async fn restore_account(&self, account_id: &str) -> Result<BankAccount>;
}
