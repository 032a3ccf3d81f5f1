//! Traits defining the contract for linking and sync operations.

use async_trait::async_trait;

use super::models::{
    AccountSyncResponse, ConnectionSyncResult, InitiateConnectionRequest,
    InitiateConnectionResponse, SyncRequestOutcome,
};
use banklink_core::errors::Result;

/// Trait for the banking backend that talks to providers.
///
/// Implementations report an expired or revoked provider grant as
/// `Error::AuthorizationExpired` and every other failure with the
/// provider's message unchanged.
#[async_trait]
pub trait BankingApiClient: Send + Sync {
    /// Creates a connection with the provider and returns its consent URL.
    async fn initiate_connection(
        &self,
        request: &InitiateConnectionRequest,
    ) -> Result<InitiateConnectionResponse>;

    /// Refreshes one account from its provider.
    async fn sync_account(&self, account_id: &str) -> Result<AccountSyncResponse>;

    /// Revokes the provider grant behind a connection.
    async fn revoke_connection(&self, connection_id: &str) -> Result<()>;
}

/// Trait for the account sync service operations
#[async_trait]
pub trait AccountSyncServiceTrait: Send + Sync {
    /// Syncs one account. Duplicate requests while a sync is running return
    /// `AlreadyInFlight`.
    async fn request_sync(&self, account_id: &str) -> Result<SyncRequestOutcome>;

    /// Syncs every visible account owned by a connection.
    async fn sync_connection(&self, connection_id: &str) -> Result<ConnectionSyncResult>;
}
