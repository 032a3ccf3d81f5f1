//! Banking services: linking connections and syncing their accounts.

mod connection_lifecycle;
mod link_service;
mod models;
mod sync_service;
mod traits;

pub use link_service::{LinkService, LinkSession};
pub use models::{
    AccountSyncResponse, ConnectionSyncResult, InitiateConnectionRequest,
    InitiateConnectionResponse, SyncRequestOutcome,
};
pub use sync_service::AccountSyncService;
pub use traits::{AccountSyncServiceTrait, BankingApiClient};

#[cfg(test)]
mod test_support;


#[cfg(test)]
mod sync_service_tests;
