//! Banklink Connect - provider linking and account sync.
//!
//! This crate runs the OAuth popup handshake that authorizes a bank
//! connection, talks to the banking backend, and drives the connection and
//! account sync state machines from `banklink-core` in response.

pub mod banking;
pub mod client;
pub mod config;
pub mod oauth;

// Re-export commonly used types
pub use banking::{
    AccountSyncService, AccountSyncServiceTrait, BankingApiClient, ConnectionSyncResult,
    InitiateConnectionResponse, LinkService, LinkSession, SyncRequestOutcome,
};
pub use client::BankingHttpClient;
pub use config::{ConnectConfig, PopupConfig};
pub use oauth::{
    OAuthPopupCoordinator, OriginPolicy, PopupErrorCode, PopupHandle, PopupHost, PopupOutcome,
    PopupRequest, PopupSession, PopupWindow,
};
