//! Unit tests for the account sync service.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};

use super::test_support::{balance, MockAccountRepository, MockBankingApi, MockConnectionRepository};
use super::{AccountSyncService, AccountSyncServiceTrait, SyncRequestOutcome};
use banklink_core::accounts::{AccountVisibility, BankAccount};
use banklink_core::connections::{BankConnection, BankProvider, ConnectionEvent, ConnectionStatus};
use banklink_core::errors::Error;
use banklink_core::events::{DomainEvent, MockDomainEventSink};
use banklink_core::sync::SyncStatus;

fn authorized_connection(id: &str) -> BankConnection {
    let mut connection = BankConnection::new(id, BankProvider::Tink);
    connection.apply(ConnectionEvent::PopupOpened).unwrap();
    connection.apply(ConnectionEvent::Authorize).unwrap();
    connection
}

fn linked(id: &str, connection_id: &str) -> BankAccount {
    BankAccount::linked(id, format!("Account {}", id), connection_id, BankProvider::Tink, "EUR")
}

struct Harness {
    api: Arc<MockBankingApi>,
    accounts: Arc<MockAccountRepository>,
    connections: Arc<MockConnectionRepository>,
    events: MockDomainEventSink,
    service: AccountSyncService,
}

impl Harness {
    fn new(api: MockBankingApi, accounts: Vec<BankAccount>, connections: Vec<BankConnection>) -> Self {
        let api = Arc::new(api);
        let accounts = Arc::new(MockAccountRepository::new(accounts));
        let connections = Arc::new(MockConnectionRepository::new(connections));
        let events = MockDomainEventSink::new();
        let service = AccountSyncService::new(api.clone(), accounts.clone(), connections.clone())
            .with_event_sink(Arc::new(events.clone()));
        Self {
            api,
            accounts,
            connections,
            events,
            service,
        }
    }

    fn standard() -> Self {
        Self::new(
            MockBankingApi::new(),
            vec![linked("acc-1", "conn-1")],
            vec![authorized_connection("conn-1")],
        )
    }
}

// ============================================================================
// request_sync
// ============================================================================

#[tokio::test]
async fn test_sync_completes_and_records_balance() {
    let h = Harness::standard();
    h.api.script_sync(Ok(balance("acc-1", dec!(1234.56))));

    let outcome = h.service.request_sync("acc-1").await.unwrap();

    let SyncRequestOutcome::Completed(account) = outcome else {
        panic!("expected Completed, got {:?}", outcome);
    };
    assert_eq!(account.sync_status, SyncStatus::Synced);
    assert_eq!(account.balance, dec!(1234.56));
    assert!(account.last_synced_at.is_some());
    assert_eq!(h.accounts.stored("acc-1").sync_status, SyncStatus::Synced);
    assert_eq!(
        h.events.events(),
        vec![DomainEvent::account_sync_finished("acc-1", SyncStatus::Synced)]
    );
    assert!(!h.service.is_in_flight("acc-1"));
}

#[tokio::test]
async fn test_concurrent_requests_sync_once() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(
        MockBankingApi::gated(gate.clone()),
        vec![linked("acc-1", "conn-1")],
        vec![authorized_connection("conn-1")],
    );

    let (first, second, _) = tokio::join!(
        h.service.request_sync("acc-1"),
        h.service.request_sync("acc-1"),
        async {
            tokio::task::yield_now().await;
            gate.notify_one();
        }
    );

    assert!(matches!(first.unwrap(), SyncRequestOutcome::Completed(_)));
    assert_eq!(second.unwrap(), SyncRequestOutcome::AlreadyInFlight);
    assert_eq!(h.api.sync_calls(), 1);
    assert_eq!(h.events.len(), 1);
    assert!(!h.service.is_in_flight("acc-1"));
}

#[tokio::test]
async fn test_stale_syncing_status_is_restarted() {
    let mut account = linked("acc-1", "conn-1");
    account.sync_status = SyncStatus::Syncing;
    let h = Harness::new(
        MockBankingApi::new(),
        vec![account],
        vec![authorized_connection("conn-1")],
    );

    let outcome = h.service.request_sync("acc-1").await.unwrap();

    assert!(matches!(outcome, SyncRequestOutcome::Completed(_)), "{:?}", outcome);
    assert_eq!(h.api.sync_calls(), 1);
    assert_eq!(h.accounts.stored("acc-1").sync_status, SyncStatus::Synced);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_request_does_not_leave_account_syncing() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(
        MockBankingApi::gated(gate.clone()),
        vec![linked("acc-1", "conn-1")],
        vec![authorized_connection("conn-1")],
    );

    let timed_out = timeout(Duration::from_millis(20), h.service.request_sync("acc-1")).await;
    assert!(timed_out.is_err());

    // Cleanup runs on a spawned task.
    sleep(Duration::from_millis(1)).await;
    let stored = h.accounts.stored("acc-1");
    assert_eq!(stored.sync_status, SyncStatus::Error);
    assert!(stored.last_sync_error.is_some());
    assert!(!h.service.is_in_flight("acc-1"));
    assert_eq!(
        h.events.events(),
        vec![DomainEvent::account_sync_finished("acc-1", SyncStatus::Error)]
    );

    gate.notify_one();
    let retry = h.service.request_sync("acc-1").await.unwrap();
    assert!(matches!(retry, SyncRequestOutcome::Completed(_)), "{:?}", retry);
    assert_eq!(h.api.sync_calls(), 2);
}

#[tokio::test]
async fn test_storage_error_mid_sync_moves_account_to_error() {
    let h = Harness::standard();
    h.api
        .script_sync(Err(Error::AuthorizationExpired("consent expired".to_string())));
    h.connections.fail_next_update();

    let err = h.service.request_sync("acc-1").await.unwrap_err();

    assert!(matches!(err, Error::Database(_)), "{:?}", err);
    let stored = h.accounts.stored("acc-1");
    assert_eq!(stored.sync_status, SyncStatus::Error);
    assert_eq!(
        stored.last_sync_error.as_deref(),
        Some(err.external_message().as_str())
    );
    assert!(!h.service.is_in_flight("acc-1"));
}

#[tokio::test]
async fn test_failure_keeps_last_known_balance() {
    let mut account = linked("acc-1", "conn-1");
    account.sync_status = SyncStatus::Synced;
    account.balance = dec!(250);
    let h = Harness::new(
        MockBankingApi::new(),
        vec![account],
        vec![authorized_connection("conn-1")],
    );
    h.api
        .script_sync(Err(Error::api(503, "Bank is under maintenance")));

    let outcome = h.service.request_sync("acc-1").await.unwrap();

    let SyncRequestOutcome::Failed { account, error } = outcome else {
        panic!("expected Failed, got {:?}", outcome);
    };
    assert_eq!(error, "Bank is under maintenance");
    assert_eq!(account.sync_status, SyncStatus::Error);
    assert_eq!(account.balance, dec!(250));
    assert_eq!(
        account.last_sync_error.as_deref(),
        Some("Bank is under maintenance")
    );

    // An account in ERROR can be retried.
    let retry = h.service.request_sync("acc-1").await.unwrap();
    assert!(matches!(retry, SyncRequestOutcome::Completed(_)));
}

#[tokio::test]
async fn test_expired_grant_disconnects_every_owned_account() {
    let mut mid_sync = linked("acc-2", "conn-1");
    mid_sync.sync_status = SyncStatus::Syncing;
    let mut errored = linked("acc-3", "conn-1");
    errored.sync_status = SyncStatus::Error;
    let other = linked("acc-9", "conn-2");
    let h = Harness::new(
        MockBankingApi::new(),
        vec![linked("acc-1", "conn-1"), mid_sync, errored, other],
        vec![authorized_connection("conn-1"), authorized_connection("conn-2")],
    );
    h.api
        .script_sync(Err(Error::AuthorizationExpired("consent expired".to_string())));

    let outcome = h.service.request_sync("acc-1").await.unwrap();

    let SyncRequestOutcome::Disconnected(account) = outcome else {
        panic!("expected Disconnected, got {:?}", outcome);
    };
    assert_eq!(account.sync_status, SyncStatus::Disconnected);
    assert_eq!(h.connections.stored("conn-1").status, ConnectionStatus::Expired);
    for id in ["acc-1", "acc-2", "acc-3"] {
        assert_eq!(h.accounts.stored(id).sync_status, SyncStatus::Disconnected, "{}", id);
    }
    assert_eq!(h.accounts.stored("acc-9").sync_status, SyncStatus::Pending);
    assert_eq!(h.connections.stored("conn-2").status, ConnectionStatus::Authorized);

    let events = h.events.events();
    assert!(events.contains(&DomainEvent::connection_status_changed(
        "conn-1",
        ConnectionStatus::Authorized,
        ConnectionStatus::Expired,
    )));
    assert!(events.contains(&DomainEvent::accounts_disconnected(
        "conn-1",
        vec!["acc-1".to_string(), "acc-2".to_string(), "acc-3".to_string()],
    )));
}

#[tokio::test]
async fn test_disconnected_account_rejects_sync() {
    let h = Harness::new(
        MockBankingApi::new(),
        vec![linked("acc-1", "conn-1")],
        vec![{
            let mut connection = authorized_connection("conn-1");
            connection.apply(ConnectionEvent::Revoke).unwrap();
            connection
        }],
    );

    let err = h.service.request_sync("acc-1").await.unwrap_err();

    assert!(matches!(err, Error::InvalidTransition(_)), "{:?}", err);
    assert_eq!(h.api.sync_calls(), 0);
    assert!(!h.service.is_in_flight("acc-1"));
}

#[tokio::test]
async fn test_manual_account_is_rejected() {
    let h = Harness::new(
        MockBankingApi::new(),
        vec![BankAccount::manual("cash", "Cash", "EUR", dec!(40))],
        vec![],
    );

    let err = h.service.request_sync("cash").await.unwrap_err();

    assert!(matches!(err, Error::SyncRejected { .. }), "{:?}", err);
    assert_eq!(h.api.sync_calls(), 0);
}

#[tokio::test]
async fn test_unauthorized_connection_is_not_ready() {
    let mut connection = BankConnection::new("conn-1", BankProvider::Tink);
    connection.apply(ConnectionEvent::PopupOpened).unwrap();
    let h = Harness::new(
        MockBankingApi::new(),
        vec![linked("acc-1", "conn-1")],
        vec![connection],
    );

    let err = h.service.request_sync("acc-1").await.unwrap_err();

    assert!(matches!(err, Error::ConnectionNotReady { .. }), "{:?}", err);
    assert!(err.is_user_actionable());
}

// ============================================================================
// sync_connection
// ============================================================================

#[tokio::test]
async fn test_sync_connection_summarizes_accounts() {
    let mut hidden = linked("acc-3", "conn-1");
    hidden.visibility = AccountVisibility::Hidden;
    let h = Harness::new(
        MockBankingApi::new(),
        vec![linked("acc-1", "conn-1"), linked("acc-2", "conn-1"), hidden],
        vec![authorized_connection("conn-1")],
    );
    h.api.script_sync(Ok(balance("acc-1", dec!(10))));
    h.api.script_sync(Err(Error::api(500, "Upstream timeout")));

    let result = h.service.sync_connection("conn-1").await.unwrap();

    assert_eq!(result.synced, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.skipped, 1);
    assert!(!result.disconnected);
    assert_eq!(result.errors, vec!["acc-2: Upstream timeout".to_string()]);
    assert_eq!(h.accounts.stored("acc-3").sync_status, SyncStatus::Pending);
}

#[tokio::test]
async fn test_sync_connection_stops_when_grant_expired() {
    let h = Harness::new(
        MockBankingApi::new(),
        vec![linked("acc-1", "conn-1"), linked("acc-2", "conn-1")],
        vec![authorized_connection("conn-1")],
    );
    h.api
        .script_sync(Err(Error::AuthorizationExpired("token expired".to_string())));

    let result = h.service.sync_connection("conn-1").await.unwrap();

    assert!(result.disconnected);
    assert_eq!(result.synced, 0);
    assert_eq!(h.api.sync_calls(), 1);
    assert_eq!(h.accounts.stored("acc-2").sync_status, SyncStatus::Disconnected);
}

#[tokio::test]
async fn test_sync_connection_requires_authorized_connection() {
    let h = Harness::new(
        MockBankingApi::new(),
        vec![linked("acc-1", "conn-1")],
        vec![BankConnection::new("conn-1", BankProvider::Tink)],
    );

    let err = h.service.sync_connection("conn-1").await.unwrap_err();

    assert!(matches!(err, Error::ConnectionNotReady { .. }));
    assert_eq!(h.api.sync_calls(), 0);
}
