//! Service for refreshing linked accounts from their providers.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use super::connection_lifecycle::{advance_connection, disconnect_accounts};
use super::models::{ConnectionSyncResult, SyncRequestOutcome};
use super::traits::{AccountSyncServiceTrait, BankingApiClient};
use banklink_core::accounts::{AccountBalanceUpdate, BankAccount, BankAccountRepositoryTrait};
use banklink_core::connections::{
    BankConnectionRepositoryTrait, ConnectionEvent, ConnectionStatus,
};
use banklink_core::errors::{Error, Result};
use banklink_core::events::{DomainEvent, DomainEventSink, NoOpDomainEventSink};
use banklink_core::sync::{plan_sync_request, SyncEvent, SyncStart, SyncStatus};

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Marks an account as syncing in this process until dropped.
struct InFlightGuard {
    in_flight: InFlight,
    account_id: String,
}

impl InFlightGuard {
    fn acquire(in_flight: &InFlight, account_id: &str) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account_id.to_string());
        inserted.then(|| Self {
            in_flight: in_flight.clone(),
            account_id: account_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.account_id);
    }
}

const INTERRUPTED_MESSAGE: &str = "Sync was interrupted before it finished";

/// Owns an account's in-flight slot while its stored status is `SYNCING`.
///
/// A lease that is dropped without [`SyncLease::release`] (the request
/// future was cancelled) moves the account to `ERROR` on a background task
/// and only then frees the slot, so no new sync can race the cleanup.
struct SyncLease {
    guard: Option<InFlightGuard>,
    accounts: Arc<dyn BankAccountRepositoryTrait>,
    event_sink: Arc<dyn DomainEventSink>,
}

impl SyncLease {
    fn new(
        guard: InFlightGuard,
        accounts: Arc<dyn BankAccountRepositoryTrait>,
        event_sink: Arc<dyn DomainEventSink>,
    ) -> Self {
        Self {
            guard: Some(guard),
            accounts,
            event_sink,
        }
    }

    /// The sync reached a final status; frees the slot.
    fn release(mut self) {
        self.guard.take();
    }

    /// The sync ended with an error before recording a final status.
    async fn abandon(mut self, reason: &str) {
        if let Some(guard) = self.guard.take() {
            reset_interrupted_sync(
                self.accounts.as_ref(),
                self.event_sink.as_ref(),
                &guard.account_id,
                reason,
            )
            .await;
        }
    }
}

impl Drop for SyncLease {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // The next request restarts the stale SYNCING status.
            return;
        };
        let accounts = self.accounts.clone();
        let event_sink = self.event_sink.clone();
        runtime.spawn(async move {
            reset_interrupted_sync(
                accounts.as_ref(),
                event_sink.as_ref(),
                &guard.account_id,
                INTERRUPTED_MESSAGE,
            )
            .await;
            drop(guard);
        });
    }
}

/// Moves an account still stored as `SYNCING` to `ERROR`.
async fn reset_interrupted_sync(
    accounts: &dyn BankAccountRepositoryTrait,
    event_sink: &dyn DomainEventSink,
    account_id: &str,
    reason: &str,
) {
    let reset = async {
        let mut account = accounts.get_by_id(account_id)?;
        if account.sync_status != SyncStatus::Syncing {
            return Ok(false);
        }
        account.record_sync_failure(reason)?;
        accounts.update(account).await?;
        Ok::<_, Error>(true)
    };
    match reset.await {
        Ok(true) => {
            warn!(
                "[Banking] Sync for account {} did not finish: {}",
                account_id, reason
            );
            event_sink.emit(DomainEvent::account_sync_finished(
                account_id,
                SyncStatus::Error,
            ));
        }
        Ok(false) => {}
        Err(err) => warn!(
            "[Banking] Could not reset interrupted sync for account {}: {}",
            account_id, err
        ),
    }
}

/// Service for syncing linked accounts.
///
/// At most one sync per account runs at a time in this process; overlapping
/// requests for the same account are absorbed. A stored `SYNCING` status with
/// no sync running is treated as interrupted and restarted. A provider report of an expired grant expires
/// the connection and disconnects every account it owns.
pub struct AccountSyncService {
    api: Arc<dyn BankingApiClient>,
    accounts: Arc<dyn BankAccountRepositoryTrait>,
    connections: Arc<dyn BankConnectionRepositoryTrait>,
    event_sink: Arc<dyn DomainEventSink>,
    in_flight: InFlight,
}

impl AccountSyncService {
    pub fn new(
        api: Arc<dyn BankingApiClient>,
        accounts: Arc<dyn BankAccountRepositoryTrait>,
        connections: Arc<dyn BankConnectionRepositoryTrait>,
    ) -> Self {
        Self {
            api,
            accounts,
            connections,
            event_sink: Arc::new(NoOpDomainEventSink),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Sets the domain event sink for emitting events during sync.
    pub fn with_event_sink(mut self, event_sink: Arc<dyn DomainEventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    /// Whether a sync for `account_id` is running in this process.
    pub fn is_in_flight(&self, account_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(account_id)
    }

    async fn run_sync(&self, account: BankAccount) -> Result<SyncRequestOutcome> {
        let account_id = account.id.clone();
        let connection_id = account.connection_id.clone().unwrap_or_default();

        match self.api.sync_account(&account_id).await {
            Ok(response) => {
                if response.account_id != account_id {
                    warn!(
                        "[Banking] Sync for {} answered for account {}",
                        account_id, response.account_id
                    );
                }
                let mut fresh = self.accounts.get_by_id(&account_id)?;
                if fresh.sync_status == SyncStatus::Disconnected {
                    debug!(
                        "[Banking] Account {} was disconnected during sync, dropping result",
                        account_id
                    );
                    return Ok(SyncRequestOutcome::Disconnected(fresh));
                }
                let update = AccountBalanceUpdate {
                    account_id: account_id.clone(),
                    ..AccountBalanceUpdate::from(response)
                };
                fresh.record_sync_success(&update)?;
                let account = self.accounts.update(fresh).await?;
                info!("[Banking] Account {} synced", account_id);
                self.event_sink.emit(DomainEvent::account_sync_finished(
                    account_id,
                    SyncStatus::Synced,
                ));
                Ok(SyncRequestOutcome::Completed(account))
            }
            Err(Error::AuthorizationExpired(message)) => {
                warn!(
                    "[Banking] Connection {} authorization expired while syncing {}: {}",
                    connection_id, account_id, message
                );
                self.expire_connection(&connection_id).await?;
                let account = self.accounts.get_by_id(&account_id)?;
                Ok(SyncRequestOutcome::Disconnected(account))
            }
            Err(err) => {
                let message = err.external_message();
                warn!("[Banking] Sync failed for account {}: {}", account_id, message);
                let mut fresh = self.accounts.get_by_id(&account_id)?;
                if fresh.sync_status == SyncStatus::Disconnected {
                    return Ok(SyncRequestOutcome::Disconnected(fresh));
                }
                fresh.record_sync_failure(message.clone())?;
                let account = self.accounts.update(fresh).await?;
                self.event_sink.emit(DomainEvent::account_sync_finished(
                    account_id,
                    SyncStatus::Error,
                ));
                Ok(SyncRequestOutcome::Failed {
                    account,
                    error: message,
                })
            }
        }
    }

    /// Moves the connection to `EXPIRED` (if still authorized) and
    /// disconnects its accounts.
    async fn expire_connection(&self, connection_id: &str) -> Result<()> {
        let connection = self.connections.get_by_id(connection_id)?;
        if connection.status == ConnectionStatus::Authorized {
            advance_connection(
                self.connections.as_ref(),
                self.event_sink.as_ref(),
                connection,
                ConnectionEvent::Expire,
            )
            .await?;
        }
        disconnect_accounts(
            self.accounts.as_ref(),
            self.event_sink.as_ref(),
            connection_id,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AccountSyncServiceTrait for AccountSyncService {
    async fn request_sync(&self, account_id: &str) -> Result<SyncRequestOutcome> {
        let mut account = self.accounts.get_by_id(account_id)?;
        let Some(connection_id) = account.connection_id.clone() else {
            return Err(Error::SyncRejected {
                account_id: account_id.to_string(),
                reason: "manual accounts are not sync-eligible".to_string(),
            });
        };

        let Some(guard) = InFlightGuard::acquire(&self.in_flight, account_id) else {
            debug!("[Banking] Sync already in flight for account {}", account_id);
            return Ok(SyncRequestOutcome::AlreadyInFlight);
        };

        let connection = self.connections.get_by_id(&connection_id)?;
        if plan_sync_request(&account, &connection)? == SyncStart::AlreadySyncing {
            // Nothing holds the slot, so the stored SYNCING is left over from
            // a sync that never finished.
            info!(
                "[Banking] Restarting sync for account {} left in SYNCING",
                account_id
            );
        }

        account.apply_sync_event(SyncEvent::Requested)?;
        let lease = SyncLease::new(guard, self.accounts.clone(), self.event_sink.clone());
        let account = match self.accounts.update(account).await {
            Ok(account) => account,
            Err(err) => {
                lease.abandon(&err.external_message()).await;
                return Err(err);
            }
        };
        debug!("[Banking] Syncing account {}", account_id);

        match self.run_sync(account).await {
            Ok(outcome) => {
                lease.release();
                Ok(outcome)
            }
            Err(err) => {
                lease.abandon(&err.external_message()).await;
                Err(err)
            }
        }
    }

    async fn sync_connection(&self, connection_id: &str) -> Result<ConnectionSyncResult> {
        let connection = self.connections.get_by_id(connection_id)?;
        if connection.status != ConnectionStatus::Authorized {
            return Err(Error::ConnectionNotReady {
                connection_id: connection_id.to_string(),
                status: connection.status.to_string(),
            });
        }

        let mut result = ConnectionSyncResult {
            connection_id: connection_id.to_string(),
            ..ConnectionSyncResult::default()
        };

        for account in self.accounts.list_by_connection(connection_id)? {
            if account.is_hidden() {
                result.skipped += 1;
                continue;
            }
            match self.request_sync(&account.id).await {
                Ok(SyncRequestOutcome::Completed(_)) => result.synced += 1,
                Ok(SyncRequestOutcome::AlreadyInFlight) => result.skipped += 1,
                Ok(SyncRequestOutcome::Failed { error, .. }) => {
                    result.failed += 1;
                    result.errors.push(format!("{}: {}", account.id, error));
                }
                Ok(SyncRequestOutcome::Disconnected(_)) => {
                    // Every remaining account is disconnected along with this one.
                    result.disconnected = true;
                    break;
                }
                Err(err) => {
                    result.failed += 1;
                    result.errors.push(format!("{}: {}", account.id, err));
                }
            }
        }

        info!(
            "[Banking] Connection {} sync: {} synced, {} failed, {} skipped{}",
            connection_id,
            result.synced,
            result.failed,
            result.skipped,
            if result.disconnected { ", disconnected" } else { "" }
        );
        Ok(result)
    }
}
