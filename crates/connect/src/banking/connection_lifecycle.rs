//! Persisted state changes shared by the link and sync services.

use log::info;

use banklink_core::accounts::{BankAccount, BankAccountRepositoryTrait};
use banklink_core::connections::{BankConnection, BankConnectionRepositoryTrait, ConnectionEvent};
use banklink_core::errors::Result;
use banklink_core::events::{DomainEvent, DomainEventSink};
use banklink_core::sync::{SyncEvent, SyncStatus};

/// Applies `event` to `connection`, stores it and emits the status change.
pub(crate) async fn advance_connection(
    connections: &dyn BankConnectionRepositoryTrait,
    event_sink: &dyn DomainEventSink,
    mut connection: BankConnection,
    event: ConnectionEvent,
) -> Result<BankConnection> {
    let previous = connection.apply(event)?;
    let connection = connections.update(connection).await?;
    info!(
        "[Banking] Connection {} {} -> {}",
        connection.id, previous, connection.status
    );
    event_sink.emit(DomainEvent::connection_status_changed(
        connection.id.clone(),
        previous,
        connection.status,
    ));
    Ok(connection)
}

/// Forces every account owned by `connection_id` to `DISCONNECTED`,
/// whatever its current sync state. Returns all owned accounts.
pub(crate) async fn disconnect_accounts(
    accounts: &dyn BankAccountRepositoryTrait,
    event_sink: &dyn DomainEventSink,
    connection_id: &str,
) -> Result<Vec<BankAccount>> {
    let owned = accounts.list_by_connection(connection_id)?;
    let mut result = Vec::with_capacity(owned.len());
    let mut changed = Vec::new();

    for mut account in owned {
        if !account.is_manual && account.sync_status != SyncStatus::Disconnected {
            account.apply_sync_event(SyncEvent::ConnectionLost)?;
            account = accounts.update(account).await?;
            changed.push(account.id.clone());
        }
        result.push(account);
    }

    if !changed.is_empty() {
        info!(
            "[Banking] Disconnected {} account(s) of connection {}",
            changed.len(),
            connection_id
        );
        event_sink.emit(DomainEvent::accounts_disconnected(connection_id, changed));
    }
    Ok(result)
}
