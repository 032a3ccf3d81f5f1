use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use super::accounts_model::{AccountVisibility, BankAccount, SiblingAccount};
use super::accounts_traits::{AccountLifecycleServiceTrait, BankAccountRepositoryTrait};
use super::lifecycle_model::{
    DeletionEligibility, LinkedTransfer, RestoreEligibility, TransferRole,
};
use crate::connections::{BankConnectionRepositoryTrait, ConnectionStatus};
use crate::errors::{Error, RelinkRequired, Result, ValidationError};
use crate::events::{DomainEvent, DomainEventSink};
use crate::transfers::TransferLedgerTrait;

/// Service deciding and performing hide / delete / restore on accounts.
pub struct AccountLifecycleService {
    accounts: Arc<dyn BankAccountRepositoryTrait>,
    connections: Arc<dyn BankConnectionRepositoryTrait>,
    transfers: Arc<dyn TransferLedgerTrait>,
    event_sink: Arc<dyn DomainEventSink>,
}

impl AccountLifecycleService {
    /// Creates a new AccountLifecycleService instance
    pub fn new(
        accounts: Arc<dyn BankAccountRepositoryTrait>,
        connections: Arc<dyn BankConnectionRepositoryTrait>,
        transfers: Arc<dyn TransferLedgerTrait>,
        event_sink: Arc<dyn DomainEventSink>,
    ) -> Self {
        Self {
            accounts,
            connections,
            transfers,
            event_sink,
        }
    }

    fn linked_transfers(&self, account_id: &str) -> Result<Vec<LinkedTransfer>> {
        let transfers = self.transfers.list_transfers_for_account(account_id)?;

        // The ledger may return both legs of a group; a group blocks once.
        let mut seen_groups = HashSet::new();
        let mut blockers = Vec::new();
        for transfer in transfers {
            let Some(linked_account_id) = transfer.counterparty_of(account_id).map(str::to_string)
            else {
                continue;
            };
            if !seen_groups.insert(transfer.transfer_group_id.clone()) {
                continue;
            }

            let transfer_role = if transfer.source_account_id == account_id {
                TransferRole::Source
            } else {
                TransferRole::Destination
            };
            let linked_account_name = match self.accounts.get_by_id(&linked_account_id) {
                Ok(account) => Some(account.name),
                Err(e) => {
                    debug!(
                        "Linked account {} for transfer {} not readable: {}",
                        linked_account_id, transfer.transfer_group_id, e
                    );
                    None
                }
            };

            blockers.push(LinkedTransfer {
                linked_account_id,
                transaction_id: transfer.transaction_id,
                transfer_group_id: transfer.transfer_group_id,
                transfer_role,
                linked_account_name,
                amount: transfer.amount,
                date: transfer.date,
                description: transfer.description,
            });
        }
        Ok(blockers)
    }

    fn relink_suggestion(provider_name: Option<&str>, sibling_count: usize) -> String {
        let provider = provider_name.unwrap_or("your bank");
        if sibling_count == 0 {
            format!("Reconnect {} to restore this account.", provider)
        } else {
            format!(
                "Reconnect {} to restore this account. Re-linking also affects {} other account(s) on the same connection.",
                provider, sibling_count
            )
        }
    }
}

#[async_trait::async_trait]
impl AccountLifecycleServiceTrait for AccountLifecycleService {
    fn check_deletion_eligibility(&self, account_id: &str) -> Result<DeletionEligibility> {
        // Fail with NotFound for unknown accounts instead of reporting them deletable.
        self.accounts.get_by_id(account_id)?;
        let blockers = self.linked_transfers(account_id)?;
        Ok(DeletionEligibility::from_blockers(account_id, blockers))
    }

    fn check_restore_eligibility(&self, account_id: &str) -> Result<RestoreEligibility> {
        let account = self.accounts.get_by_id(account_id)?;
        if account.is_manual {
            return Ok(RestoreEligibility::manual(account_id));
        }

        let connection_id = account.connection_id.as_deref().ok_or_else(|| {
            Error::Validation(ValidationError::MissingField("connectionId".to_string()))
        })?;
        let connection = self.connections.get_by_id(connection_id)?;
        let provider_name = Some(connection.provider.display_name().to_string());

        let mut eligibility = RestoreEligibility {
            account_id: account_id.to_string(),
            can_restore: connection.status == ConnectionStatus::Authorized,
            requires_relink: false,
            sibling_accounts: Vec::new(),
            total_connection_accounts: 0,
            provider_name,
            connection_id: Some(connection.id.clone()),
            connection_status: Some(connection.status),
        };

        if connection.status.is_stale() {
            let sibling_accounts: Vec<SiblingAccount> = self
                .accounts
                .list_by_connection(connection_id)?
                .iter()
                .filter(|sibling| sibling.id != account.id)
                .map(SiblingAccount::from)
                .collect();
            eligibility.requires_relink = true;
            eligibility.total_connection_accounts = sibling_accounts.len() + 1;
            eligibility.sibling_accounts = sibling_accounts;
        }

        Ok(eligibility)
    }

    async fn hide_account(&self, account_id: &str) -> Result<BankAccount> {
        let mut account = self.accounts.get_by_id(account_id)?;
        if account.is_hidden() {
            return Ok(account);
        }
        account.visibility = AccountVisibility::Hidden;
        account.updated_at = Utc::now();
        let account = self.accounts.update(account).await?;
        info!("Account {} hidden", account_id);
        self.event_sink.emit(DomainEvent::account_hidden(account_id));
        Ok(account)
    }

    async fn delete_account(&self, account_id: &str) -> Result<()> {
        // Re-validate at act time; the ledger may have changed since the check.
        let eligibility = self.check_deletion_eligibility(account_id)?;
        if !eligibility.can_delete {
            return Err(Error::LinkedTransfersExist {
                account_id: account_id.to_string(),
                linked_transfer_count: eligibility.linked_transfer_count,
            });
        }

        let deleted = self.accounts.delete(account_id).await?;
        if deleted == 0 {
            return Err(Error::not_found("Account", account_id));
        }
        info!("Account {} permanently deleted", account_id);
        self.event_sink.emit(DomainEvent::account_deleted(account_id));
        Ok(())
    }

    async fn restore_account(&self, account_id: &str) -> Result<BankAccount> {
        let eligibility = self.check_restore_eligibility(account_id)?;

        if eligibility.requires_relink {
            let sibling_account_count = eligibility.sibling_accounts.len();
            return Err(Error::RelinkRequired(RelinkRequired {
                account_id: account_id.to_string(),
                connection_id: eligibility.connection_id.unwrap_or_default(),
                sibling_account_count,
                suggestion: Self::relink_suggestion(
                    eligibility.provider_name.as_deref(),
                    sibling_account_count,
                ),
                provider_name: eligibility.provider_name,
            }));
        }
        if !eligibility.can_restore {
            return Err(Error::ConnectionNotReady {
                connection_id: eligibility.connection_id.unwrap_or_default(),
                status: eligibility
                    .connection_status
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
            });
        }

        let mut account = self.accounts.get_by_id(account_id)?;
        if !account.is_hidden() {
            return Ok(account);
        }
        account.visibility = AccountVisibility::Active;
        account.updated_at = Utc::now();
        let account = self.accounts.update(account).await?;
        info!("Account {} restored", account_id);
        self.event_sink.emit(DomainEvent::account_restored(account_id));
        Ok(account)
    }
}
