//! In-memory collaborators shared by the banking service tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Notify;

use super::models::{AccountSyncResponse, InitiateConnectionRequest, InitiateConnectionResponse};
use super::traits::BankingApiClient;
use banklink_core::accounts::{BankAccount, BankAccountRepositoryTrait};
use banklink_core::connections::{BankConnection, BankConnectionRepositoryTrait};
use banklink_core::errors::{DatabaseError, Error, Result};

// ============================================================================
// Repositories
// ============================================================================

#[derive(Default)]
pub struct MockAccountRepository {
    accounts: RwLock<Vec<BankAccount>>,
}

impl MockAccountRepository {
    pub fn new(accounts: Vec<BankAccount>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    pub fn stored(&self, account_id: &str) -> BankAccount {
        self.accounts
            .read()
            .unwrap()
            .iter()
            .find(|a| a.id == account_id)
            .cloned()
            .unwrap_or_else(|| panic!("account {} not stored", account_id))
    }
}

#[async_trait]
impl BankAccountRepositoryTrait for MockAccountRepository {
    fn get_by_id(&self, account_id: &str) -> Result<BankAccount> {
        self.accounts
            .read()
            .unwrap()
            .iter()
            .find(|a| a.id == account_id)
            .cloned()
            .ok_or_else(|| Error::not_found("Account", account_id))
    }

    fn list_by_connection(&self, connection_id: &str) -> Result<Vec<BankAccount>> {
        Ok(self
            .accounts
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.connection_id.as_deref() == Some(connection_id))
            .cloned()
            .collect())
    }

    async fn update(&self, account: BankAccount) -> Result<BankAccount> {
        let mut accounts = self.accounts.write().unwrap();
        let slot = accounts
            .iter_mut()
            .find(|a| a.id == account.id)
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(account.id.clone())))?;
        *slot = account.clone();
        Ok(account)
    }

    async fn delete(&self, account_id: &str) -> Result<usize> {
        let mut accounts = self.accounts.write().unwrap();
        let before = accounts.len();
        accounts.retain(|a| a.id != account_id);
        Ok(before - accounts.len())
    }
}

#[derive(Default)]
pub struct MockConnectionRepository {
    connections: RwLock<Vec<BankConnection>>,
    fail_next_update: AtomicBool,
}

impl MockConnectionRepository {
    pub fn new(connections: Vec<BankConnection>) -> Self {
        Self {
            connections: RwLock::new(connections),
            fail_next_update: AtomicBool::new(false),
        }
    }

    /// The next `update` fails with a query error; later ones succeed.
    pub fn fail_next_update(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }

    pub fn stored(&self, connection_id: &str) -> BankConnection {
        self.get_by_id(connection_id)
            .unwrap_or_else(|_| panic!("connection {} not stored", connection_id))
    }
}

#[async_trait]
impl BankConnectionRepositoryTrait for MockConnectionRepository {
    fn get_by_id(&self, connection_id: &str) -> Result<BankConnection> {
        self.connections
            .read()
            .unwrap()
            .iter()
            .find(|c| c.id == connection_id)
            .cloned()
            .ok_or_else(|| Error::not_found("Connection", connection_id))
    }

    async fn create(&self, connection: BankConnection) -> Result<BankConnection> {
        self.connections.write().unwrap().push(connection.clone());
        Ok(connection)
    }

    async fn update(&self, connection: BankConnection) -> Result<BankConnection> {
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            return Err(Error::Database(DatabaseError::QueryFailed(
                "connection store unavailable".to_string(),
            )));
        }
        let mut connections = self.connections.write().unwrap();
        let slot = connections
            .iter_mut()
            .find(|c| c.id == connection.id)
            .ok_or_else(|| Error::Database(DatabaseError::NotFound(connection.id.clone())))?;
        *slot = connection.clone();
        Ok(connection)
    }
}

// ============================================================================
// Banking API
// ============================================================================

/// Scripted banking backend. Sync results are consumed in order; when the
/// script runs out every sync succeeds with a balance of 100.
#[derive(Default)]
pub struct MockBankingApi {
    pub initiate_calls: Mutex<Vec<InitiateConnectionRequest>>,
    pub sync_calls: AtomicUsize,
    pub revoked: Mutex<Vec<String>>,
    sync_script: Mutex<VecDeque<Result<AccountSyncResponse>>>,
    sync_gate: Option<Arc<Notify>>,
}

impl MockBankingApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sync waits for a permit on `gate` before answering.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            sync_gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn script_sync(&self, result: Result<AccountSyncResponse>) {
        self.sync_script.lock().unwrap().push_back(result);
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }
}

pub fn balance(account_id: &str, balance: Decimal) -> AccountSyncResponse {
    AccountSyncResponse {
        account_id: account_id.to_string(),
        balance,
        available_balance: Some(balance),
        currency: None,
    }
}

#[async_trait]
impl BankingApiClient for MockBankingApi {
    async fn initiate_connection(
        &self,
        request: &InitiateConnectionRequest,
    ) -> Result<InitiateConnectionResponse> {
        self.initiate_calls.lock().unwrap().push(request.clone());
        Ok(InitiateConnectionResponse {
            connection_id: "conn-new".to_string(),
            redirect_url: "https://connect.tink.com/auth?session=xyz".to_string(),
            expires_in: Some(3600),
        })
    }

    async fn sync_account(&self, account_id: &str) -> Result<AccountSyncResponse> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.sync_gate {
            gate.notified().await;
        }
        let scripted = self.sync_script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(balance(account_id, Decimal::from(100))))
    }

    async fn revoke_connection(&self, connection_id: &str) -> Result<()> {
        self.revoked.lock().unwrap().push(connection_id.to_string());
        Ok(())
    }
}
