//! Connection repository trait.
//!
//! Persistence is an external collaborator; this trait is the read/write seam
//! the services depend on.

use async_trait::async_trait;

use super::connections_model::BankConnection;
use crate::errors::Result;

/// Trait defining the contract for BankConnection persistence.
#[async_trait]
pub trait BankConnectionRepositoryTrait: Send + Sync {
    /// Retrieves a connection by its ID. Missing connections are a
    /// `DatabaseError::NotFound`.
    fn get_by_id(&self, connection_id: &str) -> Result<BankConnection>;

    /// Inserts a new connection.
    async fn create(&self, connection: BankConnection) -> Result<BankConnection>;

    /// Replaces the stored connection with `connection`.
    async fn update(&self, connection: BankConnection) -> Result<BankConnection>;
}
