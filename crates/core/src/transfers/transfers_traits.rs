//! Transfer ledger trait.

use super::transfers_model::Transfer;
use crate::errors::Result;

/// Read access to the transfer ledger.
///
/// The ledger is owned elsewhere; this core only consumes it.
pub trait TransferLedgerTrait: Send + Sync {
    /// Every transfer where `account_id` is the source or the destination.
    fn list_transfers_for_account(&self, account_id: &str) -> Result<Vec<Transfer>>;
}
