//! Transfers between accounts - models, leg pairing, and ledger trait.

mod transfers_model;
mod transfers_traits;

pub use transfers_model::*;
pub use transfers_traits::TransferLedgerTrait;
