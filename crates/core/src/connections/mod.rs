//! Bank connections - models, lifecycle state machine, and repository trait.

mod connections_model;
mod connections_state;
mod connections_traits;

pub use connections_model::{BankConnection, BankProvider, ConnectionStatus};
pub use connections_state::{transition, ConnectionEvent};
pub use connections_traits::BankConnectionRepositoryTrait;
