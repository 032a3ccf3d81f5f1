//! Accounts module - domain models, lifecycle eligibility, services, and traits.

mod accounts_model;
mod accounts_service;
mod accounts_traits;
mod lifecycle_model;

// Re-export the public interface
pub use accounts_model::{AccountBalanceUpdate, AccountVisibility, BankAccount, SiblingAccount};
pub use accounts_service::AccountLifecycleService;
pub use accounts_traits::{AccountLifecycleServiceTrait, BankAccountRepositoryTrait};
pub use lifecycle_model::{DeletionEligibility, LinkedTransfer, RestoreEligibility, TransferRole};
