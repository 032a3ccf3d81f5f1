//! Banklink Core - bank connection lifecycle, account sync state, and
//! account lifecycle eligibility.
//!
//! This crate is storage-agnostic. It defines the domain models, the two
//! state machines, the eligibility engine, and the repository traits that
//! storage and transport adapters implement.

pub mod accounts;
pub mod connections;
pub mod errors;
pub mod events;
pub mod sync;
pub mod transfers;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
