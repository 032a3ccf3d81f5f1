//! Account sync state machine and sync request planning.

mod sync_state_model;

pub use sync_state_model::*;
