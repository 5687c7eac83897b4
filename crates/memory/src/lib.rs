pub mod state_store;
pub mod types;

pub use state_store::{FileStateStore, MemoryStateStore, StateStore, StoreError, DEFAULT_STATE_KEY};
pub use types::*;
