mod state;
mod trait_store;
mod types;

pub(crate) use state::StoreState;
pub use trait_store::{BreakerStore, CheckpointStore, StoreError};
pub use types::*;
