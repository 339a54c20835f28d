#![forbid(unsafe_code)]

pub mod file;
pub mod memory;
pub mod postgres;
pub mod store;
mod url;

pub use crate::file::FileStore;
pub use crate::memory::MemoryStore;
pub use crate::postgres::run_migrations;
pub use crate::postgres::PostgresStore;
pub use crate::store::{
    BreakerRecord, BreakerState, BreakerStore, Checkpoint, CheckpointKey, CheckpointStatus,
    CheckpointStore, RecordOutcome, StagedOutput, StoreError,
};
pub use crate::url::{open_store, StoreHandle, StoreUrl};
