mod breakers;
mod checkpoints;
mod migrate;
mod store;

pub use migrate::run_migrations;
pub use store::PostgresStore;
