use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::file::FileStore;
use crate::memory::MemoryStore;
use crate::postgres::{run_migrations, PostgresStore};
use crate::store::{BreakerStore, CheckpointStore, StoreError};

const PG_MAX_CONNECTIONS: u32 = 5;

/// A parsed store location: `memory:`, `file:<dir>` (or a bare path), or a
/// `postgres://` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUrl {
    Memory,
    File(PathBuf),
    Postgres(String),
}

impl StoreUrl {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(StoreError::InvalidUrl(raw.to_string()));
        }
        if raw == "memory" || raw == "memory:" {
            return Ok(StoreUrl::Memory);
        }
        if raw.starts_with("postgres://") || raw.starts_with("postgresql://") {
            return Ok(StoreUrl::Postgres(raw.to_string()));
        }
        if let Some(path) = raw.strip_prefix("file://").or_else(|| raw.strip_prefix("file:")) {
            if path.is_empty() {
                return Err(StoreError::InvalidUrl(raw.to_string()));
            }
            return Ok(StoreUrl::File(PathBuf::from(path)));
        }
        if raw.contains("://") {
            return Err(StoreError::InvalidUrl(raw.to_string()));
        }
        Ok(StoreUrl::File(PathBuf::from(raw)))
    }
}

impl fmt::Display for StoreUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreUrl::Memory => f.write_str("memory:"),
            StoreUrl::File(path) => write!(f, "file:{}", path.display()),
            // Connection strings may carry credentials.
            StoreUrl::Postgres(_) => f.write_str("postgres://…"),
        }
    }
}

/// An opened backend, viewable as either store trait.
#[derive(Clone)]
pub enum StoreHandle {
    Memory(Arc<MemoryStore>),
    File(Arc<FileStore>),
    Postgres(Arc<PostgresStore>),
}

impl StoreHandle {
    pub fn checkpoints(&self) -> Arc<dyn CheckpointStore> {
        match self {
            StoreHandle::Memory(s) => s.clone(),
            StoreHandle::File(s) => s.clone(),
            StoreHandle::Postgres(s) => s.clone(),
        }
    }

    pub fn breakers(&self) -> Arc<dyn BreakerStore> {
        match self {
            StoreHandle::Memory(s) => s.clone(),
            StoreHandle::File(s) => s.clone(),
            StoreHandle::Postgres(s) => s.clone(),
        }
    }

    /// Apply schema migrations. A no-op for backends without a schema.
    pub async fn migrate(&self) -> Result<bool, StoreError> {
        match self {
            StoreHandle::Postgres(s) => {
                run_migrations(s.pool()).await?;
                Ok(true)
            }
            StoreHandle::Memory(_) | StoreHandle::File(_) => Ok(false),
        }
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            StoreHandle::Memory(_) => "memory",
            StoreHandle::File(_) => "file",
            StoreHandle::Postgres(_) => "postgres",
        };
        f.debug_tuple("StoreHandle").field(&kind).finish()
    }
}

pub async fn open_store(url: &StoreUrl) -> Result<StoreHandle, StoreError> {
    tracing::debug!(store = %url, "opening store");
    Ok(match url {
        StoreUrl::Memory => StoreHandle::Memory(Arc::new(MemoryStore::new())),
        StoreUrl::File(dir) => StoreHandle::File(Arc::new(FileStore::open(dir)?)),
        StoreUrl::Postgres(conn) => {
            StoreHandle::Postgres(Arc::new(PostgresStore::connect(conn, PG_MAX_CONNECTIONS).await?))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_forms() {
        assert_eq!(StoreUrl::parse("memory:").unwrap(), StoreUrl::Memory);
        assert_eq!(
            StoreUrl::parse("file:.conveyor").unwrap(),
            StoreUrl::File(PathBuf::from(".conveyor"))
        );
        assert_eq!(
            StoreUrl::parse("/var/lib/conveyor").unwrap(),
            StoreUrl::File(PathBuf::from("/var/lib/conveyor"))
        );
        assert!(matches!(
            StoreUrl::parse("postgres://u:p@localhost/db").unwrap(),
            StoreUrl::Postgres(_)
        ));
    }

    #[test]
    fn rejects_unknown_schemes() {
        assert!(StoreUrl::parse("redis://localhost").is_err());
        assert!(StoreUrl::parse("file:").is_err());
        assert!(StoreUrl::parse("").is_err());
    }

    #[test]
    fn display_hides_postgres_credentials() {
        let url = StoreUrl::parse("postgres://user:secret@db/app").unwrap();
        assert!(!url.to_string().contains("secret"));
    }
}
