use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use conveyor_core::{CandidateSource, StageRegistry};
use conveyor_store::{CheckpointStatus, CheckpointStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("unknown stage `{0}`")]
    UnknownStage(String),
    #[error("cannot list candidates in {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Chooses the next unit of work that is ready for a stage.
#[async_trait]
pub trait CandidateSelector: Send + Sync {
    async fn pick_one(&self, stage_id: &str) -> Result<Option<String>, SelectorError>;
}

/// Picks the first candidate that has not settled `stage_id` but is past
/// every enabled stage planned before it.
pub struct StoreBackedSelector {
    source: CandidateSource,
    registry: Arc<StageRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl StoreBackedSelector {
    pub fn new(
        source: CandidateSource,
        registry: Arc<StageRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            source,
            registry,
            checkpoints,
        }
    }

    /// Candidate ids in selection order.
    pub async fn candidates(&self) -> Result<Vec<String>, SelectorError> {
        match &self.source {
            CandidateSource::Ids(ids) => Ok(ids.clone()),
            CandidateSource::Directory(dir) => list_subdirectories(dir).await,
        }
    }
}

#[async_trait]
impl CandidateSelector for StoreBackedSelector {
    async fn pick_one(&self, stage_id: &str) -> Result<Option<String>, SelectorError> {
        if self.registry.get(stage_id).is_none() {
            return Err(SelectorError::UnknownStage(stage_id.to_string()));
        }
        let required = self.registry.predecessors(stage_id);

        for candidate in self.candidates().await? {
            let settled = self.checkpoints.settled_stages(&candidate).await?;
            if matches!(
                settled.get(stage_id),
                Some(CheckpointStatus::Succeeded | CheckpointStatus::Skipped)
            ) {
                continue;
            }
            if required
                .iter()
                .all(|s| self.prerequisite_met(s, settled.get(s.as_str())))
            {
                tracing::debug!(%stage_id, %candidate, "picked candidate");
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}

impl StoreBackedSelector {
    /// An earlier stage no longer holds a candidate back once it succeeded,
    /// was skipped by its condition, or failed with `continue_on_error`.
    fn prerequisite_met(&self, stage_id: &str, status: Option<&CheckpointStatus>) -> bool {
        match status {
            Some(CheckpointStatus::Succeeded | CheckpointStatus::Skipped) => true,
            Some(CheckpointStatus::Failed) => self
                .registry
                .get(stage_id)
                .is_some_and(|stage| stage.continue_on_error),
            _ => false,
        }
    }
}

async fn list_subdirectories(dir: &Path) -> Result<Vec<String>, SelectorError> {
    let io_err = |source| SelectorError::Io {
        path: dir.display().to_string(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        if !entry.file_type().await.map_err(io_err)?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
