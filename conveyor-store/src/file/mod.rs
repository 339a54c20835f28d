//! Directory-backed store for single-host deployments.
//!
//! All state lives in one JSON snapshot. Every operation takes an advisory
//! lock on a sidecar file, re-reads the snapshot, and (for writes) replaces
//! it via write-to-temp then rename, so separate processes sharing the
//! directory observe each other's writes and never see a torn file. The
//! locking and file I/O run on tokio's blocking pool.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::Mutex;

use crate::store::{
    BreakerRecord, BreakerStore, Checkpoint, CheckpointKey, CheckpointStatus, CheckpointStore,
    RecordOutcome, StagedOutput, StoreError, StoreState,
};

const STATE_FILE_NAME: &str = "conveyor-state.json";
const LOCK_FILE_NAME: &str = "conveyor-state.lock";

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    paths: Arc<SnapshotPaths>,
    // Serializes tasks within this process; the file lock covers other processes.
    local: Mutex<()>,
}

#[derive(Debug)]
struct SnapshotPaths {
    state_file: PathBuf,
    lock_file: PathBuf,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            paths: Arc::new(SnapshotPaths {
                state_file: root.join(STATE_FILE_NAME),
                lock_file: root.join(LOCK_FILE_NAME),
            }),
            root,
            local: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `f` over a fresh snapshot on the blocking pool, under a shared lock.
    async fn read<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&StoreState) -> R + Send + 'static,
        R: Send + 'static,
    {
        let _guard = self.local.lock().await;
        let paths = self.paths.clone();
        blocking(move || {
            let lock = paths.lock(false)?;
            let state = paths.load()?;
            let out = f(&state);
            FileExt::unlock(&lock)?;
            Ok(out)
        })
        .await
    }

    /// Like `read`, under an exclusive lock, persisting the mutated snapshot.
    async fn write<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut StoreState) -> R + Send + 'static,
        R: Send + 'static,
    {
        let _guard = self.local.lock().await;
        let paths = self.paths.clone();
        blocking(move || {
            let lock = paths.lock(true)?;
            let mut state = paths.load()?;
            let out = f(&mut state);
            paths.persist(&state)?;
            FileExt::unlock(&lock)?;
            Ok(out)
        })
        .await
    }
}

async fn blocking<R, F>(f: F) -> Result<R, StoreError>
where
    F: FnOnce() -> Result<R, StoreError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Other(format!("file store task failed: {e}")))?
}

impl SnapshotPaths {
    fn lock(&self, exclusive: bool) -> Result<File, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;
        if exclusive {
            FileExt::lock_exclusive(&file)?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(file)
    }

    fn load(&self) -> Result<StoreState, StoreError> {
        if !self.state_file.exists() {
            return Ok(StoreState::default());
        }
        let raw = fs::read(&self.state_file)?;
        if raw.is_empty() {
            return Ok(StoreState::default());
        }
        serde_json::from_slice(&raw).map_err(|e| {
            StoreError::Corrupt(format!("{}: {e}", self.state_file.display()))
        })
    }

    fn persist(&self, state: &StoreState) -> Result<(), StoreError> {
        let raw = serde_json::to_vec_pretty(state)?;
        let tmp = self.state_file.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.state_file)?;
        tracing::trace!(path = %self.state_file.display(), "persisted store snapshot");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    async fn record(
        &self,
        key: &CheckpointKey,
        status: CheckpointStatus,
        output_ref: Option<&str>,
    ) -> Result<RecordOutcome, StoreError> {
        let owned_key = key.clone();
        let output_ref = output_ref.map(str::to_string);
        let outcome = self
            .write(move |s| s.record(&owned_key, status, output_ref.as_deref()))
            .await?;
        tracing::debug!(%key, status = status.as_str(), ?outcome, "recorded checkpoint");
        Ok(outcome)
    }

    async fn get_checkpoint(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, StoreError> {
        let key = key.clone();
        self.read(move |s| s.get(&key)).await
    }

    async fn list_run_checkpoints(&self, run_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let run_id = run_id.to_string();
        self.read(move |s| s.list_run(&run_id)).await
    }

    async fn completed_stages(&self, candidate_id: &str) -> Result<BTreeSet<String>, StoreError> {
        let candidate_id = candidate_id.to_string();
        self.read(move |s| s.completed_stages(&candidate_id)).await
    }

    async fn settled_stages(
        &self,
        candidate_id: &str,
    ) -> Result<BTreeMap<String, CheckpointStatus>, StoreError> {
        let candidate_id = candidate_id.to_string();
        self.read(move |s| s.settled_stages(&candidate_id)).await
    }

    async fn save_staged_output(
        &self,
        key: &CheckpointKey,
        output_ref: &str,
    ) -> Result<(), StoreError> {
        let key = key.clone();
        let output_ref = output_ref.to_string();
        self.write(move |s| s.save_staged(&key, &output_ref)).await
    }

    async fn load_staged_output(
        &self,
        key: &CheckpointKey,
    ) -> Result<Option<StagedOutput>, StoreError> {
        let key = key.clone();
        self.read(move |s| s.load_staged(&key)).await
    }

    async fn clear_staged_output(&self, key: &CheckpointKey) -> Result<bool, StoreError> {
        let key = key.clone();
        self.write(move |s| s.clear_staged(&key)).await
    }
}

#[async_trait]
impl BreakerStore for FileStore {
    async fn load_breaker(&self, stage_id: &str) -> Result<Option<BreakerRecord>, StoreError> {
        let stage_id = stage_id.to_string();
        self.read(move |s| s.load_breaker(&stage_id)).await
    }

    async fn save_breaker(&self, record: &BreakerRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.write(move |s| s.save_breaker(&record)).await
    }

    async fn list_breakers(&self) -> Result<Vec<BreakerRecord>, StoreError> {
        self.read(|s| s.list_breakers()).await
    }

    async fn delete_breaker(&self, stage_id: &str) -> Result<bool, StoreError> {
        let stage_id = stage_id.to_string();
        self.write(move |s| s.delete_breaker(&stage_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn reopen_restores_checkpoints() {
        let tmp = tempfile::tempdir().unwrap();
        let key = CheckpointKey::new("r1", "story-1", "idea");
        {
            let store = FileStore::open(tmp.path()).unwrap();
            store
                .record(&key, CheckpointStatus::Succeeded, Some("{\"ok\":true}"))
                .await
                .unwrap();
        }
        let store = FileStore::open(tmp.path()).unwrap();
        let cp = store.get_checkpoint(&key).await.unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Succeeded);
        assert_eq!(cp.output_ref.as_deref(), Some("{\"ok\":true}"));
        assert!(!tmp.path().join("conveyor-state.json.tmp").exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn corrupt_snapshot_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(STATE_FILE_NAME), b"{not json").unwrap();
        let store = FileStore::open(tmp.path()).unwrap();
        let err = store.list_breakers().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "current_thread")]
    async fn waiting_for_the_lock_does_not_block_the_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileStore::open(tmp.path()).unwrap());

        // Another process holding the lock.
        let held = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(tmp.path().join(LOCK_FILE_NAME))
            .unwrap();
        FileExt::lock_exclusive(&held).unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                let key = CheckpointKey::new("r1", "c1", "idea");
                store.record(&key, CheckpointStatus::Succeeded, None).await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!writer.is_finished());

        FileExt::unlock(&held).unwrap();
        writer.await.unwrap().unwrap();
        let key = CheckpointKey::new("r1", "c1", "idea");
        assert!(store.is_completed(&key).await.unwrap());
    }
}
