//! Per-stage circuit breaker shared by every run of an orchestrator.
//!
//! Closed → Open after `failure_threshold` consecutive failures. Open →
//! HalfOpen once `cooldown` has elapsed, admitting exactly one probe. The
//! probe's result closes the breaker or re-opens it immediately.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use conveyor_store::{BreakerRecord, BreakerState, BreakerStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerTransition {
    pub from: BreakerState,
    pub to: BreakerState,
}

#[derive(Debug, Clone)]
struct Entry {
    record: BreakerRecord,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    store: Option<Arc<dyn BreakerStore>>,
    table: Mutex<BTreeMap<String, Entry>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            store: None,
            table: Mutex::new(BTreeMap::new()),
        }
    }

    /// Persist every transition and load state lazily from `store`.
    pub fn with_store(mut self, store: Arc<dyn BreakerStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    pub async fn should_attempt(&self, stage_id: &str) -> Result<bool, StoreError> {
        self.should_attempt_at(stage_id, Utc::now()).await
    }

    pub async fn should_attempt_at(
        &self,
        stage_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut table = self.table.lock().await;
        let entry = self.entry(&mut table, stage_id).await?;

        match entry.record.state {
            BreakerState::Closed => Ok(true),
            BreakerState::HalfOpen => {
                if entry.probe_in_flight {
                    return Ok(false);
                }
                entry.probe_in_flight = true;
                Ok(true)
            }
            BreakerState::Open => {
                if !self.cooldown_elapsed(&entry.record, now) {
                    return Ok(false);
                }
                entry.record.state = BreakerState::HalfOpen;
                entry.record.updated_at = now;
                entry.probe_in_flight = true;
                tracing::info!(%stage_id, "circuit breaker half-open, admitting probe");
                let record = entry.record.clone();
                self.persist(&record).await?;
                Ok(true)
            }
        }
    }

    /// Record a terminal stage outcome. Returns the state change, if any.
    pub async fn record_result(
        &self,
        stage_id: &str,
        success: bool,
    ) -> Result<Option<BreakerTransition>, StoreError> {
        self.record_result_at(stage_id, success, Utc::now()).await
    }

    pub async fn record_result_at(
        &self,
        stage_id: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<BreakerTransition>, StoreError> {
        let mut table = self.table.lock().await;
        let entry = self.entry(&mut table, stage_id).await?;
        let before = entry.record.clone();
        entry.probe_in_flight = false;

        if success {
            entry.record.consecutive_failures = 0;
            entry.record.state = BreakerState::Closed;
            entry.record.opened_at = None;
        } else {
            entry.record.consecutive_failures = entry.record.consecutive_failures.saturating_add(1);
            let trip = match entry.record.state {
                BreakerState::HalfOpen => true,
                BreakerState::Closed => {
                    entry.record.consecutive_failures >= self.config.failure_threshold
                }
                BreakerState::Open => false,
            };
            if trip {
                entry.record.state = BreakerState::Open;
                entry.record.opened_at = Some(now);
                tracing::warn!(
                    %stage_id,
                    failures = entry.record.consecutive_failures,
                    "circuit breaker opened"
                );
            }
        }

        let changed = entry.record.state != before.state
            || entry.record.consecutive_failures != before.consecutive_failures;
        if !changed {
            return Ok(None);
        }
        entry.record.updated_at = now;
        let record = entry.record.clone();
        self.persist(&record).await?;

        Ok((record.state != before.state).then_some(BreakerTransition {
            from: before.state,
            to: record.state,
        }))
    }

    /// Hand back an admitted probe whose outcome will not be recorded, so the
    /// next caller may probe instead.
    pub async fn release_probe(&self, stage_id: &str) {
        let mut table = self.table.lock().await;
        if let Some(entry) = table.get_mut(stage_id) {
            if entry.probe_in_flight {
                entry.probe_in_flight = false;
                tracing::debug!(%stage_id, "released half-open probe");
            }
        }
    }

    /// Current state for one stage, loading it if not yet seen.
    pub async fn snapshot(&self, stage_id: &str) -> Result<BreakerRecord, StoreError> {
        let mut table = self.table.lock().await;
        Ok(self.entry(&mut table, stage_id).await?.record.clone())
    }

    /// Administrative reset to Closed with zero failures.
    pub async fn reset(&self, stage_id: &str) -> Result<(), StoreError> {
        let mut table = self.table.lock().await;
        table.remove(stage_id);
        if let Some(store) = &self.store {
            store.delete_breaker(stage_id).await?;
        }
        tracing::info!(%stage_id, "circuit breaker reset");
        Ok(())
    }

    async fn entry<'a>(
        &self,
        table: &'a mut BTreeMap<String, Entry>,
        stage_id: &str,
    ) -> Result<&'a mut Entry, StoreError> {
        if !table.contains_key(stage_id) {
            let record = match &self.store {
                Some(store) => store.load_breaker(stage_id).await?,
                None => None,
            };
            let record = record.unwrap_or_else(|| BreakerRecord::closed(stage_id));
            table.insert(
                stage_id.to_string(),
                Entry {
                    record,
                    probe_in_flight: false,
                },
            );
        }
        table
            .get_mut(stage_id)
            .ok_or_else(|| StoreError::Other(format!("breaker entry for `{stage_id}` vanished")))
    }

    fn cooldown_elapsed(&self, record: &BreakerRecord, now: DateTime<Utc>) -> bool {
        let Some(opened_at) = record.opened_at else {
            return true;
        };
        let cooldown = TimeDelta::from_std(self.config.cooldown).unwrap_or(TimeDelta::MAX);
        opened_at
            .checked_add_signed(cooldown)
            .is_some_and(|reopen_at| now >= reopen_at)
    }

    async fn persist(&self, record: &BreakerRecord) -> Result<(), StoreError> {
        match &self.store {
            Some(store) => store.save_breaker(record).await,
            None => Ok(()),
        }
    }
}
