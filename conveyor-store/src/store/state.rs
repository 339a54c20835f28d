use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;

use crate::store::types::*;

/// Plain in-process store contents, shared by the memory and file backends.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub(crate) struct StoreState {
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub staged_outputs: Vec<StagedOutput>,
    #[serde(default)]
    pub breakers: Vec<BreakerRecord>,
}

impl StoreState {
    pub fn record(
        &mut self,
        key: &CheckpointKey,
        status: CheckpointStatus,
        output_ref: Option<&str>,
    ) -> RecordOutcome {
        let checkpoint = Checkpoint {
            run_id: key.run_id.clone(),
            candidate_id: key.candidate_id.clone(),
            stage_id: key.stage_id.clone(),
            status,
            timestamp: Utc::now(),
            output_ref: output_ref.map(str::to_string),
        };
        match self.checkpoints.iter_mut().find(|c| c.matches(key)) {
            Some(existing) if existing.status == CheckpointStatus::Succeeded => {
                RecordOutcome::Unchanged
            }
            Some(existing) => {
                *existing = checkpoint;
                RecordOutcome::Written
            }
            None => {
                self.checkpoints.push(checkpoint);
                RecordOutcome::Written
            }
        }
    }

    pub fn get(&self, key: &CheckpointKey) -> Option<Checkpoint> {
        self.checkpoints.iter().find(|c| c.matches(key)).cloned()
    }

    pub fn list_run(&self, run_id: &str) -> Vec<Checkpoint> {
        let mut out: Vec<Checkpoint> = self
            .checkpoints
            .iter()
            .filter(|c| c.run_id == run_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.timestamp);
        out
    }

    pub fn completed_stages(&self, candidate_id: &str) -> BTreeSet<String> {
        self.checkpoints
            .iter()
            .filter(|c| c.candidate_id == candidate_id && c.status == CheckpointStatus::Succeeded)
            .map(|c| c.stage_id.clone())
            .collect()
    }

    pub fn settled_stages(&self, candidate_id: &str) -> BTreeMap<String, CheckpointStatus> {
        let rank = |c: &Checkpoint| (c.status == CheckpointStatus::Succeeded, c.timestamp);
        let mut latest: BTreeMap<String, &Checkpoint> = BTreeMap::new();
        for cp in self
            .checkpoints
            .iter()
            .filter(|c| c.candidate_id == candidate_id && c.status.is_terminal())
        {
            match latest.get(&cp.stage_id) {
                Some(prev) if rank(prev) >= rank(cp) => {}
                _ => {
                    latest.insert(cp.stage_id.clone(), cp);
                }
            }
        }
        latest
            .into_iter()
            .map(|(stage_id, cp)| (stage_id, cp.status))
            .collect()
    }

    pub fn save_staged(&mut self, key: &CheckpointKey, output_ref: &str) {
        let staged = StagedOutput {
            key: key.clone(),
            output_ref: output_ref.to_string(),
            saved_at: Utc::now(),
        };
        match self.staged_outputs.iter_mut().find(|s| &s.key == key) {
            Some(slot) => *slot = staged,
            None => self.staged_outputs.push(staged),
        }
    }

    pub fn load_staged(&self, key: &CheckpointKey) -> Option<StagedOutput> {
        self.staged_outputs.iter().find(|s| &s.key == key).cloned()
    }

    pub fn clear_staged(&mut self, key: &CheckpointKey) -> bool {
        let before = self.staged_outputs.len();
        self.staged_outputs.retain(|s| &s.key != key);
        self.staged_outputs.len() != before
    }

    pub fn load_breaker(&self, stage_id: &str) -> Option<BreakerRecord> {
        self.breakers.iter().find(|b| b.stage_id == stage_id).cloned()
    }

    pub fn save_breaker(&mut self, record: &BreakerRecord) {
        match self.breakers.iter_mut().find(|b| b.stage_id == record.stage_id) {
            Some(slot) => *slot = record.clone(),
            None => self.breakers.push(record.clone()),
        }
    }

    pub fn list_breakers(&self) -> Vec<BreakerRecord> {
        let mut out = self.breakers.clone();
        out.sort_by(|a, b| a.stage_id.cmp(&b.stage_id));
        out
    }

    pub fn delete_breaker(&mut self, stage_id: &str) -> bool {
        let before = self.breakers.len();
        self.breakers.retain(|b| b.stage_id != stage_id);
        self.breakers.len() != before
    }
}
