use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Plan {
    pub stages: Vec<PlanStage>,
    /// Registered but disabled; never executed.
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PlanStage {
    pub position: usize,
    pub stage_id: String,
    pub name: String,
    pub order: i64,
    pub max_execution_retries: u32,
    pub max_acceptance_retries: u32,
    pub retry_delay_ms: u64,
    pub continue_on_error: bool,
    pub conditional: bool,
}

impl Plan {
    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.stage_id.as_str()).collect()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for s in &self.stages {
            let _ = write!(
                out,
                "{:>2}. {} (order {}) exec-retries={} accept-retries={} delay={}ms",
                s.position,
                s.stage_id,
                s.order,
                s.max_execution_retries,
                s.max_acceptance_retries,
                s.retry_delay_ms
            );
            if s.continue_on_error {
                out.push_str(" continue-on-error");
            }
            if s.conditional {
                out.push_str(" conditional");
            }
            out.push('\n');
        }
        if !self.disabled.is_empty() {
            let _ = writeln!(out, "disabled: {}", self.disabled.join(", "));
        }
        out
    }
}
