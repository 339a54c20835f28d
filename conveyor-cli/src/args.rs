use std::path::PathBuf;

use clap::Args;

use crate::output::OutputFormat;

#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

impl OutputArgs {
    pub fn text(&self) -> bool {
        self.format == OutputFormat::Text && !self.quiet
    }
}

#[derive(Debug, Args, Clone)]
pub struct StoreArgs {
    /// `memory:`, `file:<dir>` or a postgres:// URL. Falls back to
    /// DATABASE_URL, then `file:.conveyor`.
    #[arg(long, env = "CONVEYOR_STORE")]
    pub store: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct PipelineArgs {
    #[arg(long, env = "CONVEYOR_PIPELINE", default_value = "pipeline.yaml")]
    pub pipeline: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct TargetArgs {
    #[arg(long = "candidate-id", alias = "story-id", value_name = "ID")]
    pub candidate_id: Option<String>,
    #[arg(long, env = "CONVEYOR_RUN_ID")]
    pub run_id: Option<String>,
}
