use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};

use crate::args::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StepAction {
    PickOne,
    Run,
    CheckAcceptance,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// One stage action per invocation.
    Step {
        #[arg(long, value_enum)]
        action: StepAction,
        #[arg(long = "step", value_name = "STAGE")]
        stage: String,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Run then check acceptance until accepted or out of tries.
    Loop {
        #[arg(long = "step", value_name = "STAGE")]
        stage: String,
        #[arg(long, default_value_t = 3)]
        max_tries: u32,
        #[arg(long, default_value_t = 0)]
        sleep_seconds: u64,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Run every planned stage for one candidate.
    Run {
        #[command(flatten)]
        target: TargetArgs,
        /// Re-run stages that already succeeded under this run id.
        #[arg(long)]
        no_resume: bool,
        /// Stream lifecycle events to stdout as JSON lines.
        #[arg(long)]
        events: bool,
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    Plan {
        #[command(flatten)]
        pipeline: PipelineArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    Validate {
        path: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    Status {
        #[arg(long)]
        run_id: String,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    Breaker {
        #[command(subcommand)]
        command: BreakerCommand,
    },
    Migrate {
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum BreakerCommand {
    Show {
        #[arg(long = "step", value_name = "STAGE")]
        stage: Option<String>,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    Reset {
        #[arg(long = "step", value_name = "STAGE")]
        stage: String,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}
