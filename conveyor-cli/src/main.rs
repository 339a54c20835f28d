use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod args;
mod cmd;
mod commands;
mod exit_codes;
mod output;

pub use args::*;
use commands::{BreakerCommand, Command};

#[derive(Debug, Parser)]
#[command(name = "conveyor", version, about = "Staged content pipeline orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            std::process::exit(exit_codes::RUNTIME_ERROR);
        }
    };

    let exit_code = rt.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                on_signal.cancel();
            }
        });
        run_command(cli.command, cancel).await
    });
    std::process::exit(exit_code);
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("CONVEYOR_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_command(command: Command, cancel: CancellationToken) -> i32 {
    match command {
        Command::Step {
            action,
            stage,
            target,
            pipeline,
            store,
            output,
        } => cmd::step::step_cmd(action, &stage, target, pipeline, store, output, &cancel).await,
        Command::Loop {
            stage,
            max_tries,
            sleep_seconds,
            target,
            pipeline,
            store,
            output,
        } => {
            cmd::loop_cmd::loop_cmd(
                &stage,
                max_tries,
                sleep_seconds,
                target,
                pipeline,
                store,
                output,
                &cancel,
            )
            .await
        }
        Command::Run {
            target,
            no_resume,
            events,
            pipeline,
            store,
            output,
        } => cmd::run::run_cmd(target, !no_resume, events, pipeline, store, output, &cancel).await,
        Command::Plan { pipeline, output } => cmd::plan::plan_cmd(pipeline, output).await,
        Command::Validate { path, output } => cmd::validate::validate_cmd(&path, output).await,
        Command::Status {
            run_id,
            store,
            output,
        } => cmd::status::status_cmd(&run_id, store, output).await,
        Command::Breaker { command } => match command {
            BreakerCommand::Show {
                stage,
                store,
                output,
            } => cmd::breaker::show_cmd(stage.as_deref(), store, output).await,
            BreakerCommand::Reset {
                stage,
                store,
                output,
            } => cmd::breaker::reset_cmd(&stage, store, output).await,
        },
        Command::Migrate { store, output } => cmd::migrate::migrate_cmd(store, output).await,
    }
}
