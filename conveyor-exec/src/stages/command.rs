use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use conveyor_core::{Condition, RunContext, StageBody, StageError, StageOutput};

const STDERR_TAIL_BYTES: usize = 4096;

/// A stage body that runs an external program.
///
/// The child sees `CONVEYOR_RUN_ID`, `CONVEYOR_CANDIDATE_ID`,
/// `CONVEYOR_STAGE_ID` and `CONVEYOR_CONTEXT` (prior outputs as a JSON
/// object) plus the configured environment. Stdout is parsed as JSON, or
/// kept as a string when it is not JSON.
#[derive(Debug, Clone)]
pub struct CommandStage {
    stage_id: String,
    argv: Vec<String>,
    workdir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    criteria: Vec<Condition>,
    checker: Option<Vec<String>>,
}

impl CommandStage {
    pub fn new(stage_id: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            argv,
            workdir: None,
            env: BTreeMap::new(),
            criteria: Vec::new(),
            checker: None,
        }
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Acceptance criteria over `$output`; all must hold.
    pub fn criteria(mut self, criteria: Vec<Condition>) -> Self {
        self.criteria = criteria;
        self
    }

    /// Checker program fed the output JSON on stdin; exit 0 accepts.
    pub fn checker(mut self, argv: Vec<String>) -> Self {
        self.checker = Some(argv);
        self
    }

    fn base_command(&self, ctx: &RunContext) -> Result<Command, StageError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| StageError::msg(format!("stage `{}` has an empty command", self.stage_id)))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.env)
            .env("CONVEYOR_RUN_ID", ctx.run_id())
            .env("CONVEYOR_CANDIDATE_ID", ctx.candidate_id())
            .env("CONVEYOR_STAGE_ID", &self.stage_id)
            .env("CONVEYOR_CONTEXT", ctx.outputs_json().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }
}

#[async_trait]
impl StageBody for CommandStage {
    async fn execute(
        &self,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<StageOutput, StageError> {
        let mut cmd = self.base_command(ctx)?;
        tracing::debug!(stage_id = %self.stage_id, argv = ?self.argv, "spawning stage command");
        let child = cmd.spawn()?;

        // Dropping the wait future drops the child, which kills it.
        let out = tokio::select! {
            out = child.wait_with_output() => out?,
            _ = cancel.cancelled() => return Err(StageError::Cancelled),
        };

        if !out.status.success() {
            return Err(StageError::Command {
                code: out.status.code(),
                stderr: tail(&out.stderr, STDERR_TAIL_BYTES),
            });
        }
        Ok(parse_stdout(&out.stdout))
    }

    fn accept(&self, output: &StageOutput) -> bool {
        self.criteria.iter().all(|c| c.evaluate_output(output))
    }

    /// Runs the checker, when configured, with the output JSON on stdin.
    /// Exit 0 accepts. Cancellation kills the checker.
    async fn verify(
        &self,
        output: &StageOutput,
        cancel: &CancellationToken,
    ) -> Result<bool, StageError> {
        let Some(argv) = &self.checker else {
            return Ok(true);
        };
        let Some((program, args)) = argv.split_first() else {
            return Ok(false);
        };
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.env)
            .env("CONVEYOR_STAGE_ID", &self.stage_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(stage_id = %self.stage_id, error = %e, "acceptance checker failed to run");
                return Ok(false);
            }
        };

        let payload = output.to_output_ref();
        let stdin = child.stdin.take();
        let checked = async move {
            if let Some(mut stdin) = stdin {
                // A checker that exits without reading stdin closes the pipe early.
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(e);
                    }
                }
            }
            child.wait().await
        };
        tokio::select! {
            status = checked => Ok(status?.success()),
            _ = cancel.cancelled() => Err(StageError::Cancelled),
        }
    }
}

pub(crate) fn resolve_workdir(base: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        base.join(dir)
    }
}

fn parse_stdout(raw: &[u8]) -> StageOutput {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return StageOutput::empty();
    }
    serde_json::from_str::<JsonValue>(text)
        .unwrap_or_else(|_| JsonValue::String(text.to_string()))
        .into()
}

fn tail(raw: &[u8], max: usize) -> String {
    let start = raw.len().saturating_sub(max);
    String::from_utf8_lossy(&raw[start..]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stdout_falls_back_to_string() {
        assert_eq!(parse_stdout(b" {\"a\": 1}\n").value(), &json!({"a": 1}));
        assert_eq!(parse_stdout(b"done\n").value(), &json!("done"));
        assert_eq!(parse_stdout(b"\n"), StageOutput::empty());
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail(b"abcdef", 3), "def");
        assert_eq!(tail(b"ab", 10), "ab");
    }
}
