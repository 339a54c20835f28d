use std::path::{Path, PathBuf};
use std::sync::Arc;

use conveyor_core::{
    parse_document_str, CandidateSource, ConfigurationError, DocumentFormat, ParsedDocument,
    PipelineDocument, RunError, StageRegistry,
};
use conveyor_exec::{
    breaker_config, build_registry, CircuitBreaker, Orchestrator, OrchestratorConfig,
    OrchestratorError, SelectorError, StoreBackedSelector,
};
use conveyor_store::{open_store, StoreError, StoreHandle, StoreUrl};

use crate::exit_codes;
use crate::output::print_error;
use crate::{OutputArgs, PipelineArgs, StoreArgs, TargetArgs};

const DEFAULT_STORE: &str = "file:.conveyor";

pub struct LoadedPipeline {
    pub document: PipelineDocument,
    pub registry: Arc<StageRegistry>,
    /// Directory holding the pipeline file; relative paths resolve here.
    pub base_dir: PathBuf,
}

pub fn read_document(path: &Path, output: &OutputArgs) -> Result<ParsedDocument, i32> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        print_error(
            output.format,
            output.quiet,
            &format!("failed to read {}: {e}", path.display()),
        );
        exit_codes::USAGE_ERROR
    })?;
    parse_document_str(&content, DocumentFormat::Auto).map_err(|e| {
        print_error(output.format, output.quiet, &format!("{}: {e}", path.display()));
        exit_codes::USAGE_ERROR
    })
}

pub fn load_pipeline(args: &PipelineArgs, output: &OutputArgs) -> Result<LoadedPipeline, i32> {
    let parsed = read_document(&args.pipeline, output)?;
    let base_dir = match args.pipeline.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    match build_registry(&parsed.document, &base_dir) {
        Ok(registry) => Ok(LoadedPipeline {
            document: parsed.document,
            registry: Arc::new(registry),
            base_dir,
        }),
        Err(ConfigurationError::Validation(err)) => {
            let details: Vec<String> = err
                .violations
                .iter()
                .map(|v| format!("{}: {}", v.path, v.message))
                .collect();
            print_error(
                output.format,
                output.quiet,
                &format!("invalid pipeline: {}", details.join("; ")),
            );
            Err(exit_codes::USAGE_ERROR)
        }
        Err(e) => {
            print_error(output.format, output.quiet, &format!("invalid pipeline: {e}"));
            Err(exit_codes::USAGE_ERROR)
        }
    }
}

pub fn store_url(store: &StoreArgs) -> String {
    store
        .store
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_STORE.to_string())
}

pub async fn connect_store(store: &StoreArgs, output: &OutputArgs) -> Result<StoreHandle, i32> {
    let raw = store_url(store);
    let url = StoreUrl::parse(&raw).map_err(|e| {
        print_error(output.format, output.quiet, &e.to_string());
        exit_codes::USAGE_ERROR
    })?;
    open_store(&url).await.map_err(|e| {
        print_error(
            output.format,
            output.quiet,
            &format!("failed to open store {url}: {e}"),
        );
        exit_codes::RUNTIME_ERROR
    })
}

pub fn build_orchestrator(pipeline: &LoadedPipeline, store: &StoreHandle) -> Orchestrator {
    let config = OrchestratorConfig {
        breaker: breaker_config(&pipeline.document),
        ..OrchestratorConfig::default()
    };
    let breaker = CircuitBreaker::new(config.breaker).with_store(store.breakers());
    let mut orchestrator = Orchestrator::new(pipeline.registry.clone(), store.checkpoints(), config)
        .with_breaker(Arc::new(breaker));

    if let Some(source) = &pipeline.document.candidates {
        let source = match source {
            CandidateSource::Directory(dir) if dir.is_relative() => {
                CandidateSource::Directory(pipeline.base_dir.join(dir))
            }
            other => other.clone(),
        };
        orchestrator = orchestrator.with_selector(Arc::new(StoreBackedSelector::new(
            source,
            pipeline.registry.clone(),
            store.checkpoints(),
        )));
    }
    orchestrator
}

/// Explicit run id, else the candidate id so that split step invocations
/// for one candidate share checkpoints.
pub fn run_id_for(target: &TargetArgs, candidate_id: &str) -> String {
    target
        .run_id
        .clone()
        .unwrap_or_else(|| candidate_id.to_string())
}

pub fn orchestrator_exit_code(err: &OrchestratorError) -> i32 {
    match err {
        OrchestratorError::NoCandidate
        | OrchestratorError::UnknownStage(_)
        | OrchestratorError::Selector(SelectorError::UnknownStage(_)) => exit_codes::USAGE_ERROR,
        OrchestratorError::Store(StoreError::InvalidUrl(_)) => exit_codes::USAGE_ERROR,
        _ => exit_codes::RUNTIME_ERROR,
    }
}

pub fn run_error_exit_code(err: &RunError) -> i32 {
    match err {
        RunError::AcceptanceUnmet { .. } => exit_codes::ACCEPTANCE_UNMET,
        RunError::ExecutionFailed { .. } | RunError::CircuitOpen { .. } | RunError::Cancelled { .. } => {
            exit_codes::RUNTIME_ERROR
        }
    }
}
