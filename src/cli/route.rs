//! CLI route: single route table and run context. Dispatches to the orchestrator,
//! the context store and presentation.

use crate::cli::help::{command_name, needs_provider};
use crate::cli::output::{parse_content_type, parse_run_id, parse_stage, OutputFormat};
use crate::cli::parse::{Commands, ConfigCommands, ContextCommands};
use crate::cli::presentation::{
    format_advance_report, format_fragment_list, format_ingest_report, format_recovery_report,
    format_removal, format_run_list, format_run_status, format_snapshot, format_versions,
    stage_label,
};
use crate::config::{global_config_path, ConfigLoader, WalkConfig};
use crate::context::{ContextStore, SledContextStore};
use crate::error::{PipelineError, StorageError};
use crate::feedback::FeedbackGate;
use crate::generation::GenerationClient;
use crate::pipeline::{
    AdvanceReport, AttemptOutcome, CancelOutcome, FeedbackDecision, PipelineOrchestrator,
    Stage,
};
use crate::retry::RetryPolicy;
use crate::store::SledPipelineStore;
use crate::types::RunId;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Runtime context for CLI execution: configuration, the sled-backed stores and the
/// orchestrator built over them.
pub struct RunContext {
    config: WalkConfig,
    workspace_root: PathBuf,
    orchestrator: PipelineOrchestrator,
    context_store: Arc<SledContextStore>,
    runtime: Runtime,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
    ) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        config.validate().map_err(|errors| {
            PipelineError::Config(
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })?;

        let store_path = config.storage.resolve_store_path(&workspace_root);
        std::fs::create_dir_all(&store_path).map_err(StorageError::IoError)?;
        let db = sled::open(&store_path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;

        let pipeline_store = SledPipelineStore::shared(db.clone())?;
        let context_store =
            Arc::new(SledContextStore::new(db)?.with_budget(config.context.budget()));

        let model = config
            .provider
            .build_client()
            .map_err(|e| PipelineError::Config(format!("provider: {}", e)))?;
        let generator = GenerationClient::new(model, RetryPolicy::from_config(&config.retry))
            .with_options(config.provider.completion_options());
        let gate = Arc::new(FeedbackGate::new(pipeline_store.clone()));
        let orchestrator = PipelineOrchestrator::new(
            pipeline_store,
            context_store.clone(),
            Arc::new(generator),
            gate,
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(StorageError::IoError)?;

        debug!(
            workspace = %workspace_root.display(),
            store = %store_path.display(),
            "CLI context initialized"
        );
        Ok(Self {
            config,
            workspace_root,
            orchestrator,
            context_store,
            runtime,
        })
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        let started = Instant::now();
        let name = command_name(command);
        if needs_provider(command) {
            self.config
                .provider
                .ensure_ready()
                .map_err(|e| PipelineError::Config(e.to_string()))?;
        }
        let result = self.execute_inner(command);
        info!(
            command = %name,
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, PipelineError> {
        match command {
            Commands::Submit {
                task,
                max_iterations,
                drive,
                format,
            } => self.handle_submit(
                task,
                max_iterations.unwrap_or(self.config.pipeline.max_iterations),
                *drive,
                OutputFormat::parse(format)?,
            ),
            Commands::Advance { run_id, format } => {
                let run_id = parse_run_id(run_id)?;
                let report = self.runtime.block_on(self.orchestrator.advance(&run_id))?;
                Ok(format_advance_report(&report, OutputFormat::parse(format)?))
            }
            Commands::Run { run_id, format } => {
                let run_id = parse_run_id(run_id)?;
                let report = self.runtime.block_on(self.orchestrator.drive(&run_id))?;
                Ok(format_advance_report(&report, OutputFormat::parse(format)?))
            }
            Commands::Status { run_id, format } => {
                let status = self.orchestrator.status(&parse_run_id(run_id)?)?;
                Ok(format_run_status(&status, OutputFormat::parse(format)?))
            }
            Commands::List { stage, format } => {
                let stage = stage.as_deref().map(parse_stage).transpose()?;
                let runs = self.orchestrator.list(stage)?;
                Ok(format_run_list(&runs, OutputFormat::parse(format)?))
            }
            Commands::Approve { run_id } => {
                self.handle_decision(&parse_run_id(run_id)?, FeedbackDecision::Approve)
            }
            Commands::RequestChanges { run_id, comments } => self.handle_decision(
                &parse_run_id(run_id)?,
                FeedbackDecision::RequestChanges {
                    comments: comments.clone(),
                },
            ),
            Commands::Reject { run_id, reason } => self.handle_decision(
                &parse_run_id(run_id)?,
                FeedbackDecision::Reject {
                    reason: reason.clone(),
                },
            ),
            Commands::Cancel { run_id } => {
                let run_id = parse_run_id(run_id)?;
                let message = match self.orchestrator.cancel(&run_id)? {
                    CancelOutcome::Cancelled => format!("Run {} cancelled", run_id),
                    CancelOutcome::Scheduled => format!(
                        "Run {} is busy; cancellation will apply at its next step",
                        run_id
                    ),
                    CancelOutcome::AlreadyTerminal => {
                        format!("Run {} has already finished", run_id)
                    }
                };
                Ok(message)
            }
            Commands::Recover { resume, format } => {
                self.handle_recover(*resume, OutputFormat::parse(format)?)
            }
            Commands::Review { run_id } => {
                let run_id = run_id.as_deref().map(parse_run_id).transpose()?;
                self.handle_review(run_id)
            }
            Commands::Context { command } => self.handle_context_command(command),
            Commands::Config { command } => self.handle_config_command(command),
        }
    }

    fn handle_submit(
        &self,
        task: &str,
        max_iterations: u32,
        drive: bool,
        format: OutputFormat,
    ) -> Result<String, PipelineError> {
        let run_id = self.orchestrator.submit(task, max_iterations)?;
        if !drive {
            return Ok(match format {
                OutputFormat::Json => json!({ "run_id": run_id }).to_string(),
                OutputFormat::Text => format!("Submitted run {}", run_id),
            });
        }
        let report = self.runtime.block_on(self.orchestrator.drive(&run_id))?;
        Ok(match format {
            OutputFormat::Json => format_advance_report(&report, format),
            OutputFormat::Text => format!(
                "Submitted run {}\n{}",
                run_id,
                format_advance_report(&report, format)
            ),
        })
    }

    /// Deliver a decision and apply it right away. Applying never calls the model.
    fn apply_decision(
        &self,
        run_id: &RunId,
        decision: FeedbackDecision,
    ) -> Result<AdvanceReport, PipelineError> {
        self.runtime.block_on(async {
            self.orchestrator.resolve(run_id, decision).await?;
            self.orchestrator.advance(run_id).await
        })
    }

    fn handle_decision(
        &self,
        run_id: &RunId,
        decision: FeedbackDecision,
    ) -> Result<String, PipelineError> {
        let label = decision.label();
        let report = self.apply_decision(run_id, decision)?;
        let mut out = format!(
            "Recorded {} for run {}: now {}",
            label,
            run_id,
            stage_label(report.stage)
        );
        if report.stage == Stage::ContextAssembly {
            out.push_str(&format!(
                "\nRun 'walk run {}' to generate iteration {}",
                run_id, report.iteration
            ));
        }
        Ok(out)
    }

    fn handle_recover(&self, resume: bool, format: OutputFormat) -> Result<String, PipelineError> {
        let report = self.runtime.block_on(self.orchestrator.recover())?;
        let mut out = format_recovery_report(&report, format);
        if resume && !report.resumable.is_empty() {
            let results = self
                .runtime
                .block_on(self.orchestrator.drive_all(&report.resumable));
            for (run_id, result) in results {
                let line = match result {
                    Ok(report) => format_advance_report(&report, OutputFormat::Text),
                    Err(e) => format!("Run {} failed to resume: {}", run_id, e),
                };
                out.push('\n');
                out.push_str(&line);
            }
        }
        Ok(out)
    }

    fn handle_review(&self, only: Option<RunId>) -> Result<String, PipelineError> {
        use dialoguer::{Input, Select};

        let run_ids: Vec<RunId> = match only {
            Some(id) => vec![id],
            None => self
                .orchestrator
                .list(Some(Stage::AwaitingReview))?
                .into_iter()
                .map(|run| run.id)
                .collect(),
        };
        if run_ids.is_empty() {
            return Ok("No runs are awaiting review.".to_string());
        }

        let prompt_err = |e: dialoguer::Error| {
            PipelineError::InvalidArgument(format!("Failed to get user input: {}", e))
        };
        let mut summary = Vec::new();
        for run_id in run_ids {
            let status = self.orchestrator.status(&run_id)?;
            if status.run.stage != Stage::AwaitingReview {
                summary.push(format!("Run {} is {}, skipped", run_id, status.run.stage));
                continue;
            }
            let Some(attempt) = status
                .attempts
                .iter()
                .rev()
                .find(|a| a.outcome == AttemptOutcome::Pending)
            else {
                continue;
            };

            eprintln!("\n{}", format_run_status(&status, OutputFormat::Text));
            if let Some(artifact) = &attempt.artifact {
                eprintln!("----- attempt {} -----\n{}", attempt.seq, artifact.content);
                for note in &artifact.commentary.notes {
                    eprintln!("note: {}", note);
                }
            }

            let choice = Select::new()
                .with_prompt(format!("Decision for run {}", run_id))
                .items(&["Approve", "Request changes", "Reject", "Skip"])
                .default(0)
                .interact()
                .map_err(prompt_err)?;
            let decision = match choice {
                0 => FeedbackDecision::Approve,
                1 => FeedbackDecision::RequestChanges {
                    comments: Input::<String>::new()
                        .with_prompt("Comments")
                        .interact_text()
                        .map_err(prompt_err)?,
                },
                2 => FeedbackDecision::Reject {
                    reason: Input::<String>::new()
                        .with_prompt("Reason")
                        .interact_text()
                        .map_err(prompt_err)?,
                },
                _ => {
                    summary.push(format!("Run {} skipped", run_id));
                    continue;
                }
            };
            let label = decision.label();
            let report = self.apply_decision(&run_id, decision)?;
            summary.push(format!(
                "Run {}: {} -> {}",
                run_id,
                label,
                stage_label(report.stage)
            ));
        }
        Ok(summary.join("\n"))
    }

    fn handle_context_command(&self, command: &ContextCommands) -> Result<String, PipelineError> {
        match command {
            ContextCommands::Ingest { path, format } => {
                let root = path.clone().unwrap_or_else(|| self.workspace_root.clone());
                let report = self
                    .config
                    .context
                    .ingestor()
                    .ingest(&root, &self.context_store)?;
                Ok(format_ingest_report(&report, OutputFormat::parse(format)?))
            }
            ContextCommands::Query {
                task,
                version,
                format,
            } => {
                let version = match version {
                    Some(v) => *v,
                    None => self.context_store.current_version()?,
                };
                let snapshot = self.context_store.query(task, version)?;
                Ok(format_snapshot(&snapshot, OutputFormat::parse(format)?))
            }
            ContextCommands::Versions { format } => {
                let versions = self.context_store.versions()?;
                Ok(format_versions(&versions, OutputFormat::parse(format)?))
            }
            ContextCommands::List {
                content_type,
                version,
                format,
            } => {
                let format = OutputFormat::parse(format)?;
                let content_type = content_type.as_deref().map(parse_content_type).transpose()?;
                let version = match version {
                    Some(v) => *v,
                    None => self.context_store.current_version()?,
                };
                let fragments = self.context_store.list_fragments(version, content_type)?;
                Ok(format_fragment_list(version, &fragments, format))
            }
            ContextCommands::Remove {
                fragment_id,
                format,
            } => {
                let format = OutputFormat::parse(format)?;
                let version = self.context_store.remove_fragment(fragment_id)?;
                Ok(format_removal(fragment_id, version, format))
            }
        }
    }

    fn handle_config_command(&self, command: &ConfigCommands) -> Result<String, PipelineError> {
        match command {
            ConfigCommands::Show => toml::to_string_pretty(&self.config)
                .map_err(|e| PipelineError::Config(format!("Failed to render config: {}", e))),
            ConfigCommands::Validate => {
                let global = global_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string());
                let provider = match self.config.provider.ensure_ready() {
                    Ok(()) => "ready".to_string(),
                    Err(e) => format!("not ready ({})", e),
                };
                Ok(format!(
                    "Configuration is valid\n  global file: {}\n  workspace: {}\n  provider: {} {} {}",
                    global,
                    self.workspace_root.display(),
                    self.config.provider.provider_type.as_str(),
                    self.config.provider.model,
                    provider
                ))
            }
        }
    }
}
