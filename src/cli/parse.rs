//! CLI parse: clap types for walk. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// walk - drive code generation through context assembly, generation and human review
#[derive(Parser)]
#[command(name = "walk")]
#[command(about = "Drive code-generation runs through context, generation and review")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, short)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a task as a new run
    Submit {
        /// Natural-language task description
        task: String,
        /// Maximum review iterations (defaults to pipeline.max_iterations)
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Drive the new run until it needs a review decision
        #[arg(long)]
        drive: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Perform exactly one stage transition
    Advance {
        run_id: String,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Advance until the run is terminal or awaiting review
    Run {
        run_id: String,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show a run with its attempts and pending review
    Status {
        run_id: String,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List runs, newest first
    List {
        /// Only runs in this stage (e.g. awaiting-review)
        #[arg(long)]
        stage: Option<String>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Approve the attempt under review
    Approve { run_id: String },
    /// Request changes to the attempt under review
    RequestChanges {
        run_id: String,
        /// Reviewer comments fed into the next iteration
        #[arg(long, short)]
        comments: String,
    },
    /// Reject the attempt under review and fail the run
    Reject {
        run_id: String,
        #[arg(long, short)]
        reason: String,
    },
    /// Cancel a run
    Cancel { run_id: String },
    /// Reconcile persisted state after a restart
    Recover {
        /// Drive every resumable run afterwards
        #[arg(long)]
        resume: bool,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Review pending attempts interactively
    Review {
        /// Review only this run (default: every run awaiting review)
        run_id: Option<String>,
    },
    /// Context corpus operations
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },
    /// Configuration inspection
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ContextCommands {
    /// Ingest a directory as a new corpus version
    Ingest {
        /// Directory to ingest (default: workspace root)
        path: Option<PathBuf>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the snapshot a task would receive
    Query {
        task: String,
        /// Corpus version (default: latest)
        #[arg(long)]
        version: Option<u64>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List published corpus versions
    Versions {
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List the fragments of a corpus version
    List {
        /// code, documentation, configuration or text
        #[arg(long, short = 't')]
        content_type: Option<String>,
        /// Corpus version (default: latest)
        #[arg(long)]
        version: Option<u64>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Publish a new corpus version without one fragment
    Remove {
        /// Fragment id, e.g. src/client.rs#0
        fragment_id: String,
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the effective configuration
    Validate,
}
