//! Configuration System
//!
//! Layered configuration for the pipeline, the generation retry policy, context
//! assembly, the model provider, storage and logging. Sources are merged through the
//! `config` crate; see [`ConfigLoader`] for precedence.

use crate::context::{Ingestor, SnapshotBudget};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use crate::provider::{ProviderConfig, ProviderType};
pub use crate::retry::RetryConfig;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalkConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Retry policy applied to every model call
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Default iteration bound for submitted runs
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

/// Snapshot budget and ingestion settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_fragments")]
    pub max_fragments: usize,

    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Lines per fragment when ingesting files
    #[serde(default = "default_chunk_lines")]
    pub chunk_lines: usize,

    /// Files larger than this are skipped during ingestion
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_max_fragments() -> usize {
    10
}

fn default_max_bytes() -> usize {
    65_536
}

fn default_chunk_lines() -> usize {
    120
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_fragments: default_max_fragments(),
            max_bytes: default_max_bytes(),
            chunk_lines: default_chunk_lines(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

impl ContextConfig {
    pub fn budget(&self) -> SnapshotBudget {
        SnapshotBudget {
            max_fragments: self.max_fragments,
            max_bytes: self.max_bytes,
        }
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(self.chunk_lines, self.max_file_bytes)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_fragments == 0 {
            return Err("max_fragments must be at least 1".to_string());
        }
        if self.max_bytes == 0 {
            return Err("max_bytes must be at least 1".to_string());
        }
        if self.chunk_lines == 0 {
            return Err("chunk_lines must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Storage paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled database holding runs, attempts, reviews and the context corpus
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".walk/store")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

impl StorageConfig {
    /// Store path, relative paths taken from `workspace_root`.
    pub fn resolve_store_path(&self, workspace_root: &Path) -> PathBuf {
        if self.store_path.is_absolute() {
            self.store_path.clone()
        } else {
            workspace_root.join(&self.store_path)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Pipeline(String),
    Retry(String),
    Context(String),
    Provider(String),
    Storage(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Pipeline(msg) => write!(f, "Pipeline: {}", msg),
            ValidationError::Retry(msg) => write!(f, "Retry: {}", msg),
            ValidationError::Context(msg) => write!(f, "Context: {}", msg),
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl WalkConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.pipeline.max_iterations == 0 {
            errors.push(ValidationError::Pipeline(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if let Err(e) = self.retry.validate() {
            errors.push(ValidationError::Retry(e));
        }
        if let Err(e) = self.context.validate() {
            errors.push(ValidationError::Context(e));
        }
        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }
        if self.storage.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Store path cannot be empty".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
