//! CLI output: argument parsing helpers and error mapping to the CLI surface.

use crate::context::ContentType;
use crate::error::PipelineError;
use crate::pipeline::Stage;
use crate::types::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        match value {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(PipelineError::InvalidArgument(format!(
                "unknown format '{}', expected text or json",
                other
            ))),
        }
    }
}

pub fn parse_run_id(value: &str) -> Result<RunId, PipelineError> {
    value.parse().map_err(PipelineError::InvalidArgument)
}

pub fn parse_stage(value: &str) -> Result<Stage, PipelineError> {
    value.parse().map_err(PipelineError::InvalidArgument)
}

pub fn parse_content_type(value: &str) -> Result<ContentType, PipelineError> {
    value.parse().map_err(PipelineError::InvalidArgument)
}

/// Map domain errors to a single line for stderr, prefixed with the status code.
pub fn map_error(e: &PipelineError) -> String {
    format!("error[{}]: {}", e.status_code().as_str(), e)
}
