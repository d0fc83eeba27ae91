//! Loading entry points.

use super::merge::builder_with_defaults;
use super::sources::{environment, global_file, workspace_file};
use super::WalkConfig;
use crate::error::PipelineError;
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence, lowest first: built-in defaults, the global file, the workspace
    /// `config/config.toml`, the workspace `config/{WALK_ENV}.toml`, then `WALK__*`
    /// environment variables.
    pub fn load(workspace_root: &Path) -> Result<WalkConfig, PipelineError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);

        let config: WalkConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load a single explicit file over the built-in defaults.
    pub fn load_from_file(path: &Path) -> Result<WalkConfig, PipelineError> {
        let config = builder_with_defaults()?
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}
