//! Workspace config files: `config/config.toml`, then `config/{WALK_ENV}.toml`.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::{Path, PathBuf};

const ENV_VAR: &str = "WALK_ENV";
const DEFAULT_ENV: &str = "development";

/// Candidate files under `workspace_root`, lowest precedence first.
pub fn config_files(workspace_root: &Path) -> Vec<PathBuf> {
    let dir = workspace_root.join("config");
    let env = std::env::var(ENV_VAR)
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENV.to_string());
    vec![dir.join("config.toml"), dir.join(format!("{}.toml", env))]
}

/// Layer every existing workspace file onto `builder`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(config_files(workspace_root)
        .into_iter()
        .filter(|path| path.is_file())
        .fold(builder, |builder, path| {
            builder.add_source(File::from(path).required(false))
        }))
}
