//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources replace individual keys, never whole tables, so a workspace file
/// that sets `provider.model` keeps the global `provider.endpoint`.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("pipeline.max_iterations", 5)?
        .set_default("storage.store_path", ".walk/store")
}
