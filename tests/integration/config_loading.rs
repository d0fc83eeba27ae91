use parking_lot::Mutex;
use std::fs;
use tempfile::TempDir;
use walk::config::{ConfigLoader, ValidationError, WalkConfig};

/// Serializes tests that touch process environment variables.
static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

fn write(path: &std::path::Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn test_load_from_file_layers_over_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("walk.toml");
    write(
        &path,
        r#"
[pipeline]
max_iterations = 2

[context]
max_fragments = 4
"#,
    );

    let config = ConfigLoader::load_from_file(&path).unwrap();
    assert_eq!(config.pipeline.max_iterations, 2);
    assert_eq!(config.context.max_fragments, 4);
    assert_eq!(config.context.max_bytes, WalkConfig::default().context.max_bytes);
    assert_eq!(config.retry, WalkConfig::default().retry);
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_values_are_reported_per_section() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("walk.toml");
    write(
        &path,
        r#"
[pipeline]
max_iterations = 0

[context]
max_fragments = 0
"#,
    );

    let config = ConfigLoader::load_from_file(&path).unwrap();
    let errors = config.validate().unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Pipeline(_))));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Context(_))));
}

#[test]
fn test_workspace_file_and_environment_override() {
    let _lock = ENV_LOCK.lock();
    let home = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    write(
        &workspace.path().join("config/config.toml"),
        "[pipeline]\nmax_iterations = 7\n\n[retry]\nmax_attempts = 2\n",
    );

    std::env::set_var("XDG_CONFIG_HOME", home.path());
    std::env::set_var("WALK__RETRY__MAX_ATTEMPTS", "6");
    let loaded = ConfigLoader::load(workspace.path());
    std::env::remove_var("WALK__RETRY__MAX_ATTEMPTS");
    std::env::remove_var("XDG_CONFIG_HOME");

    let config = loaded.unwrap();
    assert_eq!(config.pipeline.max_iterations, 7);
    assert_eq!(config.retry.max_attempts, 6);
}

#[test]
fn test_empty_workspace_yields_defaults() {
    let _lock = ENV_LOCK.lock();
    let home = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();

    std::env::set_var("XDG_CONFIG_HOME", home.path());
    let loaded = ConfigLoader::load(workspace.path());
    std::env::remove_var("XDG_CONFIG_HOME");

    let config = loaded.unwrap();
    let defaults = WalkConfig::default();
    assert_eq!(config.pipeline, defaults.pipeline);
    assert_eq!(config.context, defaults.context);
    assert_eq!(config.storage, defaults.storage);
    assert!(config.validate().is_ok());
}
