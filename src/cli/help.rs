//! CLI command-name contract for logging.

use crate::cli::parse::{Commands, ConfigCommands, ContextCommands};

/// Command name string for log fields (e.g. "run", "context.ingest").
pub fn command_name(command: &Commands) -> String {
    match command {
        Commands::Submit { .. } => "submit".to_string(),
        Commands::Advance { .. } => "advance".to_string(),
        Commands::Run { .. } => "run".to_string(),
        Commands::Status { .. } => "status".to_string(),
        Commands::List { .. } => "list".to_string(),
        Commands::Approve { .. } => "approve".to_string(),
        Commands::RequestChanges { .. } => "request_changes".to_string(),
        Commands::Reject { .. } => "reject".to_string(),
        Commands::Cancel { .. } => "cancel".to_string(),
        Commands::Recover { .. } => "recover".to_string(),
        Commands::Review { .. } => "review".to_string(),
        Commands::Context { command } => format!("context.{}", context_command_name(command)),
        Commands::Config { command } => format!("config.{}", config_command_name(command)),
    }
}

pub fn context_command_name(command: &ContextCommands) -> &'static str {
    match command {
        ContextCommands::Ingest { .. } => "ingest",
        ContextCommands::Query { .. } => "query",
        ContextCommands::Versions { .. } => "versions",
        ContextCommands::List { .. } => "list",
        ContextCommands::Remove { .. } => "remove",
    }
}

pub fn config_command_name(command: &ConfigCommands) -> &'static str {
    match command {
        ConfigCommands::Show => "show",
        ConfigCommands::Validate => "validate",
    }
}

/// Commands that may call the model provider.
pub fn needs_provider(command: &Commands) -> bool {
    match command {
        Commands::Submit { drive, .. } => *drive,
        Commands::Advance { .. } | Commands::Run { .. } => true,
        Commands::Recover { resume, .. } => *resume,
        _ => false,
    }
}
