//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to the orchestrator.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::command_name;
pub use output::{map_error, parse_run_id, parse_stage, OutputFormat};
pub use parse::{Cli, Commands, ConfigCommands, ContextCommands};
pub use route::RunContext;
