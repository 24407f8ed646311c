pub mod config_cmd;
pub mod workspace;

use crate::config::Environment;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pitlane")]
#[command(version, about = "F1 data chat server with one cached agent per browser session")]
pub struct Cli {
    /// Path to pitlane.toml
    #[arg(
        long,
        global = true,
        env = "PITLANE_CONFIG",
        default_value = "pitlane.toml"
    )]
    pub config: PathBuf,

    /// Workspace base directory (overrides config file)
    #[arg(long, global = true)]
    pub workspace_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Session workspace management
    #[command(subcommand)]
    Workspace(WorkspaceCommands),
    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,
    /// Port to bind to
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
    /// Deployment environment; `development` drops the cookie Secure flag
    #[arg(long, value_enum)]
    pub env: Option<Environment>,
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommands {
    /// Create a new session workspace
    Create(WorkspaceCreateArgs),
    /// List workspaces, most recently used first
    List(WorkspaceListArgs),
    /// Show details of one workspace
    Info(WorkspaceIdArgs),
    /// Delete a workspace
    Remove(WorkspaceRemoveArgs),
    /// Delete idle workspaces
    Clean(WorkspaceCleanArgs),
}

#[derive(Args, Debug)]
pub struct WorkspaceCreateArgs {
    /// Session id; a UUID is generated when omitted
    #[arg(long)]
    pub session_id: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct WorkspaceListArgs {
    /// Show every workspace instead of the ten most recent
    #[arg(long)]
    pub all: bool,
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct WorkspaceIdArgs {
    pub session_id: String,
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(Args, Debug)]
pub struct WorkspaceRemoveArgs {
    pub session_id: String,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct WorkspaceCleanArgs {
    /// Remove workspaces idle for more than this many days
    #[arg(long, conflicts_with = "all")]
    pub older_than_days: Option<u32>,
    /// Remove every workspace
    #[arg(long)]
    pub all: bool,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    Validate,
    Show,
}

/// Ask on stdin; anything but `y`/`yes` declines.
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    use std::io::Write;

    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
