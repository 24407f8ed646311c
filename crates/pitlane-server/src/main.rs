mod cli;
mod config;
mod http;
mod serve;

use clap::Parser;
use cli::{Cli, Commands};
use config::PitlaneConfig;
use pitlane_core::Workspaces;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Config subcommands report parse errors themselves
    if let Commands::Config(cmd) = cli.command {
        return cli::config_cmd::run(cmd, &cli.config);
    }

    let mut config = PitlaneConfig::load_or_default(&cli.config)?;
    config.apply_env();
    if let Some(dir) = cli.workspace_dir {
        config.workspace.base_dir = Some(dir);
    }
    if let Commands::Serve(args) = &cli.command {
        if let Some(host) = &args.host {
            config.server.host = host.clone();
        }
        if let Some(port) = args.port {
            config.server.port = port;
        }
        if let Some(level) = args.log_level {
            config.server.log_level = level.as_str().to_string();
        }
        if let Some(env) = args.env {
            config.server.env = env;
        }
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .init();

    match cli.command {
        Commands::Serve(_) => serve::run(config).await,
        Commands::Workspace(cmd) => cli::workspace::run(cmd, &Workspaces::new(config.workspace_base())),
        Commands::Config(_) => Ok(()),
    }
}
