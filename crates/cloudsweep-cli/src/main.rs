//! cloudsweep - policy-driven cloud resource cleanup CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cloudsweep_cli::cmd;
use cloudsweep_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,cloudsweep_core={level},cloudsweep_cli={level}"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => cmd::run::run(&args, cli.config.as_deref()).await,
        Commands::CheckConfig => cmd::check_config::check_config(cli.config.as_deref()),
    }
}
