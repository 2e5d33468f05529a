pub mod args;
pub mod commands;
pub mod source;
pub mod view;

pub use args::*;
pub use commands::CommandContext;

use clap::Parser;

use crate::commands::completions::generate_completions;
use crate::commands::metrics::handle_metrics;
use crate::commands::monitor::handle_monitor;
use crate::commands::policy::handle_policy;
use crate::commands::power::handle_power;
use crate::commands::status::handle_status;

/// Shared async entrypoint used by the `bmcfleet` binary.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_parsed(cli).await
}

/// Execute the CLI given a pre-parsed argument struct.
pub async fn run_parsed(cli: Cli) -> anyhow::Result<()> {
    // Completions need no engine config or HTTP client.
    if let Commands::Completions { shell } = &cli.command {
        generate_completions(*shell);
        return Ok(());
    }

    let ctx = CommandContext::new(cli.globals)?;
    match cli.command {
        Commands::Status(args) => handle_status(&ctx, args).await?,
        Commands::Power { command } => handle_power(&ctx, command).await?,
        Commands::Policy { command } => handle_policy(&ctx, command).await?,
        Commands::Metrics(args) => handle_metrics(&ctx, args).await?,
        Commands::Monitor(args) => handle_monitor(&ctx, args).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
