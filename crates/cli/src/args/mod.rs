use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "bmcfleet",
    version,
    about = "bmcfleet - fleet operations for server BMCs"
)]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// CSV file with targets (address,username,password[,cluster[,name]]).
    #[arg(short = 'f', long, global = true, env = "BMCFLEET_CLI_FILE")]
    pub file: Option<PathBuf>,

    /// Address of a single endpoint (instead of --file).
    #[arg(short = 'i', long, global = true, conflicts_with = "file")]
    pub ip: Option<String>,

    /// Username for single-endpoint mode.
    #[arg(
        short = 'u',
        long,
        global = true,
        env = "BMCFLEET_CLI_USERNAME",
        default_value = "Administrator"
    )]
    pub username: String,

    /// Password for single-endpoint mode.
    #[arg(short = 'p', long, global = true, env = "BMCFLEET_CLI_PASSWORD")]
    pub password: Option<String>,

    /// Concurrency ceiling for in-flight endpoint actions.
    #[arg(short = 'w', long, global = true)]
    pub workers: Option<usize>,

    /// Per-target deadline in seconds, spanning all retry attempts.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Skip confirmation prompts for destructive actions (audited).
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Accept self-signed BMC certificates.
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Report output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputMode::Table)]
    pub output: OutputMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    Table,
    Json,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::Table => f.write_str("table"),
            OutputMode::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check system status across the fleet.
    Status(StatusArgs),
    /// Power state transitions (confirmation gated).
    Power {
        #[command(subcommand)]
        command: PowerCommands,
    },
    /// Power policy management.
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },
    /// One-shot power and CPU readings with fleet totals.
    Metrics(MetricsArgs),
    /// Repeat metric cycles on a fixed interval, persisting history.
    Monitor(MonitorArgs),
    /// Generate shell completions for the CLI.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// Include power and CPU readings (extra endpoint requests).
    #[arg(long)]
    pub details: bool,

    /// Write the report to a CSV file (overwritten each run).
    #[arg(long)]
    pub output_csv: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum PowerCommands {
    /// Power systems on.
    On,
    /// Graceful OS shutdown.
    Off,
    /// Immediate power cut.
    ForceOff,
}

#[derive(Debug, Subcommand)]
pub enum PolicyCommands {
    /// Read the current power policy from each endpoint.
    Get,
    /// Apply a power policy to each endpoint (confirmation gated).
    Set {
        /// Policy value, e.g. StaticHighPerf or DynamicPowerSavings.
        policy: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct MetricsArgs {
    /// Write the report to a CSV file (overwritten each run).
    #[arg(long)]
    pub output_csv: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct MonitorArgs {
    /// Seconds between cycles (defaults to the engine config interval).
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Stop after this many cycles instead of running until interrupted.
    #[arg(long)]
    pub iterations: Option<u64>,

    /// Append each cycle to this CSV history file.
    #[arg(long)]
    pub output_csv: Option<PathBuf>,

    /// Write a timestamped JSON snapshot per cycle into this directory.
    #[arg(long)]
    pub json_dir: Option<PathBuf>,

    /// Expose Prometheus metrics on the configured address while monitoring.
    #[arg(long)]
    pub serve_metrics: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

impl From<CompletionShell> for clap_complete::Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => clap_complete::Shell::Bash,
            CompletionShell::Zsh => clap_complete::Shell::Zsh,
            CompletionShell::Fish => clap_complete::Shell::Fish,
        }
    }
}
