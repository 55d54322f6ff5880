//! Clap derive structures for the `vigil` CLI.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vigil -- live alarm counts from a telemetry platform
#[derive(Debug, Parser)]
#[command(
    name = "vigil",
    version,
    about = "Watch plant alarm counts from the command line",
    long_about = "Keeps a local, offline-readable snapshot of the platform's topology\n\
        and follows the live alarm push stream, falling back to polling when\n\
        the stream is down. The rendered count is always permission-filtered.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Profile to use
    #[arg(long, short = 'p', env = "VIGIL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "VIGIL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Platform base URL (overrides profile)
    #[arg(long, short = 'u', env = "VIGIL_URL", global = true)]
    pub url: Option<String>,

    /// Push-stream URL (overrides profile)
    #[arg(long, env = "VIGIL_STREAM_URL", global = true)]
    pub stream_url: Option<String>,

    /// Bearer token
    #[arg(long, env = "VIGIL_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Snapshot store directory (overrides profile)
    #[arg(long, env = "VIGIL_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VIGIL_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "VIGIL_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "VIGIL_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the live alarm count until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Run the version check and, if needed, a full topology sync
    Sync(SyncArgs),

    /// Show the persisted snapshot without contacting the platform
    #[command(alias = "st")]
    Status,

    /// Fetch the filtered active-alarm count once
    Count,

    /// Clear the local snapshot and log out every instance sharing it
    Logout(LogoutArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this long (e.g. "90s", "10m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Forget the persisted version so the sync always runs
    #[arg(long, short = 'f')]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct LogoutArgs {
    /// Also delete the token stored in the system keyring
    #[arg(long)]
    pub forget: bool,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
