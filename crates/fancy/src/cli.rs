//! Clap derive structures for the `fancy` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fancy -- watch and drive a notebook fan-control service
#[derive(Debug, Parser)]
#[command(
    name = "fancy",
    version,
    about = "Watch and drive a notebook fan-control service",
    long_about = "Mirrors the fan-control service's temperatures, fan speeds, active\n\
        configuration and auto mode, and forwards speed, mode and\n\
        configuration changes back to it.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "FANCY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the store against the simulated service and print updates
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Rank a configs list against a computer model
    #[command(alias = "m")]
    Match(MatchArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this long (e.g. 30s, 2m); runs until Ctrl-C when omitted
    #[arg(long, short = 'd', value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,

    /// Poll interval reported by the simulated service, in ms (0 disables polling)
    #[arg(long, default_value = "1000")]
    pub poll_ms: u64,

    /// Number of simulated fans
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u8).range(1..=8))]
    pub fans: u8,

    /// Request a target speed before watching, as INDEX=PERCENT (repeatable)
    #[arg(long = "set-speed", value_name = "INDEX=PERCENT", value_parser = parse_speed)]
    pub set_speed: Vec<(u8, f64)>,

    /// Switch the service to manual mode first
    #[arg(long, conflicts_with = "auto")]
    pub manual: bool,

    /// Switch the service to automatic mode first
    #[arg(long)]
    pub auto: bool,

    /// Apply this configuration first
    #[arg(long, value_name = "NAME")]
    pub apply_config: Option<String>,
}

impl WatchArgs {
    /// Mode requested on the command line, if any.
    pub fn requested_auto(&self) -> Option<bool> {
        if self.manual {
            Some(false)
        } else if self.auto {
            Some(true)
        } else {
            None
        }
    }
}

fn parse_speed(raw: &str) -> Result<(u8, f64), String> {
    let (index, speed) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=PERCENT, got '{raw}'"))?;
    let index: u8 = index
        .trim()
        .parse()
        .map_err(|e| format!("invalid fan index '{index}': {e}"))?;
    let speed: f64 = speed
        .trim()
        .parse()
        .map_err(|e| format!("invalid speed '{speed}': {e}"))?;
    if !speed.is_finite() {
        return Err(format!("speed must be a finite number, got '{raw}'"));
    }
    Ok((index, speed))
}

// ── Match ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MatchArgs {
    /// Computer model to rank configurations against
    pub model: String,

    /// JSON file holding the configs list
    #[arg(long, short = 'c', value_name = "FILE")]
    pub configs: PathBuf,

    /// Minimum score (exclusive); defaults to sync.match_threshold
    #[arg(long)]
    pub threshold: Option<f64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn speed_pairs_parse() {
        assert_eq!(parse_speed("1=42.5").unwrap(), (1, 42.5));
        assert_eq!(parse_speed(" 0 = 100 ").unwrap(), (0, 100.0));
        assert!(parse_speed("42").is_err());
        assert!(parse_speed("x=1").is_err());
        assert!(parse_speed("0=NaN").is_err());
    }

    #[test]
    fn manual_and_auto_conflict() {
        let err = Cli::try_parse_from(["fancy", "watch", "--manual", "--auto"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn watch_flags_parse() {
        let cli = Cli::try_parse_from([
            "fancy",
            "watch",
            "--duration",
            "2s",
            "--set-speed",
            "0=30",
            "--set-speed",
            "1=60",
            "--manual",
        ])
        .unwrap();
        let Command::Watch(args) = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(args.duration, Some(Duration::from_secs(2)));
        assert_eq!(args.set_speed, vec![(0, 30.0), (1, 60.0)]);
        assert_eq!(args.requested_auto(), Some(false));
        assert_eq!(args.fans, 2);
    }
}
