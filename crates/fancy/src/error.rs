//! CLI error types with miette diagnostics.
//!
//! Wraps config, file and service failures into user-facing errors with
//! actionable help text.

use std::io;

use miette::Diagnostic;
use thiserror::Error;

use fancy_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const SERVICE: i32 = 5;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Could not load configuration from {path}")]
    #[diagnostic(
        code(fancy::config),
        help(
            "Check {path} and any FANCY_* environment variables.\n\
             Regenerate defaults with: fancy config init --force"
        )
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(fancy::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    // ── Configs list ─────────────────────────────────────────────────

    #[error("Could not read configs list {path}")]
    #[diagnostic(
        code(fancy::configs_list),
        help("Pass a JSON file exported from the fan-control service with --configs.")
    )]
    ConfigsList {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Configs list {path} is not valid")]
    #[diagnostic(
        code(fancy::configs_list_invalid),
        help("Expected a JSON array of objects with name, model, author and thresholds fields.")
    )]
    InvalidConfigsList {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fancy::validation))]
    Validation { field: String, reason: String },

    // ── Service ──────────────────────────────────────────────────────

    #[error("The fan-control service reported {count} fatal error(s)")]
    #[diagnostic(
        code(fancy::service),
        help("Every report was printed above. Re-run with -v for the full log.")
    )]
    FatalErrors { count: usize },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("Could not encode output: {0}")]
    #[diagnostic(code(fancy::json))]
    Json(#[from] serde_json::Error),

    #[error("Could not encode configuration: {0}")]
    #[diagnostic(code(fancy::toml))]
    Toml(#[from] toml::ser::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::ConfigExists { .. } => exit_code::CONFIG,
            Self::ConfigsList { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                exit_code::NOT_FOUND
            }
            Self::Validation { .. } | Self::InvalidConfigsList { .. } => exit_code::USAGE,
            Self::FatalErrors { .. } => exit_code::SERVICE,
            _ => exit_code::GENERAL,
        }
    }
}
