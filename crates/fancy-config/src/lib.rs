//! Configuration for the fancy front end.
//!
//! Defaults, then a TOML file, then `FANCY_`-prefixed environment variables
//! (`FANCY_SYNC__MATCH_THRESHOLD=0.8`). The result is validated and
//! translated into `fancy_core::SyncConfig`.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fancy_core::matcher::DEFAULT_MATCH_THRESHOLD;
use fancy_core::{PollInterval, SyncConfig};

const ENV_PREFIX: &str = "FANCY_";
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncSettings {
    /// Poll period used until the service reports its own. Unset or `0`
    /// keeps polling disabled until then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_poll_interval_ms: Option<u64>,

    /// Configs must score strictly above this to be suggested.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            initial_poll_interval_ms: None,
            match_threshold: default_match_threshold(),
        }
    }
}

fn default_match_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogSettings {
    /// Level used when neither `-v` nor `RUST_LOG` is given.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "warn".into()
}
fn default_log_format() -> String {
    "pretty".into()
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.sync.match_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ConfigError::invalid(
                "sync.match_threshold",
                format!("expected a finite number >= 0, got {threshold}"),
            ));
        }
        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::invalid(
                "log.level",
                format!("expected one of {}, got '{}'", LOG_LEVELS.join(", "), self.log.level),
            ));
        }
        if !matches!(self.log.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::invalid(
                "log.format",
                format!("expected 'pretty' or 'json', got '{}'", self.log.format),
            ));
        }
        Ok(())
    }

    /// Runtime settings for the store.
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            initial_poll_interval: self
                .sync
                .initial_poll_interval_ms
                .map_or(PollInterval::Disabled, PollInterval::from_millis),
            match_threshold: self.sync.match_threshold,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "musikid", "fancy").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fancy");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load and validate the config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load and validate the config from `path` + environment. A missing file
/// is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_keep_polling_disabled() {
        let sync = Config::default().to_sync_config();
        assert_eq!(sync.initial_poll_interval, PollInterval::Disabled);
        assert_eq!(sync.match_threshold, 0.5);
    }

    #[test]
    fn file_values_are_used() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "fancy.toml",
                r#"
                [sync]
                initial_poll_interval_ms = 2000
                match_threshold = 1.25

                [log]
                level = "debug"
                "#,
            )?;
            let cfg = load_config_from(Path::new("fancy.toml")).map_err(|e| e.to_string())?;
            let sync = cfg.to_sync_config();
            assert_eq!(
                sync.initial_poll_interval.period(),
                Some(Duration::from_millis(2000))
            );
            assert_eq!(sync.match_threshold, 1.25);
            assert_eq!(cfg.log.level, "debug");
            assert_eq!(cfg.log.format, "pretty");
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("fancy.toml", "[sync]\nmatch_threshold = 1.0\n")?;
            jail.set_env("FANCY_SYNC__MATCH_THRESHOLD", "0.8");
            jail.set_env("FANCY_LOG__FORMAT", "json");
            let cfg = load_config_from(Path::new("fancy.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.sync.match_threshold, 0.8);
            assert_eq!(cfg.log.format, "json");
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_jail| {
            let cfg = load_config_from(Path::new("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg, Config::default());
            Ok(())
        });
    }

    #[test]
    fn negative_threshold_fails_validation() {
        Jail::expect_with(|jail| {
            jail.create_file("fancy.toml", "[sync]\nmatch_threshold = -1.0\n")?;
            let err = load_config_from(Path::new("fancy.toml")).unwrap_err();
            assert!(
                matches!(err, ConfigError::Validation { ref field, .. } if field == "sync.match_threshold"),
                "got {err}"
            );
            Ok(())
        });
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut cfg = Config::default();
        cfg.log.level = "loud".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.sync.initial_poll_interval_ms = Some(750);

        save_config_to(&cfg, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("initial_poll_interval_ms = 750"));
        assert_eq!(load_config_from(&path).unwrap().sync.initial_poll_interval_ms, Some(750));
    }
}
