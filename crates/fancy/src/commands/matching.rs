//! Match command: rank a configs list file against a computer model.

use std::path::Path;

use tabled::Tabled;

use fancy_config::Config;
use fancy_core::{ConfigInfo, ConfigMatch, ConfigMatcher};

use crate::cli::{GlobalOpts, MatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct MatchRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Author")]
    author: String,
    #[tabled(rename = "Score")]
    score: String,
}

fn match_row(m: &ConfigMatch) -> MatchRow {
    MatchRow {
        name: m.config.display_name().to_owned(),
        model: m.config.model.clone(),
        author: m.config.author.clone().unwrap_or_default(),
        score: format!("{:.2}", m.score),
    }
}

/// Parse a configs list as exported by the fan-control service.
pub fn read_configs(path: &Path) -> Result<Vec<ConfigInfo>, CliError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| CliError::ConfigsList {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::InvalidConfigsList {
        path: display,
        source,
    })
}

pub fn handle(args: &MatchArgs, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let threshold = args.threshold.unwrap_or(config.sync.match_threshold);
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(CliError::Validation {
            field: "threshold".into(),
            reason: format!("expected a finite number >= 0, got {threshold}"),
        });
    }

    let configs = read_configs(&args.configs)?;
    let matches = ConfigMatcher::new(threshold).rank(&args.model, &configs);
    tracing::debug!(
        total = configs.len(),
        kept = matches.len(),
        threshold,
        "ranked configs list"
    );

    let out = output::render_list(global.output, &matches, match_row, |m| {
        m.config.display_name().to_owned()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
