//! Config subcommand handlers.

use std::path::Path;

use fancy_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Load and validate the config at `path`.
pub fn load(path: &Path) -> Result<Config, CliError> {
    fancy_config::load_config_from(path).map_err(|source| CliError::Config {
        path: path.display().to_string(),
        source,
    })
}

pub fn handle(args: &ConfigArgs, path: &Path, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let config = load(path)?;
            let out = output::render_single(global.output, &config, |c| {
                Ok(toml::to_string_pretty(c)?)
            })?;
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            fancy_config::save_config_to(&Config::default(), path).map_err(|source| {
                CliError::Config {
                    path: path.display().to_string(),
                    source,
                }
            })?;
            if !global.quiet {
                eprintln!("Wrote default configuration to {}", path.display());
            }
            Ok(())
        }
    }
}
