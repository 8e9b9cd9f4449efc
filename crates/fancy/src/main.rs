mod cli;
mod commands;
mod error;
mod output;
mod simulator;

use std::path::Path;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fancy_config::{Config, LogSettings};

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, log: &LogSettings) {
    let filter = match verbosity {
        0 => log.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);

    if log.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let path = cli
        .global
        .config
        .clone()
        .unwrap_or_else(fancy_config::config_path);

    match &cli.command {
        // Config commands must work even when the file does not load
        Command::Config(args) => {
            init_tracing(cli.global.verbose, &LogSettings::default());
            commands::config_cmd::handle(args, &path, &cli.global)
        }

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "fancy", &mut std::io::stdout());
            Ok(())
        }

        Command::Watch(args) => {
            let config = setup(cli.global.verbose, &path)?;
            commands::watch::handle(args, &config, &cli.global).await
        }
        Command::Match(args) => {
            let config = setup(cli.global.verbose, &path)?;
            commands::matching::handle(args, &config, &cli.global)
        }
    }
}

/// Load the config at `path` and set up tracing from it.
fn setup(verbosity: u8, path: &Path) -> Result<Config, CliError> {
    let config = commands::config_cmd::load(path)?;
    init_tracing(verbosity, &config.log);
    tracing::debug!(config = %path.display(), "configuration loaded");
    Ok(config)
}
