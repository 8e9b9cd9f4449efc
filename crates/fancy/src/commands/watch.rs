//! Watch command: mirror the simulated service and print every update.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use fancy_config::Config;
use fancy_core::{AppError, FanStore};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;
use crate::simulator::{Simulator, SimulatorSettings};

// ── Updates ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct FanSpeed {
    pub name: String,
    pub speed: f64,
}

/// One printed line.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Update {
    Config {
        name: String,
    },
    Auto {
        auto: Option<bool>,
    },
    Temperatures {
        sensors: BTreeMap<String, f64>,
        mean: Option<f64>,
    },
    Speeds {
        fans: Vec<FanSpeed>,
    },
    TargetSpeeds {
        speeds: Vec<f64>,
    },
    Critical {
        critical: bool,
    },
    Error {
        error: Arc<AppError>,
    },
}

fn render(update: &Update, format: OutputFormat) -> Result<String, CliError> {
    if matches!(format, OutputFormat::Json | OutputFormat::JsonCompact) {
        return Ok(serde_json::to_string(update)?);
    }
    let (label, body) = match update {
        Update::Config { name } => ("config", name.clone()),
        Update::Auto { auto } => (
            "mode",
            match auto {
                Some(true) => "auto".to_owned(),
                Some(false) => "manual".to_owned(),
                None => "unknown".to_owned(),
            },
        ),
        Update::Temperatures { sensors, mean } => {
            let mut body = String::new();
            for (sensor, value) in sensors {
                let _ = write!(body, "{sensor} {value:.1}°C  ");
            }
            match mean {
                Some(mean) => {
                    let _ = write!(body, "(mean {mean:.1}°C)");
                }
                None => body.push_str("(no sensors)"),
            }
            ("temps", body)
        }
        Update::Speeds { fans } => (
            "speeds",
            fans.iter()
                .map(|f| format!("{} {:.1}%", f.name, f.speed))
                .collect::<Vec<_>>()
                .join("  "),
        ),
        Update::TargetSpeeds { speeds } => (
            "targets",
            speeds
                .iter()
                .map(|s| format!("{s:.1}%"))
                .collect::<Vec<_>>()
                .join("  "),
        ),
        Update::Critical { critical } => {
            ("critical", if *critical { "yes" } else { "no" }.to_owned())
        }
        Update::Error { error } => ("error", error.to_string()),
    };
    Ok(format!("{label:<10}{body}"))
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: &WatchArgs, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let simulator = Simulator::new(SimulatorSettings {
        fans: args.fans,
        poll_interval_ms: args.poll_ms,
    });
    let store = FanStore::new(simulator.backend(), config.to_sync_config());
    let emit = |update: Update| -> Result<(), CliError> {
        output::print_output(&render(&update, global.output)?, global.quiet);
        Ok(())
    };

    let mut errors = store.errors().subscribe();
    let mut active = store.active_config();
    let mut auto = store.auto();
    let mut temperatures = store.temperatures();
    let mut speeds = store.fans_speeds();
    let mut targets = store.target_speeds();
    let mut critical = store.critical();
    let names = store.fans_names();
    let mean = store.mean_temperature();

    apply_requests(&store, args).await;

    let stop = shutdown(args.duration);
    tokio::pin!(stop);
    let mut printed = 0;

    // Forward every change until stopped
    loop {
        tokio::select! {
            biased;

            () = &mut stop => break,

            Some(list) = errors.changed() => {
                for error in list.iter().skip(printed) {
                    emit(Update::Error { error: Arc::clone(error) })?;
                }
                printed = list.len();
            }
            Some(name) = active.changed() => emit(Update::Config { name })?,
            Some(mode) = auto.changed() => emit(Update::Auto { auto: mode })?,
            Some(sensors) = temperatures.changed() => emit(Update::Temperatures {
                sensors: sensors.into_iter().collect(),
                mean: *mean.get(),
            })?,
            Some(values) = speeds.changed() => {
                let fans = names.with_latest(|names| label_speeds(names, &values));
                emit(Update::Speeds { fans })?;
            }
            Some(values) = targets.changed() => emit(Update::TargetSpeeds { speeds: values })?,
            Some(flag) = critical.changed() => emit(Update::Critical { critical: flag })?,
        }
    }

    let entries = store.errors().entries();
    for error in entries.iter().skip(printed) {
        emit(Update::Error { error: Arc::clone(error) })?;
    }
    let fatal = entries.iter().filter(|e| e.fatal).count();
    if fatal > 0 {
        return Err(CliError::FatalErrors { count: fatal });
    }
    Ok(())
}

/// Send the mode, configuration and speed requests given on the command
/// line and wait until each has been answered.
async fn apply_requests(store: &FanStore, args: &WatchArgs) {
    let mut pending = Vec::new();
    if let Some(name) = &args.apply_config {
        pending.push(store.set_config(name.clone()));
    }
    pending.extend(store.set_auto(args.requested_auto()));
    for &(index, speed) in &args.set_speed {
        pending.extend(store.set_target_speed(index, speed));
    }

    debug!(count = pending.len(), "waiting for requested commands");
    for handle in pending {
        if let Err(e) = handle.await {
            warn!(error = %e, "command task failed");
        }
    }
}

fn label_speeds(names: &[String], speeds: &[f64]) -> Vec<FanSpeed> {
    speeds
        .iter()
        .enumerate()
        .map(|(i, &speed)| FanSpeed {
            name: names
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("Fan #{}", i + 1)),
            speed,
        })
        .collect()
}

async fn shutdown(duration: Option<Duration>) {
    let deadline = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    tokio::select! {
        () = &mut deadline => debug!("watch duration elapsed"),
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => debug!("interrupted"),
            Err(e) => {
                warn!(error = %e, "cannot listen for Ctrl-C");
                deadline.await;
            }
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn json_updates_are_tagged() {
        let line = render(&Update::Critical { critical: true }, OutputFormat::Json).unwrap();
        assert_eq!(line, r#"{"kind":"critical","critical":true}"#);
    }

    #[test]
    fn temperature_line_lists_sensors_and_mean() {
        let update = Update::Temperatures {
            sensors: BTreeMap::from([("CPU".to_owned(), 50.0), ("GPU".to_owned(), 70.0)]),
            mean: Some(60.0),
        };
        let line = render(&update, OutputFormat::Table).unwrap();
        assert_eq!(line, "temps     CPU 50.0°C  GPU 70.0°C  (mean 60.0°C)");
    }

    #[test]
    fn unknown_mode_is_spelled_out() {
        let line = render(&Update::Auto { auto: None }, OutputFormat::Plain).unwrap();
        assert_eq!(line, "mode      unknown");
    }

    #[test]
    fn speeds_fall_back_to_generic_labels() {
        let fans = label_speeds(&["CPU Fan".to_owned()], &[40.0, 55.5]);
        let labels: Vec<&str> = fans.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(labels, vec!["CPU Fan", "Fan #2"]);
    }
}
