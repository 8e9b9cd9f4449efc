// ── Simulated fan-control service ──
//
// Answers every backend command from an in-memory notebook: two sensors
// drifting along slow waves, fans that follow either a curve (auto) or
// their target speeds (manual), and a small configs list. Setters
// announce their effect through the matching change event.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde_json::{Value, json};

use fancy_core::{
    Backend, BackendCommand, BackendError, BackendEvent, ConfigInfo, LocalBackend,
    TemperatureThreshold,
};

pub const MODEL: &str = "Simulated Notebook 15";
const CRITICAL_TEMPERATURE: f64 = 90.0;

#[derive(Debug, Clone, Copy)]
pub struct SimulatorSettings {
    pub fans: u8,
    pub poll_interval_ms: u64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            fans: 2,
            poll_interval_ms: 1000,
        }
    }
}

struct SimState {
    started: Instant,
    poll_interval_ms: u64,
    config: String,
    auto: bool,
    target_speeds: Vec<f64>,
}

impl SimState {
    fn temperatures(&self) -> BTreeMap<String, f64> {
        let t = self.started.elapsed().as_secs_f64();
        BTreeMap::from([
            ("CPU".to_owned(), round1(58.0 + 12.0 * (t / 4.0).sin())),
            ("GPU".to_owned(), round1(52.0 + 9.0 * (t / 6.0).cos())),
        ])
    }

    fn speeds(&self) -> Vec<f64> {
        if !self.auto {
            return self.target_speeds.clone();
        }
        let hottest = self
            .temperatures()
            .into_values()
            .fold(f64::NEG_INFINITY, f64::max);
        let speed = round1(((hottest - 40.0) * 2.0).clamp(0.0, 100.0));
        vec![speed; self.target_speeds.len()]
    }

    fn critical(&self) -> bool {
        self.temperatures()
            .values()
            .any(|t| *t >= CRITICAL_TEMPERATURE)
    }

    fn names(&self) -> Vec<String> {
        (0..self.target_speeds.len())
            .map(|i| match i {
                0 => "CPU Fan".to_owned(),
                1 => "GPU Fan".to_owned(),
                n => format!("Fan #{}", n + 1),
            })
            .collect()
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// The configurations the simulated service offers.
pub fn configs() -> Vec<ConfigInfo> {
    let curve = vec![
        TemperatureThreshold {
            up_threshold: 50,
            down_threshold: 0,
            fan_speed: 0.0,
        },
        TemperatureThreshold {
            up_threshold: 70,
            down_threshold: 45,
            fan_speed: 50.0,
        },
        TemperatureThreshold {
            up_threshold: 100,
            down_threshold: 65,
            fan_speed: 100.0,
        },
    ];
    let entry = |name: &str, model: &str, author: &str| ConfigInfo {
        name: name.to_owned(),
        model: model.to_owned(),
        author: Some(author.to_owned()),
        path: None,
        thresholds: BTreeMap::from([("CPU Fan".to_owned(), curve.clone())]),
    };
    vec![
        entry("Simulated Notebook 15", MODEL, "fancy"),
        entry("Simulated Notebook 14", "Simulated Notebook 14", "fancy"),
        entry("Acer Nitro 5", "Acer Nitro AN515-54", "community"),
        entry("Dell XPS 13", "Dell XPS 13 9310", "community"),
    ]
}

/// In-process stand-in for the fan-control service.
pub struct Simulator {
    backend: LocalBackend,
}

impl Simulator {
    pub fn new(settings: SimulatorSettings) -> Self {
        let backend = LocalBackend::new();
        let state = Arc::new(Mutex::new(SimState {
            started: Instant::now(),
            poll_interval_ms: settings.poll_interval_ms,
            config: MODEL.to_owned(),
            auto: true,
            target_speeds: vec![0.0; usize::from(settings.fans.max(1))],
        }));
        let emitter = backend.emitter();

        let read = |f: fn(&SimState) -> Value| {
            let state = Arc::clone(&state);
            move |_: Value| {
                Ok::<_, BackendError>(f(&state.lock().unwrap_or_else(PoisonError::into_inner)))
            }
        };
        backend.on(BackendCommand::GetPollInterval, read(|s| json!(s.poll_interval_ms)));
        backend.on(BackendCommand::GetTemps, read(|s| json!(s.temperatures())));
        backend.on(BackendCommand::GetSpeeds, read(|s| json!(s.speeds())));
        backend.on(BackendCommand::GetCritical, read(|s| json!(s.critical())));
        backend.on(BackendCommand::GetConfig, read(|s| json!(s.config)));
        backend.on(BackendCommand::GetNames, read(|s| json!(s.names())));
        backend.on(BackendCommand::GetTargetSpeeds, read(|s| json!(s.target_speeds)));
        backend.on(BackendCommand::GetAuto, read(|s| json!(s.auto)));
        backend.respond(BackendCommand::GetModel, json!(MODEL));
        backend.respond(BackendCommand::GetConfigsList, json!(configs()));

        backend.on(BackendCommand::SetTargetSpeed, {
            let state = Arc::clone(&state);
            let emitter = emitter.clone();
            move |args| {
                let (index, speed) = speed_args(&args)?;
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                let slot = state.target_speeds.get_mut(index).ok_or_else(|| {
                    BackendError::new("InvalidFan", format!("no fan at index {index}"), false)
                })?;
                *slot = speed;
                emitter.emit(BackendEvent::TargetSpeedsChange, json!(state.target_speeds));
                Ok(Value::Null)
            }
        });

        backend.on(BackendCommand::SetAuto, {
            let state = Arc::clone(&state);
            let emitter = emitter.clone();
            move |args| {
                let auto = args["auto"].as_bool().ok_or_else(|| invalid_args(&args))?;
                state.lock().unwrap_or_else(PoisonError::into_inner).auto = auto;
                emitter.emit(BackendEvent::AutoChange, json!(auto));
                Ok(Value::Null)
            }
        });

        backend.on(BackendCommand::SetConfig, {
            let state = Arc::clone(&state);
            move |args| {
                let name = args["config"].as_str().ok_or_else(|| invalid_args(&args))?;
                if !configs().iter().any(|c| c.name == name) {
                    return Err(BackendError::new(
                        "ConfigNotFound",
                        format!("no configuration named '{name}'"),
                        true,
                    ));
                }
                state.lock().unwrap_or_else(PoisonError::into_inner).config = name.to_owned();
                emitter.emit(BackendEvent::ConfigChange, json!(name));
                Ok(Value::Null)
            }
        });

        Self { backend }
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::new(self.backend.clone())
    }
}

fn speed_args(args: &Value) -> Result<(usize, f64), BackendError> {
    let index = args["index"]
        .as_u64()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| invalid_args(args))?;
    let speed = args["speed"].as_f64().ok_or_else(|| invalid_args(args))?;
    Ok((index, speed))
}

fn invalid_args(args: &Value) -> BackendError {
    BackendError::new("InvalidArguments", format!("unexpected arguments {args}"), false)
}
