// ── Command dispatch ──
//
// User mutations are validated synchronously into a `PendingCommand`, then
// sent fire-and-forget. The caller never sees the result: the new state
// comes back through the push/poll path and failures land in the error log.

use std::sync::Arc;

use serde_json::{Value, json};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channel::{Backend, BackendCommand};
use crate::report::{ErrorLog, ErrorReport};

pub const MIN_SPEED: f64 = 0.0;
pub const MAX_SPEED: f64 = 100.0;

/// A command validated and ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub command: BackendCommand,
    pub args: Value,
}

/// A mutation rejected before reaching the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCommand {
    #[error("target speed for fan {index} is not a number")]
    SpeedNotANumber { index: u8 },
}

impl PendingCommand {
    /// Target speed for fan `index`, clamped to `[0, 100]`.
    pub fn set_target_speed(index: u8, speed: f64) -> Result<Self, InvalidCommand> {
        if speed.is_nan() {
            return Err(InvalidCommand::SpeedNotANumber { index });
        }
        let speed = speed.clamp(MIN_SPEED, MAX_SPEED);
        Ok(Self {
            command: BackendCommand::SetTargetSpeed,
            args: json!({ "index": index, "speed": speed }),
        })
    }

    /// `None` when the auto mode is not known yet.
    pub fn set_auto(auto: Option<bool>) -> Option<Self> {
        auto.map(|auto| Self {
            command: BackendCommand::SetAuto,
            args: json!({ "auto": auto }),
        })
    }

    pub fn set_config(name: impl Into<String>) -> Self {
        Self {
            command: BackendCommand::SetConfig,
            args: json!({ "config": name.into() }),
        }
    }
}

/// Sends commands to the backend without waiting for them.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn Backend>,
    errors: ErrorLog,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn Backend>, errors: ErrorLog) -> Self {
        Self { backend, errors }
    }

    /// Spawn the call. The handle may be dropped; a rejection is recorded
    /// as fatal unless the backend declared it otherwise.
    pub fn dispatch(&self, pending: PendingCommand) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let errors = self.errors.clone();
        debug!(command = %pending.command, args = %pending.args, "dispatching");

        tokio::spawn(async move {
            let PendingCommand { command, args } = pending;
            if let Err(e) = backend.invoke(command, args).await {
                debug!(%command, error = %e, "command failed");
                errors.report_channel_error(&e, true);
            }
        })
    }

    /// `None` when the speed was rejected locally; the rejection is logged
    /// as a non-fatal error and nothing is sent.
    pub fn set_target_speed(&self, index: u8, speed: f64) -> Option<JoinHandle<()>> {
        match PendingCommand::set_target_speed(index, speed) {
            Ok(pending) => Some(self.dispatch(pending)),
            Err(e) => {
                self.errors.submit(
                    ErrorReport::new(e.to_string())
                        .name("ValidationError")
                        .fatal(false),
                );
                None
            }
        }
    }

    /// `None` (and nothing sent) when `auto` is unknown.
    pub fn set_auto(&self, auto: Option<bool>) -> Option<JoinHandle<()>> {
        PendingCommand::set_auto(auto).map(|pending| self.dispatch(pending))
    }

    pub fn set_config(&self, name: impl Into<String>) -> JoinHandle<()> {
        self.dispatch(PendingCommand::set_config(name))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::channel::LocalBackend;
    use crate::error::BackendError;

    fn speed_of(pending: &PendingCommand) -> f64 {
        pending.args["speed"].as_f64().unwrap()
    }

    #[test]
    fn speeds_are_clamped() {
        for (input, expected) in [
            (-10.0, 0.0),
            (0.0, 0.0),
            (42.5, 42.5),
            (50.0, 50.0),
            (100.0, 100.0),
            (150.0, 100.0),
            (f64::INFINITY, 100.0),
            (f64::NEG_INFINITY, 0.0),
        ] {
            let pending = PendingCommand::set_target_speed(1, input).unwrap();
            assert_eq!(speed_of(&pending), expected, "input {input}");
            assert_eq!(pending.args["index"], json!(1));
        }
    }

    #[test]
    fn nan_speed_is_rejected() {
        assert_eq!(
            PendingCommand::set_target_speed(0, f64::NAN),
            Err(InvalidCommand::SpeedNotANumber { index: 0 })
        );
    }

    #[test]
    fn unknown_auto_is_not_dispatched() {
        assert_eq!(PendingCommand::set_auto(None), None);
        assert_eq!(
            PendingCommand::set_auto(Some(false)).unwrap().args,
            json!({ "auto": false })
        );
    }

    fn dispatcher() -> (LocalBackend, Dispatcher, ErrorLog) {
        let local = LocalBackend::new();
        let errors = ErrorLog::detached();
        let dispatcher = Dispatcher::new(Arc::new(local.clone()), errors.clone());
        (local, dispatcher, errors)
    }

    #[tokio::test]
    async fn dispatch_sends_clamped_speed() {
        let (local, dispatcher, errors) = dispatcher();
        local.respond(BackendCommand::SetTargetSpeed, Value::Null);

        dispatcher.set_target_speed(2, 150.0).unwrap().await.unwrap();
        assert_eq!(
            local.calls(BackendCommand::SetTargetSpeed),
            vec![json!({ "index": 2, "speed": 100.0 })]
        );
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn nan_never_reaches_backend() {
        let (local, dispatcher, errors) = dispatcher();
        assert!(dispatcher.set_target_speed(0, f64::NAN).is_none());
        assert_eq!(local.call_count(BackendCommand::SetTargetSpeed), 0);

        let record = errors.last().unwrap();
        assert_eq!(record.name, "ValidationError");
        assert!(!record.fatal);
    }

    #[tokio::test]
    async fn rejected_command_is_fatal_by_default() {
        let (local, dispatcher, errors) = dispatcher();
        dispatcher.set_auto(Some(true)).unwrap().await.unwrap();

        let record = errors.last().unwrap();
        assert_eq!(record.name, "UnknownCommand");
        assert!(record.fatal);
        assert_eq!(local.calls(BackendCommand::SetAuto), vec![json!({ "auto": true })]);
    }

    #[tokio::test]
    async fn backend_severity_overrides_default() {
        let (local, dispatcher, errors) = dispatcher();
        local.fail(
            BackendCommand::SetConfig,
            BackendError::new("ConfigNotFound", "no config named Foo", false),
        );
        dispatcher.set_config("Foo").await.unwrap();

        let record = errors.last().unwrap();
        assert_eq!(record.name, "ConfigNotFound");
        assert!(!record.fatal);
        assert_eq!(local.calls(BackendCommand::SetConfig), vec![json!({ "config": "Foo" })]);
    }

    #[tokio::test]
    async fn dropped_handle_still_runs() {
        let (local, dispatcher, _errors) = dispatcher();
        local.respond(BackendCommand::SetAuto, Value::Null);
        drop(dispatcher.set_auto(Some(false)));
        tokio::task::yield_now().await;
        assert_eq!(local.call_count(BackendCommand::SetAuto), 1);
    }
}
