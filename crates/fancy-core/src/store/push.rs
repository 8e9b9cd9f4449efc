// ── Push-subscribed values ──
//
// Fetch once on activation, then follow the backend's change event for as
// long as the value is observed.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::reactive::{Source, ValueSink};
use crate::channel::{Backend, BackendCommand, BackendEvent, EventSubscription, decode, fetch};
use crate::report::ErrorLog;

/// What an event payload means for the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    /// The payload is the new value.
    Replace,
    /// The payload only signals a change; fetch the value again.
    Refetch,
}

/// Source for a value fetched with `command` and optionally refreshed by
/// a backend event.
pub struct PushSource {
    backend: Arc<dyn Backend>,
    errors: ErrorLog,
    command: BackendCommand,
    event: Option<(BackendEvent, EventMode)>,
}

impl PushSource {
    /// A fetch-once source.
    pub fn new(backend: Arc<dyn Backend>, errors: ErrorLog, command: BackendCommand) -> Self {
        Self {
            backend,
            errors,
            command,
            event: None,
        }
    }

    /// Follow `event` after the initial fetch.
    pub fn on_event(mut self, event: BackendEvent, mode: EventMode) -> Self {
        self.event = Some((event, mode));
        self
    }
}

impl<T> Source<T> for PushSource
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn activate(&self, sink: ValueSink<T>, cancel: CancellationToken) -> BoxFuture<'static, ()> {
        let backend = Arc::clone(&self.backend);
        let errors = self.errors.clone();
        let command = self.command;
        let event = self.event;

        Box::pin(async move {
            let Some((event, mode)) = event else {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {}
                    () = refresh(&*backend, &errors, command, &sink) => {}
                }
                return;
            };

            // Issue the initial fetch first, register concurrently.
            let (registration, ()) = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                joined = async {
                    tokio::join!(backend.listen(event), refresh(&*backend, &errors, command, &sink))
                } => joined,
            };
            let subscription = match registration {
                Ok(subscription) => subscription,
                Err(e) => {
                    errors.report_channel_error(&e, false);
                    return;
                }
            };

            follow(subscription, mode, &*backend, &errors, command, &sink, &cancel).await;
        })
    }
}

async fn follow<T>(
    mut subscription: EventSubscription,
    mode: EventMode,
    backend: &dyn Backend,
    errors: &ErrorLog,
    command: BackendCommand,
    sink: &ValueSink<T>,
    cancel: &CancellationToken,
) where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let event = subscription.event();
    loop {
        let payload = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            payload = subscription.next() => payload,
        };
        let Some(payload) = payload else {
            debug!(value = sink.name(), %event, "event channel closed");
            break;
        };

        match mode {
            EventMode::Replace => match decode::<T>(event.as_ref(), payload) {
                Ok(value) => {
                    sink.set(value);
                }
                Err(e) => errors.report_channel_error(&e, false),
            },
            EventMode::Refetch => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = refresh(backend, errors, command, sink) => {}
                }
            }
        }
    }
    debug!(value = sink.name(), %event, "releasing listener");
    subscription.release();
}

/// Fetch `command` into `sink`, reporting a failure as non-fatal.
pub(crate) async fn refresh<T>(
    backend: &dyn Backend,
    errors: &ErrorLog,
    command: BackendCommand,
    sink: &ValueSink<T>,
) where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    match fetch::<T>(backend, command).await {
        Ok(value) => {
            sink.set(value);
        }
        Err(e) => {
            debug!(value = sink.name(), error = %e, "sync fetch failed");
            errors.report_channel_error(&e, false);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::channel::LocalBackend;
    use crate::error::BackendError;
    use crate::store::Reactive;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn fixture() -> (LocalBackend, Arc<dyn Backend>, ErrorLog) {
        let local = LocalBackend::new();
        let backend: Arc<dyn Backend> = Arc::new(local.clone());
        (local, backend, ErrorLog::detached())
    }

    #[tokio::test]
    async fn initial_fetch_then_events_replace() {
        let (local, backend, errors) = fixture();
        local.respond(BackendCommand::GetTargetSpeeds, json!([30.0, 40.0]));
        let speeds: Reactive<Vec<f64>> = Reactive::new(
            "target_speeds",
            Vec::new(),
            PushSource::new(backend, errors.clone(), BackendCommand::GetTargetSpeeds)
                .on_event(BackendEvent::TargetSpeedsChange, EventMode::Replace),
        );

        let mut observer = speeds.subscribe();
        assert_eq!(observer.changed().await, Some(vec![30.0, 40.0]));
        settle().await;
        assert_eq!(local.call_count(BackendCommand::GetTargetSpeeds), 1);
        assert_eq!(local.listener_count(BackendEvent::TargetSpeedsChange), 1);

        local.emit(BackendEvent::TargetSpeedsChange, json!([55.0, 60.0]));
        assert_eq!(observer.changed().await, Some(vec![55.0, 60.0]));
        assert_eq!(speeds.version(), 2);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn refetch_mode_calls_command_per_event() {
        let (local, backend, errors) = fixture();
        local.respond(BackendCommand::GetNames, json!(["CPU Fan"]));
        let names: Reactive<Vec<String>> = Reactive::new(
            "fans_names",
            Vec::new(),
            PushSource::new(backend, errors, BackendCommand::GetNames)
                .on_event(BackendEvent::ConfigChange, EventMode::Refetch),
        );
        let mut observer = names.subscribe();
        observer.changed().await;
        settle().await;

        local.respond(BackendCommand::GetNames, json!(["CPU Fan", "GPU Fan"]));
        local.emit(BackendEvent::ConfigChange, json!("Acer Nitro AN515-54"));
        assert_eq!(
            observer.changed().await,
            Some(vec!["CPU Fan".to_owned(), "GPU Fan".to_owned()])
        );
        assert_eq!(local.call_count(BackendCommand::GetNames), 2);
    }

    #[tokio::test]
    async fn fetch_once_value_never_registers() {
        let (local, backend, errors) = fixture();
        local.respond(BackendCommand::GetModel, json!("Dell G5"));
        let model = Reactive::new(
            "model",
            String::new(),
            PushSource::new(backend, errors, BackendCommand::GetModel),
        );
        let _a = model.subscribe();
        let _b = model.subscribe();
        settle().await;
        assert_eq!(model.get(), "Dell G5");
        assert_eq!(local.call_count(BackendCommand::GetModel), 1);
    }

    #[tokio::test]
    async fn failures_are_non_fatal_and_keep_prior_value() {
        let (local, backend, errors) = fixture();
        local.fail(
            BackendCommand::GetConfig,
            BackendError::new("ServiceError", "service stopped", false),
        );
        let config = Reactive::new(
            "config",
            String::from("previous"),
            PushSource::new(backend, errors.clone(), BackendCommand::GetConfig)
                .on_event(BackendEvent::ConfigChange, EventMode::Replace),
        );
        let _observer = config.subscribe();
        settle().await;

        local.emit(BackendEvent::ConfigChange, json!(17));
        settle().await;

        assert_eq!(config.get(), "previous");
        let entries = errors.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "ServiceError");
        assert_eq!(entries[1].name, "DecodeError");
        assert!(entries.iter().all(|e| !e.fatal));
    }

    #[tokio::test]
    async fn refused_registration_keeps_fetched_value() {
        let (local, backend, errors) = fixture();
        local.respond(BackendCommand::GetAuto, json!(true));
        local.refuse_listen(BackendEvent::AutoChange, "events unavailable");
        let auto: Reactive<Option<bool>> = Reactive::new(
            "auto",
            None,
            PushSource::new(backend, errors.clone(), BackendCommand::GetAuto)
                .on_event(BackendEvent::AutoChange, EventMode::Replace),
        );
        let _observer = auto.subscribe();
        settle().await;

        assert_eq!(auto.get(), Some(true));
        assert_eq!(errors.last().unwrap().name, "ListenError");
        assert!(!errors.last().unwrap().fatal);
    }
}
