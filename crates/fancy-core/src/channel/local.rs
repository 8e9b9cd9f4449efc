// ── In-process backend ──
//
// A `Backend` whose commands are answered by registered closures and whose
// events are emitted by hand. Used by the simulated service and by tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use super::{Backend, BackendCommand, BackendEvent, EventSubscription};
use crate::error::{BackendError, ChannelError};

type Handler = Arc<dyn Fn(Value) -> Result<Value, BackendError> + Send + Sync>;

struct Registration {
    id: u64,
    tx: mpsc::UnboundedSender<Value>,
}

#[derive(Default)]
struct LocalInner {
    handlers: DashMap<BackendCommand, Handler>,
    listeners: DashMap<BackendEvent, Vec<Registration>>,
    refused: DashMap<BackendEvent, String>,
    calls: DashMap<BackendCommand, Vec<Value>>,
    next_id: AtomicU64,
}

impl LocalInner {
    fn emit(&self, event: BackendEvent, payload: &Value) -> usize {
        let Some(mut registrations) = self.listeners.get_mut(&event) else {
            return 0;
        };
        registrations.retain(|r| !r.tx.is_closed());
        let delivered = registrations
            .iter()
            .filter(|r| r.tx.send(payload.clone()).is_ok())
            .count();
        trace!(%event, delivered, "emitted");
        delivered
    }
}

/// In-process [`Backend`].
///
/// Cloning yields another handle to the same registries.
#[derive(Clone, Default)]
pub struct LocalBackend {
    inner: Arc<LocalInner>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `handler`, replacing any previous handler.
    pub fn on<F>(&self, command: BackendCommand, handler: F)
    where
        F: Fn(Value) -> Result<Value, BackendError> + Send + Sync + 'static,
    {
        self.inner.handlers.insert(command, Arc::new(handler));
    }

    /// Answer `command` with a fixed value.
    pub fn respond(&self, command: BackendCommand, value: Value) {
        self.on(command, move |_| Ok(value.clone()));
    }

    /// Reject every call to `command` with `error`.
    pub fn fail(&self, command: BackendCommand, error: BackendError) {
        self.on(command, move |_| Err(error.clone()));
    }

    /// Deliver `payload` to every live registration for `event`.
    ///
    /// Returns the number of listeners reached.
    pub fn emit(&self, event: BackendEvent, payload: Value) -> usize {
        self.inner.emit(event, &payload)
    }

    /// Handle that can emit events without keeping the backend alive.
    ///
    /// Handlers use it to announce their own side effects.
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Make every future registration for `event` fail.
    pub fn refuse_listen(&self, event: BackendEvent, reason: impl Into<String>) {
        self.inner.refused.insert(event, reason.into());
    }

    pub fn accept_listen(&self, event: BackendEvent) {
        self.inner.refused.remove(&event);
    }

    /// Number of live registrations for `event`.
    pub fn listener_count(&self, event: BackendEvent) -> usize {
        self.inner.listeners.get(&event).map_or(0, |r| r.len())
    }

    /// Arguments of every call to `command`, in call order.
    pub fn calls(&self, command: BackendCommand) -> Vec<Value> {
        self.inner
            .calls
            .get(&command)
            .map(|c| c.value().clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self, command: BackendCommand) -> usize {
        self.inner.calls.get(&command).map_or(0, |c| c.len())
    }
}

impl Backend for LocalBackend {
    fn invoke(
        &self,
        command: BackendCommand,
        args: Value,
    ) -> BoxFuture<'static, Result<Value, ChannelError>> {
        self.inner
            .calls
            .entry(command)
            .or_default()
            .push(args.clone());
        let handler = self
            .inner
            .handlers
            .get(&command)
            .map(|h| Arc::clone(h.value()));

        Box::pin(async move {
            let Some(handler) = handler else {
                return Err(ChannelError::UnknownCommand(command));
            };
            handler(args).map_err(|source| ChannelError::Rejected { command, source })
        })
    }

    fn listen(
        &self,
        event: BackendEvent,
    ) -> BoxFuture<'static, Result<EventSubscription, ChannelError>> {
        let inner = Arc::clone(&self.inner);

        Box::pin(async move {
            if let Some(reason) = inner.refused.get(&event).map(|r| r.value().clone()) {
                return Err(ChannelError::ListenRefused { event, reason });
            }

            let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = mpsc::unbounded_channel();
            inner
                .listeners
                .entry(event)
                .or_default()
                .push(Registration { id, tx });
            trace!(%event, id, "listener registered");

            let registry = Arc::downgrade(&inner);
            Ok(EventSubscription::new(event, rx, move || {
                if let Some(inner) = registry.upgrade() {
                    if let Some(mut registrations) = inner.listeners.get_mut(&event) {
                        registrations.retain(|r| r.id != id);
                    }
                    trace!(%event, id, "listener released");
                }
            }))
        })
    }
}

/// Weak event handle onto a [`LocalBackend`].
#[derive(Clone)]
pub struct EventEmitter {
    inner: Weak<LocalInner>,
}

impl EventEmitter {
    /// Same as [`LocalBackend::emit`]; a no-op once the backend is gone.
    pub fn emit(&self, event: BackendEvent, payload: Value) -> usize {
        self.inner
            .upgrade()
            .map_or(0, |inner| inner.emit(event, &payload))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::channel::fetch;

    #[tokio::test]
    async fn unknown_command_is_an_error() {
        let backend = LocalBackend::new();
        let err = backend
            .invoke(BackendCommand::GetTemps, Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownCommand(BackendCommand::GetTemps)));
        assert_eq!(backend.call_count(BackendCommand::GetTemps), 1);
    }

    #[tokio::test]
    async fn fetch_decodes_registered_response() {
        let backend = LocalBackend::new();
        backend.respond(BackendCommand::GetSpeeds, json!([40.0, 55.5]));
        let speeds: Vec<f64> = fetch(&backend, BackendCommand::GetSpeeds).await.unwrap();
        assert_eq!(speeds, vec![40.0, 55.5]);
    }

    #[tokio::test]
    async fn rejection_carries_backend_error() {
        let backend = LocalBackend::new();
        backend.fail(
            BackendCommand::SetAuto,
            BackendError::new("ServiceError", "not permitted", true),
        );
        let err = backend
            .invoke(BackendCommand::SetAuto, json!({ "auto": true }))
            .await
            .unwrap_err();
        assert_eq!(err.backend_critical(), Some(true));
        assert_eq!(backend.calls(BackendCommand::SetAuto), vec![json!({ "auto": true })]);
    }

    #[tokio::test]
    async fn every_registration_receives_every_payload() {
        let backend = LocalBackend::new();
        let mut first = backend.listen(BackendEvent::AutoChange).await.unwrap();
        let mut second = backend.listen(BackendEvent::AutoChange).await.unwrap();

        assert_eq!(backend.emit(BackendEvent::AutoChange, json!(true)), 2);
        assert_eq!(first.next().await, Some(json!(true)));
        assert_eq!(second.next().await, Some(json!(true)));

        drop(first);
        assert_eq!(backend.listener_count(BackendEvent::AutoChange), 1);
        second.release();
        assert_eq!(backend.listener_count(BackendEvent::AutoChange), 0);
        assert_eq!(backend.emit(BackendEvent::AutoChange, json!(false)), 0);
    }

    #[tokio::test]
    async fn refused_registration_fails() {
        let backend = LocalBackend::new();
        backend.refuse_listen(BackendEvent::ProxyError, "proxy offline");
        let err = backend.listen(BackendEvent::ProxyError).await.unwrap_err();
        assert!(matches!(err, ChannelError::ListenRefused { .. }));

        backend.accept_listen(BackendEvent::ProxyError);
        assert!(backend.listen(BackendEvent::ProxyError).await.is_ok());
    }

    #[test]
    fn emitter_outliving_backend_is_inert() {
        let backend = LocalBackend::new();
        let emitter = backend.emitter();
        drop(backend);
        assert_eq!(emitter.emit(BackendEvent::ConfigChange, json!("x")), 0);
    }
}
