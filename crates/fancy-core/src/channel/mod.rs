// ── Command/event channel ──
//
// The fan-control service is opaque: request/response calls addressed by
// command name, and push notifications addressed by event name. Everything
// in this crate reaches it through the `Backend` trait.

mod local;

use std::fmt;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};
use tokio::sync::mpsc;

use crate::error::ChannelError;

pub use local::{EventEmitter, LocalBackend};

/// Request/response operations exposed by the backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum BackendCommand {
    GetPollInterval,
    GetTemps,
    GetSpeeds,
    GetConfig,
    SetConfig,
    GetCritical,
    GetNames,
    GetTargetSpeeds,
    SetTargetSpeed,
    GetAuto,
    SetAuto,
    GetConfigsList,
    GetModel,
}

/// Push notifications emitted by the backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum BackendEvent {
    ConfigChange,
    AutoChange,
    TargetSpeedsChange,
    ConnectionError,
    ProxyError,
    DeserializeError,
}

impl BackendEvent {
    /// Events whose payload is a [`BackendError`](crate::BackendError).
    pub const ERRORS: [Self; 3] = [
        Self::ConnectionError,
        Self::ProxyError,
        Self::DeserializeError,
    ];

    pub fn is_error(self) -> bool {
        Self::ERRORS.contains(&self)
    }
}

/// Transport to the fan-control service.
///
/// Both methods return boxed futures so the trait stays object safe; the
/// store holds the backend as `Arc<dyn Backend>`.
pub trait Backend: Send + Sync + 'static {
    /// Call `command` with `args` (`Value::Null` when it takes none).
    fn invoke(
        &self,
        command: BackendCommand,
        args: Value,
    ) -> BoxFuture<'static, Result<Value, ChannelError>>;

    /// Register a listener for `event`.
    fn listen(&self, event: BackendEvent)
    -> BoxFuture<'static, Result<EventSubscription, ChannelError>>;
}

/// A live listener registration.
///
/// Payloads are delivered in emission order. The registration is released
/// exactly once, either by [`release`](Self::release) or on drop.
pub struct EventSubscription {
    event: BackendEvent,
    payloads: mpsc::UnboundedReceiver<Value>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl EventSubscription {
    pub fn new(
        event: BackendEvent,
        payloads: mpsc::UnboundedReceiver<Value>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            event,
            payloads,
            release: Some(Box::new(release)),
        }
    }

    pub fn event(&self) -> BackendEvent {
        self.event
    }

    /// Wait for the next payload. `None` once the backend side is gone.
    pub async fn next(&mut self) -> Option<Value> {
        self.payloads.recv().await
    }

    /// Unregister the listener.
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("event", &self.event)
            .field("released", &self.release.is_none())
            .finish_non_exhaustive()
    }
}

/// Invoke a no-argument command and decode its response.
pub async fn fetch<T: DeserializeOwned>(
    backend: &dyn Backend,
    command: BackendCommand,
) -> Result<T, ChannelError> {
    let raw = backend.invoke(command, Value::Null).await?;
    decode(command.as_ref(), raw)
}

/// Decode a payload received from `origin` (a command or event name).
pub fn decode<T: DeserializeOwned>(origin: &str, raw: Value) -> Result<T, ChannelError> {
    serde_json::from_value(raw).map_err(|source| ChannelError::Decode {
        origin: origin.to_owned(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn wire_names_are_snake_case() {
        assert_eq!(BackendCommand::GetPollInterval.as_ref(), "get_poll_interval");
        assert_eq!(BackendCommand::GetConfigsList.to_string(), "get_configs_list");
        assert_eq!(BackendEvent::TargetSpeedsChange.as_ref(), "target_speeds_change");
        assert_eq!(
            BackendCommand::from_str("set_target_speed").unwrap(),
            BackendCommand::SetTargetSpeed
        );
    }

    #[test]
    fn only_error_events_are_flagged() {
        assert!(BackendEvent::ProxyError.is_error());
        assert!(BackendEvent::DeserializeError.is_error());
        assert!(!BackendEvent::ConfigChange.is_error());
    }

    #[test]
    fn decode_reports_origin() {
        let err = decode::<Vec<f64>>("get_speeds", serde_json::json!("oops")).unwrap_err();
        assert!(matches!(err, ChannelError::Decode { ref origin, .. } if origin == "get_speeds"));
    }

    #[test]
    fn dropping_subscription_runs_release_once() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let released = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = mpsc::unbounded_channel();
        let counter = Arc::clone(&released);
        let sub = EventSubscription::new(BackendEvent::AutoChange, rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
