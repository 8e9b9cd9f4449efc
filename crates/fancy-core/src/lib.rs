//! Client-side state synchronization for the fancy fan-control front end.
//!
//! This crate mirrors what the fan-control service exposes (temperatures,
//! fan speeds, the active configuration, auto mode, errors) as reactive
//! values and forwards user commands back to it:
//!
//! - **[`FanStore`]**: Container constructed once at startup and passed to
//!   every consumer. Owns the reactive values, the [`ErrorLog`], the derived
//!   aggregates and the [`Dispatcher`].
//!
//! - **[`Reactive<T>`]**: A single value in a `watch` channel. Its
//!   [`Source`] only runs while someone holds a [`ValueStream<T>`]; the last
//!   subscriber leaving releases the backend listeners and timers.
//!
//! - **[`Derived<T>`]**: Pure computations over one or two streams,
//!   recomputed when an input changes.
//!
//! - **[`Backend`]**: The opaque command/event channel. [`LocalBackend`]
//!   is the in-process implementation used by tests and the simulator.

pub mod aggregate;
pub mod channel;
pub mod command;
pub mod config;
pub mod editor;
pub mod error;
pub mod matcher;
pub mod model;
pub mod report;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────
pub use channel::{
    Backend, BackendCommand, BackendEvent, EventEmitter, EventSubscription, LocalBackend, fetch,
};
pub use command::{Dispatcher, InvalidCommand, PendingCommand};
pub use config::SyncConfig;
pub use error::{BackendError, ChannelError};
pub use report::{AppError, ErrorList, ErrorLog, ErrorReport};
pub use store::{FanStore, Reactive, Source, ValueSink};
pub use stream::{Derived, ValueStream, ValueWatchStream};

// ── Domain re-exports ───────────────────────────────────────────
pub use aggregate::mean_temperature;
pub use editor::{ConfigDraftHeader, FanDraft, FanListDraft};
pub use matcher::{ConfigMatch, ConfigMatcher, similarity};
pub use model::{ConfigInfo, FanSpeeds, PollInterval, TemperatureThreshold, Temperatures};
