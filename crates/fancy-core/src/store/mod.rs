// ── Reactive state store ──
//
// Owner-side reactive values and the sources that keep them in sync with
// the backend: push subscriptions, the polling engine, and the `FanStore`
// container that wires them together.

mod fan_store;
mod poll;
mod push;
pub(crate) mod reactive;

pub use fan_store::FanStore;
pub use poll::PollSource;
pub use push::{EventMode, PushSource};
pub use reactive::{Reactive, Source, ValueSink};
