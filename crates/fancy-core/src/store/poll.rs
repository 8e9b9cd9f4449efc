// ── Polling engine ──
//
// Values the backend does not push (temperatures, speeds, critical flag)
// are fetched on a timer whose period follows the shared poll-interval
// value. Exactly one timer is live per activation; a period change drops
// it and starts a new one a full period later.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::push::refresh;
use super::reactive::{Reactive, Source, ValueSink};
use crate::channel::{Backend, BackendCommand};
use crate::model::PollInterval;
use crate::report::ErrorLog;
use crate::stream::ValueStream;

/// Source for a value fetched with `command` on every poll tick.
pub struct PollSource {
    backend: Arc<dyn Backend>,
    errors: ErrorLog,
    command: BackendCommand,
    interval: Reactive<PollInterval>,
}

impl PollSource {
    pub fn new(
        backend: Arc<dyn Backend>,
        errors: ErrorLog,
        command: BackendCommand,
        interval: Reactive<PollInterval>,
    ) -> Self {
        Self {
            backend,
            errors,
            command,
            interval,
        }
    }
}

impl<T> Source<T> for PollSource
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn activate(&self, sink: ValueSink<T>, cancel: CancellationToken) -> BoxFuture<'static, ()> {
        let task = PollTask {
            backend: Arc::clone(&self.backend),
            errors: self.errors.clone(),
            command: self.command,
            sink,
        };
        // Observing the interval keeps it in sync while this value is polled.
        let interval = self.interval.subscribe();
        Box::pin(task.run(interval, cancel))
    }
}

struct PollTask<T: Clone + Send + Sync + 'static> {
    backend: Arc<dyn Backend>,
    errors: ErrorLog,
    command: BackendCommand,
    sink: ValueSink<T>,
}

enum Step {
    Stop,
    Retime(PollInterval),
    Fetch,
}

impl<T> PollTask<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn run(self, mut interval: ValueStream<PollInterval>, cancel: CancellationToken) {
        let mut current = interval.latest();
        let mut timer = arm(current);
        debug!(value = self.sink.name(), interval = %current, "polling started");

        loop {
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => Step::Stop,
                next = interval.changed() => next.map_or(Step::Stop, Step::Retime),
                () = tick(&mut timer) => Step::Fetch,
            };

            match step {
                Step::Stop => break,
                // A refetch that reports the same period keeps the running timer.
                Step::Retime(next) if next == current => {
                    trace!(value = self.sink.name(), interval = %next, "poll interval unchanged");
                }
                Step::Retime(next) => {
                    current = next;
                    debug!(value = self.sink.name(), interval = %next, "poll interval changed");
                    timer = arm(next);
                }
                Step::Fetch => {
                    trace!(value = self.sink.name(), "poll tick");
                    self.spawn_fetch();
                }
            }
        }
        debug!(value = self.sink.name(), "polling stopped");
    }

    /// Fetches are not awaited: they may overlap, the last to resolve wins.
    fn spawn_fetch(&self) {
        let backend = Arc::clone(&self.backend);
        let errors = self.errors.clone();
        let command = self.command;
        let sink = self.sink.clone();
        tokio::spawn(async move {
            refresh(&*backend, &errors, command, &sink).await;
        });
    }
}

/// A timer whose first tick lands one full period from now.
fn arm(interval: PollInterval) -> Option<Interval> {
    let period = interval.period()?;
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
