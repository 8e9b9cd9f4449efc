// ── Error aggregation ──
//
// Append-only log of every failure the synchronization layer sees: local
// reports, failed backend calls, and the backend's own error events.
// Entries are never removed or deduplicated.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, join_all};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::channel::{Backend, BackendEvent, EventSubscription, decode};
use crate::error::{BackendError, ChannelError};
use crate::store::{Reactive, Source, ValueSink};
use crate::stream::{Derived, ValueStream};

/// Name given to reports that do not provide one.
pub const DEFAULT_ERROR_NAME: &str = "AppError";

/// One immutable entry of the error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppError {
    pub name: String,
    pub message: String,
    pub fatal: bool,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | {}{}",
            self.timestamp.format("%H:%M:%S"),
            self.name,
            if self.fatal { "fatal: " } else { "" },
            self.message
        )
    }
}

/// Builder for a log entry. Defaults: name `AppError`, fatal, now.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    name: String,
    message: String,
    fatal: bool,
    timestamp: Option<DateTime<Utc>>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_ERROR_NAME.to_owned(),
            message: message.into(),
            fatal: true,
            timestamp: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Report for an error event payload; severity is the backend's.
    pub fn from_backend(err: BackendError) -> Self {
        Self::new(err.message).name(err.name).fatal(err.critical)
    }

    /// Report for a failed call or registration. The backend's declared
    /// severity wins over `default_fatal`.
    pub fn from_channel_error(err: &ChannelError, default_fatal: bool) -> Self {
        Self::new(err.to_string())
            .name(err.record_name())
            .fatal(err.backend_critical().unwrap_or(default_fatal))
    }

    fn into_record(self) -> Arc<AppError> {
        let record = AppError {
            name: self.name,
            message: self.message,
            fatal: self.fatal,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        };
        if record.fatal {
            error!(name = %record.name, "{}", record.message);
        } else {
            warn!(name = %record.name, "{}", record.message);
        }
        Arc::new(record)
    }
}

/// Snapshot of the log, oldest first.
pub type ErrorList = Arc<Vec<Arc<AppError>>>;

/// The shared error log.
///
/// Subscribing activates listeners for every backend error event; reports
/// made directly through [`report`](Self::report) are always recorded.
#[derive(Clone)]
pub struct ErrorLog {
    entries: Reactive<ErrorList>,
}

impl ErrorLog {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            entries: Reactive::new("errors", ErrorList::default(), ErrorEvents { backend }),
        }
    }

    /// A log that only records local reports.
    pub fn detached() -> Self {
        Self {
            entries: Reactive::writable("errors", ErrorList::default()),
        }
    }

    /// Record `message` with the default name, fatal, timestamped now.
    pub fn report(&self, message: impl Into<String>) -> Arc<AppError> {
        self.submit(ErrorReport::new(message))
    }

    pub fn submit(&self, report: ErrorReport) -> Arc<AppError> {
        let record = report.into_record();
        self.entries
            .update(|list| Arc::make_mut(list).push(Arc::clone(&record)));
        record
    }

    pub(crate) fn report_channel_error(&self, err: &ChannelError, default_fatal: bool) {
        self.submit(ErrorReport::from_channel_error(err, default_fatal));
    }

    pub fn entries(&self) -> ErrorList {
        self.entries.get()
    }

    /// The most recent entry; `None` only while the log is empty.
    pub fn last(&self) -> Option<Arc<AppError>> {
        self.entries.get().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.get().is_empty()
    }

    /// Observe the log and keep the backend error listeners registered.
    pub fn subscribe(&self) -> ValueStream<ErrorList> {
        self.entries.subscribe()
    }

    /// The most recent entry as a derived value.
    pub fn last_error(&self) -> Derived<Option<Arc<AppError>>> {
        self.subscribe().map(|list| list.last().cloned())
    }
}

fn record(sink: &ValueSink<ErrorList>, report: ErrorReport) {
    let record = report.into_record();
    sink.update(|list| Arc::make_mut(list).push(record));
}

/// Source feeding the log from the backend's error events.
struct ErrorEvents {
    backend: Arc<dyn Backend>,
}

impl Source<ErrorList> for ErrorEvents {
    fn activate(
        &self,
        sink: ValueSink<ErrorList>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, ()> {
        let backend = Arc::clone(&self.backend);

        Box::pin(async move {
            let pumps = BackendEvent::ERRORS.into_iter().map(|event| {
                let backend = Arc::clone(&backend);
                let sink = sink.clone();
                let cancel = cancel.clone();
                async move {
                    let registration = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return,
                        result = backend.listen(event) => result,
                    };
                    match registration {
                        Ok(subscription) => pump(subscription, &sink, &cancel).await,
                        Err(e) => record(&sink, ErrorReport::from_channel_error(&e, false)),
                    }
                }
            });
            join_all(pumps).await;
        })
    }
}

async fn pump(
    mut subscription: EventSubscription,
    sink: &ValueSink<ErrorList>,
    cancel: &CancellationToken,
) {
    let event = subscription.event();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            payload = subscription.next() => {
                let Some(payload) = payload else {
                    debug!(%event, "error event channel closed");
                    break;
                };
                let report = match decode::<BackendError>(event.as_ref(), payload) {
                    Ok(err) => ErrorReport::from_backend(err),
                    Err(e) => ErrorReport::from_channel_error(&e, false),
                };
                record(sink, report);
            }
        }
    }
    subscription.release();
}
