// ── Reactive value streams ──
//
// Subscription handles for consuming a reactive value. A handle counts as
// one subscriber for as long as it (or the `Stream` made from it) lives.

mod derived;

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::reactive::SubscriberGuard;

pub use derived::Derived;

/// A subscription to one reactive value.
///
/// Provides both point-in-time access and change notification via
/// [`changed`](Self::changed) or by converting to a `Stream`.
pub struct ValueStream<T: Clone + Send + Sync + 'static> {
    current: T,
    receiver: watch::Receiver<T>,
    version: watch::Receiver<u64>,
    guard: SubscriberGuard<T>,
}

impl<T: Clone + Send + Sync + 'static> ValueStream<T> {
    pub(crate) fn new(
        receiver: watch::Receiver<T>,
        version: watch::Receiver<u64>,
        guard: SubscriberGuard<T>,
    ) -> Self {
        let current = receiver.borrow().clone();
        Self {
            current,
            receiver,
            version,
            guard,
        }
    }

    /// The value captured at creation or by the last `changed()`.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// The latest value (may have changed since creation).
    pub fn latest(&self) -> T {
        self.receiver.borrow().clone()
    }

    /// Run `f` against the latest value without cloning it.
    pub fn with_latest<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.receiver.borrow())
    }

    /// Update counter of the underlying value.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Wait for the next update, returning the new value.
    /// Returns `None` if the underlying channel is closed.
    pub async fn changed(&mut self) -> Option<T> {
        self.receiver.changed().await.ok()?;
        let value = self.receiver.borrow_and_update().clone();
        self.current = value.clone();
        Some(value)
    }

    /// Derive a value from this stream.
    pub fn map<U, F>(self, f: F) -> Derived<U>
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        Derived::from_stream(self, f)
    }

    pub(crate) fn version_receiver(&self) -> watch::Receiver<u64> {
        self.version.clone()
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    ///
    /// The stream yields the current value first, then every change.
    pub fn into_stream(self) -> ValueWatchStream<T> {
        ValueWatchStream {
            inner: WatchStream::new(self.receiver),
            _guard: self.guard,
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for ValueStream<T> {
    fn clone(&self) -> Self {
        Self {
            current: self.current.clone(),
            receiver: self.receiver.clone(),
            version: self.version.clone(),
            guard: self.guard.duplicate(),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct ValueWatchStream<T: Clone + Send + Sync + 'static> {
    inner: WatchStream<T>,
    _guard: SubscriberGuard<T>,
}

impl<T: Clone + Send + Sync + 'static> Stream for ValueWatchStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // WatchStream keeps its future in a ReusableBoxFuture, so it is Unpin.
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use crate::store::Reactive;

    #[tokio::test]
    async fn changed_yields_each_update() {
        let value = Reactive::writable("speeds", vec![0.0_f64]);
        let mut stream = value.subscribe();
        assert_eq!(stream.current(), &vec![0.0]);

        value.set(vec![42.0]);
        assert_eq!(stream.changed().await, Some(vec![42.0]));
        assert_eq!(stream.current(), &vec![42.0]);
        assert_eq!(stream.version(), 1);
    }

    #[tokio::test]
    async fn observers_see_the_same_value() {
        let value = Reactive::writable("model", String::from("unknown"));
        let mut a = value.subscribe();
        let mut b = a.clone();
        value.set("Acer Nitro 5".into());
        assert_eq!(a.changed().await, b.changed().await);
        assert_eq!(value.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn stream_adapter_starts_with_current_value() {
        let value = Reactive::writable("critical", false);
        let mut stream = value.subscribe().into_stream();
        assert_eq!(stream.next().await, Some(false));
        value.set(true);
        assert_eq!(stream.next().await, Some(true));
        assert_eq!(value.subscriber_count(), 1);
        drop(stream);
        assert_eq!(value.subscriber_count(), 0);
    }
}
