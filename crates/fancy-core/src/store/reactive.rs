// ── Lazily activated reactive value ──
//
// A single backend-observable quantity held in a `watch` channel. The value
// is kept in sync only while someone observes it: the first subscriber
// starts the source task, the last one to leave cancels it.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::stream::ValueStream;

/// Something that keeps a [`Reactive`] value in sync while it is observed.
pub trait Source<T: Clone + Send + Sync + 'static>: Send + Sync + 'static {
    /// Build the task that feeds `sink` until `cancel` fires.
    fn activate(&self, sink: ValueSink<T>, cancel: CancellationToken) -> BoxFuture<'static, ()>;
}

/// Owner side of a reactive value.
///
/// Cloning is cheap and every clone refers to the same value. Reads never
/// activate the source; only [`subscribe`](Self::subscribe) does.
pub struct Reactive<T: Clone + Send + Sync + 'static> {
    inner: Arc<ReactiveInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Clone for Reactive<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

pub(crate) struct ReactiveInner<T: Clone + Send + Sync + 'static> {
    name: &'static str,
    value: watch::Sender<T>,
    /// Bumped exactly once per applied update.
    version: watch::Sender<u64>,
    source: Option<Box<dyn Source<T>>>,
    activation: Mutex<Activation>,
}

#[derive(Default)]
struct Activation {
    subscribers: usize,
    cancel: Option<CancellationToken>,
}

impl<T: Clone + Send + Sync + 'static> Reactive<T> {
    /// A value kept in sync by `source` while observed.
    pub fn new(name: &'static str, initial: T, source: impl Source<T>) -> Self {
        Self::build(name, initial, Some(Box::new(source)))
    }

    /// A purely local value, written only through [`set`](Self::set).
    pub fn writable(name: &'static str, initial: T) -> Self {
        Self::build(name, initial, None)
    }

    fn build(name: &'static str, initial: T, source: Option<Box<dyn Source<T>>>) -> Self {
        let (value, _) = watch::channel(initial);
        let (version, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(ReactiveInner {
                name,
                value,
                version,
                source,
                activation: Mutex::new(Activation::default()),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Current value, without subscribing.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Number of updates applied so far.
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// Replace the value and notify every observer.
    pub fn set(&self, value: T) {
        self.inner.apply(value);
    }

    /// Modify the value in place and notify every observer.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.inner.modify(f);
    }

    /// Start observing the value.
    ///
    /// The first subscription spawns the source task, so it must be made
    /// from within a tokio runtime when the value has a source.
    pub fn subscribe(&self) -> ValueStream<T> {
        let guard = SubscriberGuard::acquire(&self.inner);
        ValueStream::new(
            self.inner.value.subscribe(),
            self.inner.version.subscribe(),
            guard,
        )
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers
    }

    /// Whether the source task is currently running.
    pub fn is_active(&self) -> bool {
        self.inner.lock().cancel.is_some()
    }

    /// Write handle that does not keep the value alive.
    pub fn sink(&self) -> ValueSink<T> {
        ValueSink {
            name: self.inner.name,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ReactiveInner<T> {
    fn apply(&self, value: T) {
        // send_replace stores the value even with zero receivers.
        self.value.send_replace(value);
        self.version.send_modify(|v| *v += 1);
    }

    fn modify(&self, f: impl FnOnce(&mut T)) {
        self.value.send_modify(f);
        self.version.send_modify(|v| *v += 1);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Activation> {
        self.activation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(self: &Arc<Self>) {
        let mut activation = self.lock();
        activation.subscribers += 1;
        if activation.subscribers > 1 {
            return;
        }
        let Some(source) = &self.source else {
            return;
        };

        let cancel = CancellationToken::new();
        let sink = ValueSink {
            name: self.name,
            inner: Arc::downgrade(self),
        };
        debug!(value = self.name, "activating");
        tokio::spawn(source.activate(sink, cancel.clone()));
        activation.cancel = Some(cancel);
    }

    fn release(&self) {
        let mut activation = self.lock();
        activation.subscribers = activation.subscribers.saturating_sub(1);
        if activation.subscribers > 0 {
            return;
        }
        if let Some(cancel) = activation.cancel.take() {
            debug!(value = self.name, "last subscriber gone, deactivating");
            cancel.cancel();
        }
    }
}

/// Counts one subscriber for as long as it lives.
pub(crate) struct SubscriberGuard<T: Clone + Send + Sync + 'static> {
    inner: Arc<ReactiveInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> SubscriberGuard<T> {
    fn acquire(inner: &Arc<ReactiveInner<T>>) -> Self {
        inner.acquire();
        Self {
            inner: Arc::clone(inner),
        }
    }

    /// A second guard on the same value.
    pub(crate) fn duplicate(&self) -> Self {
        Self::acquire(&self.inner)
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for SubscriberGuard<T> {
    fn drop(&mut self) {
        self.inner.release();
    }
}

/// Write handle given to source tasks.
///
/// Holds the value weakly: writes after the value is gone are no-ops, so a
/// fetch resolving after teardown cannot resurrect anything.
pub struct ValueSink<T: Clone + Send + Sync + 'static> {
    name: &'static str,
    inner: Weak<ReactiveInner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Clone for ValueSink<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ValueSink<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Replace the value. Returns `false` if the value no longer exists.
    pub fn set(&self, value: T) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.apply(value);
                true
            }
            None => false,
        }
    }

    /// Modify the value in place. Returns `false` if it no longer exists.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.modify(f);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Counts activations and records whether the last one was cancelled.
    struct Probe {
        activations: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
    }

    impl Source<u32> for Probe {
        fn activate(&self, sink: ValueSink<u32>, cancel: CancellationToken) -> BoxFuture<'static, ()> {
            let n = self.activations.fetch_add(1, Ordering::SeqCst);
            let stopped = Arc::clone(&self.stopped);
            Box::pin(async move {
                sink.set(u32::try_from(n).unwrap() + 100);
                cancel.cancelled().await;
                stopped.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn probed() -> (Reactive<u32>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let activations = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));
        let value = Reactive::new(
            "probe",
            0,
            Probe {
                activations: Arc::clone(&activations),
                stopped: Arc::clone(&stopped),
            },
        );
        (value, activations, stopped)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn reading_does_not_activate() {
        let (value, activations, _) = probed();
        assert_eq!(value.get(), 0);
        settle().await;
        assert_eq!(activations.load(Ordering::SeqCst), 0);
        assert!(!value.is_active());
    }

    #[tokio::test]
    async fn activates_once_for_many_subscribers() {
        let (value, activations, stopped) = probed();
        let first = value.subscribe();
        let second = value.subscribe();
        let third = second.clone();
        settle().await;

        assert_eq!(activations.load(Ordering::SeqCst), 1);
        assert_eq!(value.subscriber_count(), 3);
        assert_eq!(value.get(), 100);

        drop(first);
        drop(second);
        settle().await;
        assert!(value.is_active());
        assert_eq!(stopped.load(Ordering::SeqCst), 0);

        drop(third);
        settle().await;
        assert!(!value.is_active());
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resubscribing_reactivates() {
        let (value, activations, _) = probed();
        drop(value.subscribe());
        settle().await;
        let _again = value.subscribe();
        settle().await;
        assert_eq!(activations.load(Ordering::SeqCst), 2);
        assert_eq!(value.get(), 101);
    }

    #[test]
    fn each_update_bumps_version_once() {
        let value = Reactive::writable("local", String::new());
        value.set("a".into());
        value.update(|s| s.push('b'));
        assert_eq!(value.get(), "ab");
        assert_eq!(value.version(), 2);
    }

    #[test]
    fn sink_is_inert_after_drop() {
        let value = Reactive::writable("local", 1u8);
        let sink = value.sink();
        assert!(sink.set(2));
        drop(value);
        assert!(!sink.set(3));
    }
}
