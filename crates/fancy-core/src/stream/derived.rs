// ── Derived aggregates ──
//
// Pure functions over one or two reactive values. The result is memoized
// against the input versions, so a read recomputes only when an input
// moved and is always consistent with the inputs' current values.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures_util::future::select_all;
use tokio::sync::watch;

use super::ValueStream;

struct Memo<T> {
    versions: Vec<u64>,
    value: Arc<T>,
}

/// A value computed from other reactive values.
///
/// Holds a subscription to each input, so the inputs stay active while the
/// derived value lives.
pub struct Derived<T: Send + Sync + 'static> {
    compute: Box<dyn Fn() -> T + Send + Sync>,
    versions: Vec<watch::Receiver<u64>>,
    memo: ArcSwapOption<Memo<T>>,
}

impl<T: Send + Sync + 'static> Derived<T> {
    pub fn from_stream<A, F>(input: ValueStream<A>, f: F) -> Self
    where
        A: Clone + Send + Sync + 'static,
        F: Fn(&A) -> T + Send + Sync + 'static,
    {
        let versions = vec![input.version_receiver()];
        Self::build(versions, move || input.with_latest(&f))
    }

    pub fn combine<A, B, F>(a: ValueStream<A>, b: ValueStream<B>, f: F) -> Self
    where
        A: Clone + Send + Sync + 'static,
        B: Clone + Send + Sync + 'static,
        F: Fn(&A, &B) -> T + Send + Sync + 'static,
    {
        let versions = vec![a.version_receiver(), b.version_receiver()];
        Self::build(versions, move || a.with_latest(|x| b.with_latest(|y| f(x, y))))
    }

    fn build(
        versions: Vec<watch::Receiver<u64>>,
        compute: impl Fn() -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            compute: Box::new(compute),
            versions,
            memo: ArcSwapOption::empty(),
        }
    }

    /// The value for the inputs' current state.
    pub fn get(&self) -> Arc<T> {
        let versions: Vec<u64> = self.versions.iter().map(|rx| *rx.borrow()).collect();
        let cached = self.memo.load_full().filter(|m| m.versions == versions);
        if let Some(memo) = cached {
            return Arc::clone(&memo.value);
        }

        let value = Arc::new((self.compute)());
        self.memo.store(Some(Arc::new(Memo {
            versions,
            value: Arc::clone(&value),
        })));
        value
    }

    /// Wait until any input changes, then return the recomputed value.
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        {
            let waits = self.versions.iter_mut().map(|rx| Box::pin(rx.changed()));
            let (result, _, _) = select_all(waits).await;
            result.ok()?;
        }
        for rx in &mut self.versions {
            rx.borrow_and_update();
        }
        Some(self.get())
    }
}
