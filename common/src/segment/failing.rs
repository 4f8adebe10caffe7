use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;

use super::{AppendFuture, LogSegment, SegmentError, SegmentId, SegmentResult};

/// Injected failure that fires either once or on every call.
#[derive(Clone)]
enum Failure {
    /// Error is returned once, then automatically cleared.
    Once(SegmentError),
    /// Error is returned on every subsequent call until explicitly cleared.
    Persistent(SegmentError),
}

type FailSlot = arc_swap::ArcSwap<Option<Failure>>;

/// Checks a [`FailSlot`] and returns an error if one is set.
///
/// For [`Failure::Once`], the slot is atomically swapped to `None` so the
/// error fires exactly once. For [`Failure::Persistent`], the slot is left
/// unchanged.
fn check_failure(slot: &FailSlot) -> SegmentResult<()> {
    let guard = slot.load();
    match guard.as_ref() {
        None => Ok(()),
        Some(Failure::Persistent(err)) => Err(err.clone()),
        Some(Failure::Once(_)) => {
            // Only the caller that wins the swap sees the error.
            let prev = slot.swap(Arc::new(None));
            match prev.as_ref() {
                Some(Failure::Once(err)) => Err(err.clone()),
                _ => Ok(()),
            }
        }
    }
}

/// A segment wrapper that delegates to an inner [`LogSegment`] but can inject
/// failures into submission, resolution, and `close` on demand.
///
/// - A *submit* failure makes `append_async` return `Err` synchronously without
///   reaching the inner segment.
/// - A *resolve* failure lets the inner segment accept the append but makes the
///   returned future resolve to `Err`.
/// - A *close* failure makes `close` return `Err` without closing the inner
///   segment.
///
/// Gated behind the `test-utils` feature.
///
/// # Example
///
/// ```ignore
/// let inner = Arc::new(InMemorySegment::new(1));
/// let segment = FailingSegment::wrap(inner);
/// segment.fail_resolve_once(SegmentError::Unavailable("bookie down".into()));
/// // the next submitted append resolves to Err(...), later ones succeed
/// ```
pub struct FailingSegment {
    inner: Arc<dyn LogSegment>,
    fail_submit: FailSlot,
    fail_resolve: FailSlot,
    fail_close: FailSlot,
}

impl FailingSegment {
    /// Wraps an existing segment, with all failure injections initially `None`.
    pub fn wrap(inner: Arc<dyn LogSegment>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_submit: arc_swap::ArcSwap::from_pointee(None),
            fail_resolve: arc_swap::ArcSwap::from_pointee(None),
            fail_close: arc_swap::ArcSwap::from_pointee(None),
        })
    }

    /// Makes `append_async` reject every subsequent call with the given error.
    pub fn fail_submit(&self, err: SegmentError) {
        self.fail_submit.store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `append_async` reject the next call only.
    pub fn fail_submit_once(&self, err: SegmentError) {
        self.fail_submit.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes every subsequently submitted append resolve to the given error.
    pub fn fail_resolve(&self, err: SegmentError) {
        self.fail_resolve.store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes the next submitted append resolve to the given error.
    pub fn fail_resolve_once(&self, err: SegmentError) {
        self.fail_resolve.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `close` return the given error on every subsequent call.
    pub fn fail_close(&self, err: SegmentError) {
        self.fail_close.store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `close` return the given error on the next call only.
    pub fn fail_close_once(&self, err: SegmentError) {
        self.fail_close.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Clears all injected failures.
    pub fn clear(&self) {
        self.fail_submit.store(Arc::new(None));
        self.fail_resolve.store(Arc::new(None));
        self.fail_close.store(Arc::new(None));
    }
}

#[async_trait]
impl LogSegment for FailingSegment {
    fn id(&self) -> SegmentId {
        self.inner.id()
    }

    fn append_async(&self, payload: Bytes) -> SegmentResult<AppendFuture> {
        check_failure(&self.fail_submit)?;
        let future = self.inner.append_async(payload)?;
        match check_failure(&self.fail_resolve) {
            Ok(()) => Ok(future),
            Err(err) => Ok(async move {
                // The inner append still runs to completion.
                let _ = future.await;
                Err(err)
            }
            .boxed()),
        }
    }

    async fn close(&self) -> SegmentResult<()> {
        check_failure(&self.fail_close)?;
        self.inner.close().await
    }
}
