use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::{LogSegment, SegmentError, SegmentId};
use tokio::sync::OnceCell;

use crate::batcher::{AppendBatcher, AppendedEntry};
use crate::config::BatcherConfig;
use crate::error::{Error, Result};
use crate::metrics::BatcherMetrics;
use crate::observer::AppendObserver;

/// Batches appends against a single segment it owns.
///
/// All appends target the owned segment. [`close`](Self::close) closes it
/// exactly once: concurrent and repeated calls share the outcome of the first,
/// and the segment's own `close` is never invoked twice.
///
/// Closing does not wait for outstanding appends; they stay in the outstanding
/// set and a later [`await_all`](Self::await_all) reports whatever they
/// resolve to. Use [`drain_and_close`](Self::drain_and_close) to wait for them
/// first.
///
/// Async close cannot run on drop. Dropping an unclosed batcher leaves the
/// segment open and logs a warning.
pub struct SegmentBatcher<S: LogSegment> {
    segment: S,
    batcher: AppendBatcher,
    close_outcome: OnceCell<std::result::Result<(), SegmentError>>,
}

impl<S: LogSegment> SegmentBatcher<S> {
    pub fn new(segment: S, config: BatcherConfig) -> Self {
        Self {
            segment,
            batcher: AppendBatcher::new(config),
            close_outcome: OnceCell::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AppendObserver>) -> Self {
        self.batcher.set_observer(observer);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<BatcherMetrics>) -> Self {
        self.batcher.set_metrics(metrics);
        self
    }

    pub fn segment(&self) -> &S {
        &self.segment
    }

    pub fn segment_id(&self) -> SegmentId {
        self.segment.id()
    }

    /// Submits `payload` to the owned segment without waiting for it.
    ///
    /// Fails with [`Error::Closed`] once [`close`](Self::close) has begun.
    pub fn append(&self, payload: Bytes) -> Result<()> {
        self.batcher.append(&self.segment, payload)
    }

    pub fn pending(&self) -> Result<usize> {
        self.batcher.pending()
    }

    /// See [`AppendBatcher::await_all`].
    pub async fn await_all(&self) -> Result<Vec<u64>> {
        self.batcher.await_all().await
    }

    /// See [`AppendBatcher::await_all_entries`].
    pub async fn await_all_entries(&self) -> Result<Vec<AppendedEntry>> {
        self.batcher.await_all_entries().await
    }

    /// See [`AppendBatcher::await_all_timeout`].
    pub async fn await_all_timeout(&self, timeout: Duration) -> Result<Vec<u64>> {
        self.batcher.await_all_timeout(timeout).await
    }

    /// Whether the owned segment has been closed, successfully or not.
    pub fn is_closed(&self) -> bool {
        self.close_outcome.initialized()
    }

    /// Closes the owned segment without awaiting outstanding appends.
    ///
    /// Appends are rejected from the moment this is called. Every call returns
    /// the outcome of the single underlying close.
    pub async fn close(&self) -> Result<()> {
        self.batcher.seal()?;
        let outcome = self
            .close_outcome
            .get_or_init(|| async {
                let pending = self.batcher.pending().unwrap_or_default();
                if pending > 0 {
                    tracing::debug!(
                        segment = self.segment.id(),
                        pending,
                        "closing segment with unawaited appends"
                    );
                }
                self.segment.close().await
            })
            .await;
        outcome.clone().map_err(Error::Close)
    }

    /// Waits for all outstanding appends, then closes the owned segment.
    ///
    /// The segment is closed even if the drain fails; the drain error takes
    /// precedence over a close error. If only the close fails, the drained
    /// positions are carried in [`Error::CloseAfterDrain`].
    pub async fn drain_and_close(&self) -> Result<Vec<u64>> {
        self.batcher.seal()?;
        let drained = self.batcher.await_all().await;
        let closed = self.close().await;
        match (drained, closed) {
            (Ok(positions), Ok(())) => Ok(positions),
            (Ok(positions), Err(Error::Close(source))) => {
                Err(Error::CloseAfterDrain { positions, source })
            }
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                tracing::warn!(
                    segment = self.segment.id(),
                    error = %close_err,
                    "segment close failed after failed drain"
                );
                Err(err)
            }
        }
    }
}

impl<S: LogSegment> Drop for SegmentBatcher<S> {
    fn drop(&mut self) {
        if !self.close_outcome.initialized() {
            tracing::warn!(
                segment = self.segment.id(),
                "dropping segment batcher without closing its segment"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::InMemorySegment;
    use common::segment::failing::FailingSegment;
    use common::segment::manual::ManualSegment;

    fn owned(first_position: u64) -> SegmentBatcher<Arc<InMemorySegment>> {
        let segment = Arc::new(InMemorySegment::starting_at(9, first_position));
        SegmentBatcher::new(segment, BatcherConfig::default())
    }

    #[tokio::test]
    async fn should_append_to_owned_segment() {
        // given
        let batcher = owned(10);

        // when
        for p in ["a", "b", "c"] {
            batcher.append(Bytes::from(p)).unwrap();
        }
        let positions = batcher.await_all().await.unwrap();

        // then
        assert_eq!(positions, vec![10, 11, 12]);
        assert_eq!(batcher.segment().len().unwrap(), 3);
        assert_eq!(batcher.segment_id(), 9);
        batcher.close().await.unwrap();
    }

    #[tokio::test]
    async fn should_close_segment_exactly_once() {
        // given
        let batcher = owned(0);

        // when
        let first = batcher.close().await;
        let second = batcher.close().await;

        // then
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert_eq!(batcher.segment().close_calls(), 1);
        assert!(batcher.is_closed());
    }

    #[tokio::test]
    async fn should_share_failed_close_outcome() {
        // given
        let segment = FailingSegment::wrap(Arc::new(InMemorySegment::new(1)));
        segment.fail_close_once(SegmentError::Unavailable("zk".into()));
        let batcher = SegmentBatcher::new(segment.clone(), BatcherConfig::default());

        // when
        let first = batcher.close().await;
        let second = batcher.close().await;

        // then
        let expected = Err(Error::Close(SegmentError::Unavailable("zk".into())));
        assert_eq!(first, expected);
        assert_eq!(second, expected);
    }

    #[tokio::test]
    async fn should_reject_appends_after_close() {
        let batcher = owned(0);
        batcher.close().await.unwrap();

        let result = batcher.append(Bytes::from("late"));

        assert_eq!(result, Err(Error::Closed));
        assert!(batcher.segment().is_empty().unwrap());
    }

    #[tokio::test]
    async fn should_leave_outstanding_appends_awaitable_after_close() {
        // given
        let segment = Arc::new(ManualSegment::new(1));
        let batcher = SegmentBatcher::new(segment.clone(), BatcherConfig::default());
        batcher.append(Bytes::from("a")).unwrap();

        // when
        batcher.close().await.unwrap();
        segment.resolve(0, 5);

        // then
        assert_eq!(batcher.pending().unwrap(), 1);
        assert_eq!(batcher.await_all().await.unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn should_drain_before_closing() {
        // given
        let batcher = owned(3);
        batcher.append(Bytes::from("a")).unwrap();
        batcher.append(Bytes::from("b")).unwrap();

        // when
        let positions = batcher.drain_and_close().await.unwrap();

        // then
        assert_eq!(positions, vec![3, 4]);
        assert!(batcher.segment().is_closed().unwrap());
        assert_eq!(batcher.pending().unwrap(), 0);
    }

    #[tokio::test]
    async fn should_close_even_when_drain_fails() {
        // given
        let inner = Arc::new(InMemorySegment::new(1));
        let segment = FailingSegment::wrap(inner.clone());
        let batcher = SegmentBatcher::new(segment.clone(), BatcherConfig::default());
        segment.fail_resolve_once(SegmentError::Rejected("fenced".into()));
        batcher.append(Bytes::from("a")).unwrap();

        // when
        let result = batcher.drain_and_close().await;

        // then
        assert_eq!(
            result,
            Err(Error::Resolve {
                index: 0,
                source: SegmentError::Rejected("fenced".into()),
            })
        );
        assert!(inner.is_closed().unwrap());
    }

    #[tokio::test]
    async fn should_return_drained_positions_when_close_fails() {
        // given
        let segment = FailingSegment::wrap(Arc::new(InMemorySegment::starting_at(1, 7)));
        segment.fail_close_once(SegmentError::Unavailable("zk".into()));
        let batcher = SegmentBatcher::new(segment.clone(), BatcherConfig::default());
        batcher.append(Bytes::from("a")).unwrap();
        batcher.append(Bytes::from("b")).unwrap();

        // when
        let result = batcher.drain_and_close().await;

        // then
        assert_eq!(
            result,
            Err(Error::CloseAfterDrain {
                positions: vec![7, 8],
                source: SegmentError::Unavailable("zk".into()),
            })
        );
        assert_eq!(batcher.pending().unwrap(), 0);
        assert_eq!(
            batcher.close().await,
            Err(Error::Close(SegmentError::Unavailable("zk".into())))
        );
    }

    #[tokio::test]
    async fn should_tag_owned_entries_with_segment_id() {
        let batcher = owned(20);
        batcher.append(Bytes::from("a")).unwrap();
        batcher.append(Bytes::from("b")).unwrap();

        let entries = batcher.await_all_entries().await.unwrap();

        assert_eq!(
            entries,
            vec![
                AppendedEntry { segment: 9, position: 20 },
                AppendedEntry { segment: 9, position: 21 },
            ]
        );
        batcher.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_close_once_under_concurrent_callers() {
        // given
        let batcher = Arc::new(owned(0));

        // when
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let batcher = batcher.clone();
                tokio::spawn(async move { batcher.close().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // then
        assert_eq!(batcher.segment().close_calls(), 1);
    }
}
