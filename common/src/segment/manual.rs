use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::oneshot;

use super::{AppendFuture, LogSegment, SegmentError, SegmentId, SegmentResult};

struct Submitted {
    payload: Bytes,
    result_tx: Option<oneshot::Sender<SegmentResult<u64>>>,
}

struct ManualState {
    submitted: Vec<Submitted>,
    closed: bool,
}

/// A segment whose appends stay pending until the test resolves them.
///
/// Every accepted append is recorded by submission index. The future returned
/// for index `i` resolves only once [`resolve`](Self::resolve) or
/// [`fail`](Self::fail) is called for `i`, so tests control both the assigned
/// position and the resolution order. Dropping the segment resolves any
/// still-pending future to [`SegmentError::Internal`].
///
/// Gated behind the `test-utils` feature.
pub struct ManualSegment {
    id: SegmentId,
    state: Mutex<ManualState>,
    close_calls: AtomicUsize,
}

impl ManualSegment {
    pub fn new(id: SegmentId) -> Self {
        Self {
            id,
            state: Mutex::new(ManualState {
                submitted: Vec::new(),
                closed: false,
            }),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Resolves the append at submission `index` with `position`.
    ///
    /// Returns `false` if there is no such append or it was already resolved.
    pub fn resolve(&self, index: usize, position: u64) -> bool {
        self.complete(index, Ok(position))
    }

    /// Resolves the append at submission `index` with `err`.
    pub fn fail(&self, index: usize, err: SegmentError) -> bool {
        self.complete(index, Err(err))
    }

    /// Number of appends accepted so far.
    pub fn submitted(&self) -> usize {
        self.lock().submitted.len()
    }

    /// Payloads of accepted appends, in submission order.
    pub fn payloads(&self) -> Vec<Bytes> {
        self.lock()
            .submitted
            .iter()
            .map(|s| s.payload.clone())
            .collect()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn complete(&self, index: usize, result: SegmentResult<u64>) -> bool {
        let tx = self
            .lock()
            .submitted
            .get_mut(index)
            .and_then(|s| s.result_tx.take());
        match tx {
            // The receiver may already be gone if the caller dropped the future.
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A panicking test thread must not hide the segment from the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LogSegment for ManualSegment {
    fn id(&self) -> SegmentId {
        self.id
    }

    fn append_async(&self, payload: Bytes) -> SegmentResult<AppendFuture> {
        let mut state = self.lock();
        if state.closed {
            return Err(SegmentError::Closed);
        }

        let (result_tx, result_rx) = oneshot::channel();
        state.submitted.push(Submitted {
            payload,
            result_tx: Some(result_tx),
        });

        Ok(result_rx
            .map(|r| {
                r.unwrap_or_else(|_| {
                    Err(SegmentError::Internal(
                        "segment dropped before resolving".into(),
                    ))
                })
            })
            .boxed())
    }

    async fn close(&self) -> SegmentResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if state.closed {
            return Err(SegmentError::Closed);
        }
        state.closed = true;
        Ok(())
    }
}
