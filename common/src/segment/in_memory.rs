use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;

use super::{AppendFuture, LogSegment, SegmentError, SegmentId, SegmentResult};

struct SegmentState {
    entries: BTreeMap<u64, Bytes>,
    /// `None` once position `u64::MAX` has been assigned.
    next_position: Option<u64>,
    closed: bool,
}

/// In-memory implementation of the [`LogSegment`] trait using a BTreeMap.
///
/// Positions are assigned sequentially from the first position at submission
/// time, and the returned futures are already resolved. Closing the segment a
/// second time fails with [`SegmentError::Closed`], as does any append after
/// close. Once position `u64::MAX` has been assigned, further appends are
/// rejected with [`SegmentError::Rejected`].
pub struct InMemorySegment {
    id: SegmentId,
    state: Arc<RwLock<SegmentState>>,
    close_calls: AtomicUsize,
}

impl InMemorySegment {
    /// Creates an empty segment whose first entry is assigned position 0.
    pub fn new(id: SegmentId) -> Self {
        Self::starting_at(id, 0)
    }

    /// Creates an empty segment whose first entry is assigned `first_position`.
    pub fn starting_at(id: SegmentId, first_position: u64) -> Self {
        Self {
            id,
            state: Arc::new(RwLock::new(SegmentState {
                entries: BTreeMap::new(),
                next_position: Some(first_position),
                closed: false,
            })),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Returns the payload stored at `position`, if any.
    pub fn get(&self, position: u64) -> SegmentResult<Option<Bytes>> {
        let state = self.read()?;
        Ok(state.entries.get(&position).cloned())
    }

    /// Returns all entries in position order.
    pub fn entries(&self) -> SegmentResult<Vec<(u64, Bytes)>> {
        let state = self.read()?;
        Ok(state
            .entries
            .iter()
            .map(|(position, payload)| (*position, payload.clone()))
            .collect())
    }

    /// Returns the number of entries appended so far.
    pub fn len(&self) -> SegmentResult<usize> {
        Ok(self.read()?.entries.len())
    }

    pub fn is_empty(&self) -> SegmentResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn is_closed(&self) -> SegmentResult<bool> {
        Ok(self.read()?.closed)
    }

    /// Number of times `close` has been called, successful or not.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn read(&self) -> SegmentResult<std::sync::RwLockReadGuard<'_, SegmentState>> {
        self.state
            .read()
            .map_err(|e| SegmentError::Internal(format!("Failed to acquire read lock: {}", e)))
    }
}

#[async_trait]
impl LogSegment for InMemorySegment {
    fn id(&self) -> SegmentId {
        self.id
    }

    #[tracing::instrument(level = "trace", skip_all, fields(segment = self.id))]
    fn append_async(&self, payload: Bytes) -> SegmentResult<AppendFuture> {
        let mut state = self
            .state
            .write()
            .map_err(|e| SegmentError::Internal(format!("Failed to acquire write lock: {}", e)))?;

        if state.closed {
            return Err(SegmentError::Closed);
        }

        let Some(position) = state.next_position else {
            return Err(SegmentError::Rejected("segment exhausted".to_string()));
        };
        state.next_position = position.checked_add(1);
        state.entries.insert(position, payload);

        Ok(futures::future::ready(Ok(position)).boxed())
    }

    async fn close(&self) -> SegmentResult<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self
            .state
            .write()
            .map_err(|e| SegmentError::Internal(format!("Failed to acquire write lock: {}", e)))?;

        if state.closed {
            return Err(SegmentError::Closed);
        }
        state.closed = true;
        Ok(())
    }
}
