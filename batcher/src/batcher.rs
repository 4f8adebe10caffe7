//! Fire-and-collect batching of appends.
//!
//! An [`AppendBatcher`] submits each payload to a [`LogSegment`] without
//! waiting for it, keeps the returned futures in an insertion-ordered
//! outstanding set, and resolves the whole set on [`await_all`]. Results are
//! reported in `append` order regardless of the order in which the segment
//! resolves them.
//!
//! # Accumulate / drain cycle
//!
//! The outstanding set is guarded by a mutex that is held only while a
//! submission is pushed or while the set is swapped out. `await_all` swaps the
//! set for an empty one before waiting, so appends racing a drain land in the
//! next batch: none is lost and none is reported twice. Because the segment is
//! called while the lock is held, positions assigned by one segment follow the
//! order of the outstanding set.
//!
//! [`await_all`]: AppendBatcher::await_all

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use common::{AppendFuture, LogSegment, SegmentId};
use futures::FutureExt;

use crate::config::BatcherConfig;
use crate::error::{Error, Result};
use crate::metrics::BatcherMetrics;
use crate::observer::{AppendObserver, TracingObserver};

/// Position assigned to one append, together with the segment that assigned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppendedEntry {
    pub segment: SegmentId,
    pub position: u64,
}

/// An in-flight append owned by the batcher until it is drained.
struct PendingAppend {
    segment: SegmentId,
    future: AppendFuture,
}

struct Outstanding {
    pending: Vec<PendingAppend>,
    /// Set once by an owning batcher's close; rejects further appends.
    sealed: bool,
}

/// Batches appends against segments supplied per call.
///
/// One batcher can fan out across any number of segments. For a batcher bound
/// to a single segment it owns, see [`SegmentBatcher`](crate::SegmentBatcher).
///
/// # Example
///
/// ```ignore
/// let batcher = AppendBatcher::new(BatcherConfig::default());
/// batcher.append(&segment, Bytes::from("a"))?;
/// batcher.append(&segment, Bytes::from("b"))?;
/// let positions = batcher.await_all().await?;
/// ```
pub struct AppendBatcher {
    outstanding: Mutex<Outstanding>,
    observer: Option<Arc<dyn AppendObserver>>,
    metrics: Option<Arc<BatcherMetrics>>,
    config: BatcherConfig,
}

impl AppendBatcher {
    pub fn new(config: BatcherConfig) -> Self {
        let observer: Option<Arc<dyn AppendObserver>> = if config.log_payloads {
            Some(Arc::new(TracingObserver))
        } else {
            None
        };
        Self {
            outstanding: Mutex::new(Outstanding {
                pending: Vec::with_capacity(config.initial_capacity),
                sealed: false,
            }),
            observer,
            metrics: None,
            config,
        }
    }

    /// Replaces the observer invoked before each submission.
    pub fn with_observer(mut self, observer: Arc<dyn AppendObserver>) -> Self {
        self.set_observer(observer);
        self
    }

    /// Records append and drain counts into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<BatcherMetrics>) -> Self {
        self.set_metrics(metrics);
        self
    }

    pub(crate) fn set_observer(&mut self, observer: Arc<dyn AppendObserver>) {
        self.observer = Some(observer);
    }

    pub(crate) fn set_metrics(&mut self, metrics: Arc<BatcherMetrics>) {
        self.metrics = Some(metrics);
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    /// Submits `payload` to `segment` without waiting for it to complete.
    ///
    /// A synchronous rejection by the segment is returned immediately as
    /// [`Error::Submit`] and nothing is added to the outstanding set. The
    /// observer is not invoked once the batcher is sealed.
    pub fn append<S: LogSegment + ?Sized>(&self, segment: &S, payload: Bytes) -> Result<()> {
        let result = self.check_open().and_then(|()| {
            if let Some(observer) = &self.observer {
                observer.on_append(segment.id(), &payload);
            }
            self.submit(segment, payload)
        });
        if let Some(metrics) = &self.metrics {
            metrics.record_append(result.is_ok());
        }
        result
    }

    fn submit<S: LogSegment + ?Sized>(&self, segment: &S, payload: Bytes) -> Result<()> {
        let mut outstanding = self.lock()?;
        if outstanding.sealed {
            return Err(Error::Closed);
        }

        let future = segment.append_async(payload).map_err(Error::Submit)?;
        outstanding.pending.push(PendingAppend {
            segment: segment.id(),
            future,
        });
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.lock()?.sealed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Number of appends submitted since the last drain.
    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock()?.pending.len())
    }

    /// Waits for every outstanding append and returns their positions in
    /// `append` order.
    ///
    /// Returns an empty vector immediately when nothing is outstanding. If any
    /// append fails, the call fails with the failure of the earliest such
    /// append, after the whole batch has settled. Either way the outstanding
    /// set is left empty. Applies the configured await timeout, if any.
    pub async fn await_all(&self) -> Result<Vec<u64>> {
        let entries = self.drain(self.config.await_timeout()).await?;
        Ok(entries.into_iter().map(|e| e.position).collect())
    }

    /// Like [`await_all`](Self::await_all), but reports the segment of each
    /// position as well.
    pub async fn await_all_entries(&self) -> Result<Vec<AppendedEntry>> {
        self.drain(self.config.await_timeout()).await
    }

    /// Like [`await_all`](Self::await_all), with an explicit deadline.
    ///
    /// On [`Error::Timeout`] the drained batch is abandoned; appends made after
    /// the drain started are unaffected.
    pub async fn await_all_timeout(&self, timeout: Duration) -> Result<Vec<u64>> {
        let entries = self.drain(Some(timeout)).await?;
        Ok(entries.into_iter().map(|e| e.position).collect())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn drain(&self, timeout: Option<Duration>) -> Result<Vec<AppendedEntry>> {
        let batch = self.take()?;
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let pending = batch.len();
        let result = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, resolve(batch))
                .await
                .unwrap_or(Err(Error::Timeout { pending })),
            None => resolve(batch).await,
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_batch(result.as_ref().ok().map(Vec::len));
        }
        if let Err(err) = &result {
            tracing::debug!(pending, error = %err, "batch failed");
        }
        result
    }

    /// Swaps out the outstanding set, leaving an empty one in its place.
    fn take(&self) -> Result<Vec<PendingAppend>> {
        let mut outstanding = self.lock()?;
        if outstanding.pending.is_empty() {
            return Ok(Vec::new());
        }
        Ok(std::mem::replace(
            &mut outstanding.pending,
            Vec::with_capacity(self.config.initial_capacity),
        ))
    }

    /// Rejects all further appends. Outstanding appends are left in place.
    pub(crate) fn seal(&self) -> Result<()> {
        self.lock()?.sealed = true;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Outstanding>> {
        self.outstanding
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to acquire outstanding lock: {}", e)))
    }
}

impl Default for AppendBatcher {
    fn default() -> Self {
        Self::new(BatcherConfig::default())
    }
}

impl Drop for AppendBatcher {
    fn drop(&mut self) {
        let pending = match self.outstanding.get_mut() {
            Ok(outstanding) => outstanding.pending.len(),
            Err(poisoned) => poisoned.into_inner().pending.len(),
        };
        if pending > 0 {
            tracing::warn!(pending, "dropping batcher with unawaited appends");
        }
    }
}

/// Resolves every append of `batch` concurrently, preserving batch order.
async fn resolve(batch: Vec<PendingAppend>) -> Result<Vec<AppendedEntry>> {
    let futures = batch.into_iter().map(|PendingAppend { segment, future }| {
        future.map(move |result| result.map(|position| AppendedEntry { segment, position }))
    });

    futures::future::join_all(futures)
        .await
        .into_iter()
        .enumerate()
        .map(|(index, result)| result.map_err(|source| Error::Resolve { index, source }))
        .collect()
}
