//! The log segment interface consumed by writers.
//!
//! A [`LogSegment`] is an append-only, ordered unit of an external durable
//! log service. Writers only ever submit appends and close the segment; how the
//! service replicates, persists, or seals the segment is outside this
//! interface.

#[cfg(feature = "test-utils")]
pub mod failing;
pub mod in_memory;
#[cfg(feature = "test-utils")]
pub mod manual;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

/// Identifier of a log segment within the log service.
pub type SegmentId = u64;

/// A submitted append that resolves to the position assigned by the segment.
pub type AppendFuture = BoxFuture<'static, SegmentResult<u64>>;

/// Error type for segment operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// The segment handle was already closed.
    Closed,
    /// The log service could not be reached.
    Unavailable(String),
    /// The log service refused the request.
    Rejected(String),
    /// Internal errors
    Internal(String),
}

impl std::error::Error for SegmentError {}

impl std::fmt::Display for SegmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SegmentError::Closed => write!(f, "segment is closed"),
            SegmentError::Unavailable(msg) => write!(f, "segment unavailable: {}", msg),
            SegmentError::Rejected(msg) => write!(f, "append rejected: {}", msg),
            SegmentError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Result type alias for segment operations
pub type SegmentResult<T> = std::result::Result<T, SegmentError>;

/// Handle to a single append-only log segment.
///
/// `append_async` must not wait for the append to complete: it either rejects
/// the request synchronously (for example because the handle is closed) or
/// returns a future for the position. Positions are assigned in the order
/// `append_async` is called on a given handle, but the returned futures may
/// resolve in any order.
#[async_trait]
pub trait LogSegment: Send + Sync {
    /// Returns the id of this segment.
    fn id(&self) -> SegmentId;

    /// Submits `payload` for appending without waiting for it to complete.
    ///
    /// Empty payloads are legal and passed through to the log service.
    fn append_async(&self, payload: Bytes) -> SegmentResult<AppendFuture>;

    /// Closes the segment handle, releasing any resources held by it.
    async fn close(&self) -> SegmentResult<()>;
}

#[async_trait]
impl<T: LogSegment + ?Sized> LogSegment for Arc<T> {
    fn id(&self) -> SegmentId {
        (**self).id()
    }

    fn append_async(&self, payload: Bytes) -> SegmentResult<AppendFuture> {
        (**self).append_async(payload)
    }

    async fn close(&self) -> SegmentResult<()> {
        (**self).close().await
    }
}

#[async_trait]
impl<T: LogSegment + ?Sized> LogSegment for Box<T> {
    fn id(&self) -> SegmentId {
        (**self).id()
    }

    fn append_async(&self, payload: Bytes) -> SegmentResult<AppendFuture> {
        (**self).append_async(payload)
    }

    async fn close(&self) -> SegmentResult<()> {
        (**self).close().await
    }
}
