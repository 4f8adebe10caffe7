//! Error types for batcher operations.

use common::SegmentError;

/// Error type for batcher operations.
///
/// Every variant is surfaced to the caller of the operation that failed; the
/// batcher never retries or absorbs a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The segment rejected the append synchronously. Nothing was recorded.
    Submit(SegmentError),
    /// An outstanding append resolved to an error.
    ///
    /// `index` is the append's position within the drained batch.
    Resolve { index: usize, source: SegmentError },
    /// The owned segment failed to close.
    Close(SegmentError),
    /// The owned segment failed to close after a successful drain.
    ///
    /// `positions` are the drained results, in `append` order.
    CloseAfterDrain {
        positions: Vec<u64>,
        source: SegmentError,
    },
    /// The batcher has been closed and accepts no more appends.
    Closed,
    /// The batch did not resolve before the await deadline.
    Timeout { pending: usize },
    /// Internal error
    Internal(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Submit(e) | Error::Close(e) => Some(e),
            Error::Resolve { source, .. } | Error::CloseAfterDrain { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Submit(e) => write!(f, "append submission failed: {}", e),
            Error::Resolve { index, source } => {
                write!(f, "append #{} in batch failed: {}", index, source)
            }
            Error::Close(e) => write!(f, "failed to close segment: {}", e),
            Error::CloseAfterDrain { positions, source } => write!(
                f,
                "failed to close segment after draining {} appends: {}",
                positions.len(),
                source
            ),
            Error::Closed => write!(f, "batcher is closed"),
            Error::Timeout { pending } => {
                write!(f, "timed out waiting for {} pending appends", pending)
            }
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Result type alias for batcher operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn should_render_resolve_error_with_index() {
        let err = Error::Resolve {
            index: 2,
            source: SegmentError::Unavailable("bookie-3".into()),
        };

        assert_eq!(
            err.to_string(),
            "append #2 in batch failed: segment unavailable: bookie-3"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn should_render_close_after_drain_with_drained_count() {
        let err = Error::CloseAfterDrain {
            positions: vec![4, 5],
            source: SegmentError::Unavailable("zk".into()),
        };

        assert_eq!(
            err.to_string(),
            "failed to close segment after draining 2 appends: segment unavailable: zk"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn should_not_expose_source_for_local_errors() {
        assert!(Error::Closed.source().is_none());
        assert!(Error::Timeout { pending: 3 }.source().is_none());
    }
}
