//! Hooks invoked before each append is submitted.

use bytes::Bytes;
use common::SegmentId;

/// Maximum number of payload bytes rendered by [`TracingObserver`].
const PREVIEW_BYTES: usize = 64;

/// Observes payloads before they are submitted to a segment.
///
/// Called on the appending thread outside the outstanding-set lock, so an
/// observer never reorders submissions. It should still return quickly: the
/// append does not proceed until it does.
pub trait AppendObserver: Send + Sync {
    fn on_append(&self, segment: SegmentId, payload: &Bytes);
}

/// Observer that emits a `tracing` debug event for every payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AppendObserver for TracingObserver {
    fn on_append(&self, segment: SegmentId, payload: &Bytes) {
        tracing::debug!(
            segment,
            len = payload.len(),
            payload = %preview(payload),
            "submitting append"
        );
    }
}

/// Renders the first bytes of `payload` as lossy UTF-8.
fn preview(payload: &[u8]) -> String {
    if payload.len() <= PREVIEW_BYTES {
        String::from_utf8_lossy(payload).into_owned()
    } else {
        format!(
            "{}...",
            String::from_utf8_lossy(&payload[..PREVIEW_BYTES])
        )
    }
}
