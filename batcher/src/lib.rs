//! Fire-and-collect batching of appends against append-only log segments.
//!
//! Appends are submitted to a [`LogSegment`](common::LogSegment) without
//! waiting for each to complete. A later `await_all` waits for the whole batch
//! concurrently and returns the assigned positions in the order the appends
//! were issued.
//!
//! Two bindings share the same batching core:
//!
//! - [`AppendBatcher`] takes the target segment on every `append`, so one
//!   batcher can fan out across several segments.
//! - [`SegmentBatcher`] owns a single segment, targets it implicitly, and
//!   closes it.
//!
//! # Example
//!
//! ```ignore
//! use batcher::{BatcherConfig, SegmentBatcher};
//! use bytes::Bytes;
//! use common::InMemorySegment;
//!
//! let batcher = SegmentBatcher::new(InMemorySegment::new(1), BatcherConfig::default());
//! batcher.append(Bytes::from("a"))?;
//! batcher.append(Bytes::from("b"))?;
//! assert_eq!(batcher.await_all().await?, vec![0, 1]);
//! batcher.close().await?;
//! ```

mod batcher;
mod config;
mod error;
mod metrics;
mod observer;
mod segment_batcher;

pub use batcher::{AppendBatcher, AppendedEntry};
pub use config::BatcherConfig;
pub use error::{Error, Result};
pub use metrics::{BatcherMetrics, OperationStatus, StatusLabels};
pub use observer::{AppendObserver, TracingObserver};
pub use segment_batcher::SegmentBatcher;
