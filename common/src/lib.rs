pub mod segment;

pub use segment::in_memory::InMemorySegment;
pub use segment::{AppendFuture, LogSegment, SegmentError, SegmentId, SegmentResult};
