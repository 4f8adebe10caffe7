//! Configuration for append batchers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration shared by [`AppendBatcher`](crate::AppendBatcher) and
/// [`SegmentBatcher`](crate::SegmentBatcher).
///
/// # Example
///
/// ```ignore
/// use batcher::BatcherConfig;
///
/// let config: BatcherConfig = serde_json::from_str(r#"{"await_timeout_ms": 5000}"#)?;
/// assert!(!config.log_payloads);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatcherConfig {
    /// Deadline applied by `await_all`. `None` waits indefinitely.
    #[serde(default)]
    pub await_timeout_ms: Option<u64>,

    /// Emit a `tracing` debug record for every payload before it is submitted.
    ///
    /// Ignored when an observer is attached explicitly.
    #[serde(default)]
    pub log_payloads: bool,

    /// Initial capacity of the outstanding set, restored after every drain.
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
}

impl BatcherConfig {
    pub fn await_timeout(&self) -> Option<Duration> {
        self.await_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            await_timeout_ms: None,
            log_payloads: false,
            initial_capacity: default_initial_capacity(),
        }
    }
}

fn default_initial_capacity() -> usize {
    64
}
