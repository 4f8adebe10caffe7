//! Prometheus metrics for append batchers.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Labels for append and batch metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabels {
    pub status: OperationStatus,
}

/// Operation status for metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum OperationStatus {
    Success,
    Error,
}

/// Container for all batcher metrics.
///
/// One instance may be shared by several batchers through an `Arc`.
pub struct BatcherMetrics {
    registry: Registry,

    /// Counter of append submissions by status.
    pub batcher_appends_total: Family<StatusLabels, Counter>,

    /// Counter of drained batches by status.
    pub batcher_batches_total: Family<StatusLabels, Counter>,

    /// Counter of appends whose positions were returned by a drain.
    pub batcher_drained_appends_total: Counter,
}

impl Default for BatcherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BatcherMetrics {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let batcher_appends_total = Family::<StatusLabels, Counter>::default();
        registry.register(
            "batcher_appends",
            "Total number of append submissions by status",
            batcher_appends_total.clone(),
        );

        let batcher_batches_total = Family::<StatusLabels, Counter>::default();
        registry.register(
            "batcher_batches",
            "Total number of drained batches by status",
            batcher_batches_total.clone(),
        );

        let batcher_drained_appends_total = Counter::default();
        registry.register(
            "batcher_drained_appends",
            "Total number of appends returned by successful drains",
            batcher_drained_appends_total.clone(),
        );

        Self {
            registry,
            batcher_appends_total,
            batcher_batches_total,
            batcher_drained_appends_total,
        }
    }

    pub(crate) fn record_append(&self, ok: bool) {
        self.batcher_appends_total
            .get_or_create(&StatusLabels { status: status(ok) })
            .inc();
    }

    /// Records a drain; `drained` is `None` when the batch failed.
    pub(crate) fn record_batch(&self, drained: Option<usize>) {
        self.batcher_batches_total
            .get_or_create(&StatusLabels {
                status: status(drained.is_some()),
            })
            .inc();
        if let Some(count) = drained {
            self.batcher_drained_appends_total.inc_by(count as u64);
        }
    }

    /// Encode all metrics to Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry)
            .expect("encoding metrics should not fail");
        buffer
    }
}

fn status(ok: bool) -> OperationStatus {
    if ok {
        OperationStatus::Success
    } else {
        OperationStatus::Error
    }
}
