//! Thumbnail metrics for observability

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<ThumbnailMetricsInner> = OnceLock::new();

struct ThumbnailMetricsInner {
    requests: CounterVec,
    errors: CounterVec,
    metacache_ops: CounterVec,
}

impl ThumbnailMetricsInner {
    fn new() -> Self {
        Self {
            requests: CounterVec::new(
                Opts::new(
                    "thumbnail_requests_total",
                    "Resolved thumbnail requests by outcome",
                ),
                &["outcome"],
            )
            .expect("valid metric definition"),
            errors: CounterVec::new(
                Opts::new("thumbnail_errors_total", "Failed thumbnail requests"),
                &["kind"],
            )
            .expect("valid metric definition"),
            metacache_ops: CounterVec::new(
                Opts::new(
                    "thumbnail_metacache_ops_total",
                    "Metadata cache operations",
                ),
                &["op"],
            )
            .expect("valid metric definition"),
        }
    }

    fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.requests.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        registry.register(Box::new(self.metacache_ops.clone()))?;
        Ok(())
    }
}

fn get_metrics() -> &'static ThumbnailMetricsInner {
    METRICS.get_or_init(ThumbnailMetricsInner::new)
}

/// Metrics handle; all clones record into the same process-wide counters
#[derive(Clone, Debug, Default)]
pub struct ThumbnailMetrics;

impl ThumbnailMetrics {
    pub fn new() -> Self {
        Self
    }

    /// Register metrics with a Prometheus registry
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        get_metrics().register(registry)
    }

    pub fn record_outcome(&self, outcome: &str) {
        get_metrics().requests.with_label_values(&[outcome]).inc();
    }

    pub fn record_error(&self, kind: &str) {
        get_metrics().errors.with_label_values(&[kind]).inc();
    }

    pub fn record_cache_op(&self, op: &str) {
        get_metrics().metacache_ops.with_label_values(&[op]).inc();
    }
}
