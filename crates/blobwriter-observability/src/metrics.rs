use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Block Metrics
    // ============================================================================

    /// Blocks uploaded to the remote store
    pub static ref BLOCKS_UPLOADED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobwriter_blocks_uploaded_total", "Total blocks uploaded"),
        &["partition"]
    ).expect("metric can be created");

    /// Bytes uploaded in blocks
    pub static ref BLOCK_BYTES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobwriter_block_bytes_total", "Total bytes uploaded in blocks"),
        &["partition"]
    ).expect("metric can be created");

    /// Block upload latency, including transport retries
    pub static ref BLOCK_UPLOAD_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("blobwriter_block_upload_latency_seconds", "Block upload latency in seconds")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["partition"]
    ).expect("metric can be created");

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Messages accepted into blocks
    pub static ref MESSAGES_WRITTEN_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobwriter_messages_written_total", "Total messages accepted into blocks"),
        &["partition"]
    ).expect("metric can be created");

    /// Messages dropped for exceeding the size limit
    pub static ref MESSAGES_DROPPED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobwriter_messages_dropped_total", "Total oversize messages dropped"),
        &["partition"]
    ).expect("metric can be created");

    // ============================================================================
    // Transaction Metrics
    // ============================================================================

    /// Checkpoints persisted
    pub static ref CHECKPOINTS_WRITTEN_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobwriter_checkpoints_written_total", "Total checkpoints persisted"),
        &["partition"]
    ).expect("metric can be created");

    /// Transactions that ended in the failed state
    pub static ref TRANSACTIONS_FAILED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blobwriter_transactions_failed_total", "Total failed transactions"),
        &["partition", "reason"]
    ).expect("metric can be created");
}

/// Register all metrics with the global registry. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(BLOCKS_UPLOADED_TOTAL.clone()))
            .expect("blocks_uploaded_total can be registered");
        REGISTRY
            .register(Box::new(BLOCK_BYTES_TOTAL.clone()))
            .expect("block_bytes_total can be registered");
        REGISTRY
            .register(Box::new(BLOCK_UPLOAD_LATENCY.clone()))
            .expect("block_upload_latency can be registered");
        REGISTRY
            .register(Box::new(MESSAGES_WRITTEN_TOTAL.clone()))
            .expect("messages_written_total can be registered");
        REGISTRY
            .register(Box::new(MESSAGES_DROPPED_TOTAL.clone()))
            .expect("messages_dropped_total can be registered");
        REGISTRY
            .register(Box::new(CHECKPOINTS_WRITTEN_TOTAL.clone()))
            .expect("checkpoints_written_total can be registered");
        REGISTRY
            .register(Box::new(TRANSACTIONS_FAILED_TOTAL.clone()))
            .expect("transactions_failed_total can be registered");
    });
}

/// Render the registry in the Prometheus text exposition format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        init();
    }

    #[test]
    fn test_block_counters() {
        BLOCKS_UPLOADED_TOTAL.with_label_values(&["test-block-counters"]).inc();
        BLOCK_BYTES_TOTAL
            .with_label_values(&["test-block-counters"])
            .inc_by(4096);

        assert_eq!(
            BLOCKS_UPLOADED_TOTAL
                .with_label_values(&["test-block-counters"])
                .get(),
            1
        );
        assert_eq!(
            BLOCK_BYTES_TOTAL
                .with_label_values(&["test-block-counters"])
                .get(),
            4096
        );
    }

    #[test]
    fn test_render_contains_registered_metrics() {
        init();
        MESSAGES_DROPPED_TOTAL.with_label_values(&["test-render"]).inc();
        let text = render();
        assert!(text.contains("blobwriter_messages_dropped_total"));
    }
}
