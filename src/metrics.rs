//! Prometheus counters/gauges emitted at well-defined call sites. The
//! registry is constructed once and cloned (it's a thin `Arc` wrapper around
//! prometheus's own registrations) into every worker, mirroring
//! `ContractSyncMetrics`'s shape of one struct holding all the vecs.

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, Registry,
};

#[derive(Debug, Clone)]
pub struct ExtractorMetrics {
    pub registry: Registry,
    pub blocks_processed_total: IntCounter,
    pub txs_processed_total: IntCounter,
    pub rpc_calls_total: IntCounterVec,
    pub rpc_latency_seconds: HistogramVec,
    pub denom_cache_hits_total: IntCounter,
    pub denom_cache_misses_total: IntCounter,
    pub scheduler_inflight: IntGauge,
    pub scheduler_commit_height: IntGauge,
    pub scheduler_lag_seconds: IntGauge,
}

impl ExtractorMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let blocks_processed_total = register_int_counter_with_registry!(
            "blocks_processed_total",
            "Number of blocks committed to the sink",
            registry
        )?;
        let txs_processed_total = register_int_counter_with_registry!(
            "txs_processed_total",
            "Number of transactions committed to the sink",
            registry
        )?;
        let rpc_calls_total = register_int_counter_vec_with_registry!(
            "rpc_calls_total",
            "gRPC calls made, by method and outcome",
            &["method", "outcome"],
            registry
        )?;
        let rpc_latency_seconds = register_histogram_vec_with_registry!(
            "rpc_latency_seconds",
            "gRPC call latency, by method",
            &["method"],
            registry
        )?;
        let denom_cache_hits_total = register_int_counter_with_registry!(
            "denom_cache_hits_total",
            "Denom resolutions served from the in-memory cache",
            registry
        )?;
        let denom_cache_misses_total = register_int_counter_with_registry!(
            "denom_cache_misses_total",
            "Denom resolutions that required a DenomTrace RPC",
            registry
        )?;
        let scheduler_inflight = register_int_gauge_with_registry!(
            "scheduler_inflight",
            "Heights currently dispatched to a worker",
            registry
        )?;
        let scheduler_commit_height = register_int_gauge_with_registry!(
            "scheduler_commit_height",
            "Most recently committed height",
            registry
        )?;
        let scheduler_lag_seconds = register_int_gauge_with_registry!(
            "scheduler_lag_seconds",
            "Seconds between the latest chain height and the commit cursor",
            registry
        )?;

        Ok(Self {
            registry,
            blocks_processed_total,
            txs_processed_total,
            rpc_calls_total,
            rpc_latency_seconds,
            denom_cache_hits_total,
            denom_cache_misses_total,
            scheduler_inflight,
            scheduler_commit_height,
            scheduler_lag_seconds,
        })
    }

    pub fn record_rpc(&self, method: &str, outcome: &str, latency_secs: f64) {
        self.rpc_calls_total.with_label_values(&[method, outcome]).inc();
        self.rpc_latency_seconds
            .with_label_values(&[method])
            .observe(latency_secs);
    }
}
