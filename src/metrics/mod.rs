//! Metrics collection for observability

use prometheus::{
    CounterVec, Histogram, HistogramVec, Opts, Registry,
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_histogram_with_registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Orchestrator metrics
    pub responses: CounterVec,
    pub strategy_failures: CounterVec,
    pub busy_rejections: CounterVec,

    // Inference latency
    pub remote_duration: Histogram,
    pub local_generation_duration: Histogram,

    // Model acquisition and lifecycle
    pub downloads: CounterVec,
    pub model_loads: CounterVec,
    pub download_duration: HistogramVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let responses = register_counter_vec_with_registry!(
            Opts::new("assist_responses_total", "Replies returned, by provenance"),
            &["provenance"],
            registry
        )?;

        let strategy_failures = register_counter_vec_with_registry!(
            Opts::new("assist_strategy_failures_total", "Strategies that failed or were skipped"),
            &["strategy", "outcome"],
            registry
        )?;

        let busy_rejections = register_counter_vec_with_registry!(
            Opts::new("assist_busy_rejections_total", "Calls rejected while another was in flight"),
            &["operation"],
            registry
        )?;

        let remote_duration = register_histogram_with_registry!(
            "assist_remote_duration_seconds",
            "Remote inference round-trip in seconds",
            registry
        )?;

        let local_generation_duration = register_histogram_with_registry!(
            "assist_local_generation_duration_seconds",
            "Local model generation time in seconds",
            registry
        )?;

        let downloads = register_counter_vec_with_registry!(
            Opts::new("assist_downloads_total", "Model downloads, by outcome"),
            &["outcome"],
            registry
        )?;

        let model_loads = register_counter_vec_with_registry!(
            Opts::new("assist_model_loads_total", "Local model loads, by outcome"),
            &["outcome"],
            registry
        )?;

        let download_duration = register_histogram_vec_with_registry!(
            "assist_download_duration_seconds",
            "Model download duration in seconds",
            &["outcome"],
            registry
        )?;

        Ok(Self {
            registry,
            responses,
            strategy_failures,
            busy_rejections,
            remote_duration,
            local_generation_duration,
            downloads,
            model_loads,
            download_duration,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a reply handed back to the caller
    pub fn record_response(&self, provenance: &str) {
        self.responses.with_label_values(&[provenance]).inc();
    }

    /// Record a strategy that did not produce the reply
    pub fn record_strategy_miss(&self, strategy: &str, failed: bool) {
        let outcome = if failed { "failed" } else { "skipped" };
        self.strategy_failures.with_label_values(&[strategy, outcome]).inc();
    }

    /// Record a rejected concurrent call
    pub fn record_busy(&self, operation: &str) {
        self.busy_rejections.with_label_values(&[operation]).inc();
    }

    /// Record a finished download
    pub fn record_download(&self, outcome: &str, seconds: f64) {
        self.downloads.with_label_values(&[outcome]).inc();
        self.download_duration.with_label_values(&[outcome]).observe(seconds);
    }

    /// Record a model load attempt
    pub fn record_model_load(&self, success: bool) {
        let outcome = if success { "success" } else { "error" };
        self.model_loads.with_label_values(&[outcome]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
