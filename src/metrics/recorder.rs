//! Metrics recording implementation using Prometheus.

use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec,
    Encoder, HistogramVec, Opts, Registry, TextEncoder,
};
use std::path::Path;
use std::sync::Arc;

/// Trait for recording pipeline metrics.
pub trait MetricsRecorder: Clone + Send + Sync + 'static {
    /// Records a finished logical API request with its outcome
    /// (`ok`, `status_error`, `transport_error`).
    fn record_request(&self, method: &str, outcome: &str);

    /// Records the duration of a logical API request, replay included.
    fn record_request_duration(&self, method: &str, duration_secs: f64);

    /// Records a token renewal triggered by an authorization failure.
    fn record_renewal(&self, result: &str);
}

/// Prometheus metrics collector.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    api_requests_total: CounterVec,
    api_request_duration_seconds: HistogramVec,
    token_renewals_total: CounterVec,
}

impl Metrics {
    /// Creates a new metrics instance with its own Prometheus registry.
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let api_requests_total = register_counter_vec_with_registry!(
            Opts::new("api_requests_total", "Total number of backend API requests"),
            &["method", "outcome"],
            registry.clone()
        )
        .expect("Failed to register api_requests_total");

        let api_request_duration_seconds = register_histogram_vec_with_registry!(
            "api_request_duration_seconds",
            "Backend API request duration in seconds, including a 401 replay",
            &["method"],
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 120.0],
            registry.clone()
        )
        .expect("Failed to register api_request_duration_seconds");

        let token_renewals_total = register_counter_vec_with_registry!(
            Opts::new(
                "token_renewals_total",
                "Token renewals triggered by authorization failures"
            ),
            &["result"],
            registry.clone()
        )
        .expect("Failed to register token_renewals_total");

        Metrics {
            registry,
            api_requests_total,
            api_request_duration_seconds,
            token_renewals_total,
        }
    }

    /// Renders all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Replace `path` with the rendered metrics. The text is written next to
    /// it first so a collector never reads a partial file.
    pub fn write_textfile(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        let staging = path.with_extension("prom.tmp");
        std::fs::write(&staging, self.render())?;
        std::fs::rename(&staging, path)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder for Metrics {
    fn record_request(&self, method: &str, outcome: &str) {
        self.api_requests_total
            .with_label_values(&[method, outcome])
            .inc();
    }

    fn record_request_duration(&self, method: &str, duration_secs: f64) {
        self.api_request_duration_seconds
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    fn record_renewal(&self, result: &str) {
        self.token_renewals_total.with_label_values(&[result]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_text_contains_recorded_series() {
        let metrics = Metrics::new();
        metrics.record_request("GET", "ok");
        metrics.record_renewal("failure");
        let text = metrics.render();
        assert!(text.contains(r#"api_requests_total{method="GET",outcome="ok"} 1"#));
        assert!(text.contains(r#"token_renewals_total{result="failure"} 1"#));
    }

    #[test]
    fn textfile_holds_latest_render() {
        let metrics = Metrics::new();
        let path = std::env::temp_dir().join(format!("sabhadesk-{}.prom", uuid::Uuid::new_v4()));

        metrics.record_request("GET", "ok");
        metrics.write_textfile(&path).unwrap();
        metrics.record_request("GET", "ok");
        metrics.write_textfile(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(text.contains(r#"api_requests_total{method="GET",outcome="ok"} 2"#));
        assert!(!path.with_extension("prom.tmp").exists());
    }
}
