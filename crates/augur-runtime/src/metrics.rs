//! Prometheus metrics for the serving layer and the worker pool.

use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collection shared by dispatcher and workers.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub predictions_total: CounterVec,
    pub prediction_latency: HistogramVec,
    pub jobs_total: CounterVec,
    pub job_duration: HistogramVec,
    pub job_retries_total: CounterVec,
    pub models_loaded: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let predictions_total = CounterVec::new(
            Opts::new("augur_predictions_total", "Prediction requests by model and mode"),
            &["model", "mode"],
        )
        .expect("failed to create predictions_total counter");

        let prediction_latency = HistogramVec::new(
            HistogramOpts::new(
                "augur_prediction_latency_seconds",
                "Synchronous prediction latency",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
            ]),
            &["model"],
        )
        .expect("failed to create prediction_latency histogram");

        let jobs_total = CounterVec::new(
            Opts::new("augur_jobs_total", "Finished jobs by model and outcome"),
            &["model", "outcome"],
        )
        .expect("failed to create jobs_total counter");

        let job_duration = HistogramVec::new(
            HistogramOpts::new("augur_job_duration_seconds", "Job processing time")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["model"],
        )
        .expect("failed to create job_duration histogram");

        let job_retries_total = CounterVec::new(
            Opts::new("augur_job_retries_total", "Jobs requeued after transient failures"),
            &["model"],
        )
        .expect("failed to create job_retries_total counter");

        let models_loaded = Gauge::new("augur_models_loaded", "Models in the local registry")
            .expect("failed to create models_loaded gauge");

        registry
            .register(Box::new(predictions_total.clone()))
            .expect("failed to register predictions_total");
        registry
            .register(Box::new(prediction_latency.clone()))
            .expect("failed to register prediction_latency");
        registry
            .register(Box::new(jobs_total.clone()))
            .expect("failed to register jobs_total");
        registry
            .register(Box::new(job_duration.clone()))
            .expect("failed to register job_duration");
        registry
            .register(Box::new(job_retries_total.clone()))
            .expect("failed to register job_retries_total");
        registry
            .register(Box::new(models_loaded.clone()))
            .expect("failed to register models_loaded");

        Self {
            registry: Arc::new(registry),
            predictions_total,
            prediction_latency,
            jobs_total,
            job_duration,
            job_retries_total,
            models_loaded,
        }
    }

    /// Record a synchronous prediction round trip.
    pub fn record_prediction(&self, model: &str, mode: &str, latency_secs: f64) {
        self.predictions_total.with_label_values(&[model, mode]).inc();
        self.prediction_latency
            .with_label_values(&[model])
            .observe(latency_secs);
    }

    /// Record an accepted asynchronous submission. Latency is tracked on
    /// the worker side for these.
    pub fn record_submission(&self, model: &str) {
        self.predictions_total.with_label_values(&[model, "async"]).inc();
    }

    /// Record a finished job.
    pub fn record_job(&self, model: &str, outcome: &str, duration_secs: f64) {
        self.jobs_total.with_label_values(&[model, outcome]).inc();
        self.job_duration
            .with_label_values(&[model])
            .observe(duration_secs);
    }

    /// Record a requeue after a transient failure.
    pub fn record_retry(&self, model: &str) {
        self.job_retries_total.with_label_values(&[model]).inc();
    }

    /// Set the local registry size.
    pub fn set_models_loaded(&self, count: usize) {
        self.models_loaded.set(count as f64);
    }

    /// Get Prometheus text output
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let metrics = Metrics::new();
        metrics.record_prediction("m1", "sync", 0.002);
        metrics.record_job("m2", "success", 0.05);
        metrics.record_retry("m2");
        metrics.set_models_loaded(2);

        let output = metrics.gather();
        assert!(output.contains("augur_predictions_total"));
        assert!(output.contains("augur_jobs_total"));
        assert!(output.contains("augur_models_loaded 2"));
    }

    #[test]
    fn test_metrics_default() {
        let metrics = Metrics::default();
        metrics.record_prediction("m1", "sync", 0.001);
        let output = metrics.gather();
        assert!(output.contains("augur_prediction_latency_seconds"));
    }

    #[test]
    fn test_job_outcomes_are_separate_series() {
        let metrics = Metrics::new();
        metrics.record_job("m2", "success", 0.01);
        metrics.record_job("m2", "failure", 0.01);
        let output = metrics.gather();
        assert!(output.contains("outcome=\"success\""));
        assert!(output.contains("outcome=\"failure\""));
    }
}
