use crate::error::{AdmissionError, Result};
use axum::{
    body::Body,
    extract::State,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Mutex;
use tracing::{debug, info};

/// The process-wide recorder can only be installed once
static RECORDER: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: PrometheusHandle,
}

impl MetricsService {
    /// Create a new metrics service, installing the global recorder on first use
    pub fn new() -> Result<Self> {
        let mut installed = RECORDER
            .lock()
            .map_err(|_| AdmissionError::Internal("Metrics recorder lock poisoned".to_string()))?;

        if let Some(handle) = installed.as_ref() {
            return Ok(Self {
                handle: handle.clone(),
            });
        }

        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            AdmissionError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();
        *installed = Some(handle.clone());

        info!("Metrics service initialized successfully");

        Ok(Self { handle })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        describe_counter!(
            "admission_requests_total",
            "Total number of requests checked by the admission controller"
        );
        describe_counter!(
            "admission_rejections_total",
            "Total number of requests rejected due to rate limiting"
        );
        describe_counter!(
            "admission_refunds_total",
            "Total number of admitted requests refunded after completion"
        );
        describe_counter!(
            "admission_reclaimed_records_total",
            "Total number of stale window records evicted by the reclaimer"
        );
        describe_gauge!(
            "admission_active_records",
            "Number of window records currently tracked"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(Body::from(service.render()))
        .map_err(|e| AdmissionError::Internal(format!("Failed to build metrics response: {}", e)))
}

/// Record an admission decision
pub fn record_admission(tier: &str, category: &str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "rejected" };
    let labels = [
        ("tier", tier.to_string()),
        ("category", category.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("admission_requests_total", &labels).increment(1);

    if !allowed {
        let labels = [
            ("tier", tier.to_string()),
            ("category", category.to_string()),
        ];
        counter!("admission_rejections_total", &labels).increment(1);
    }
}

/// Record a refunded request
pub fn record_refund() {
    counter!("admission_refunds_total").increment(1);
}

/// Record the number of tracked window records
fn record_active_records(count: usize) {
    gauge!("admission_active_records").set(count as f64);
}

/// Record a reclaimer sweep
pub fn record_reclaimed(removed: usize, remaining: usize) {
    counter!("admission_reclaimed_records_total").increment(removed as u64);
    record_active_records(remaining);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        record_admission("free", "generate", true);
        record_admission("anonymous", "export", false);
        record_refund();
        record_reclaimed(3, 7);
    }

    #[test]
    fn test_active_records_gauge_set_by_sweep() {
        let service = MetricsService::new().unwrap();

        record_reclaimed(2, 5);

        let rendered = service.render();
        assert!(rendered.contains("admission_reclaimed_records_total"));
        assert!(rendered.contains("admission_active_records"));
    }

    #[test]
    fn test_metrics_service_is_shared() {
        let first = MetricsService::new().unwrap();
        let second = MetricsService::new().unwrap();

        record_admission("pro", "status", false);

        assert!(first.render().contains("admission_rejections_total"));
        assert!(second.render().contains("admission_rejections_total"));
    }
}
