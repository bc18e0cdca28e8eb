//! Metrics collection and registry.

use crate::delivery::{DeliveryMethod, DeliveryOutcome};
use crate::error::ErrorKind;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

fn method_label(method: DeliveryMethod) -> &'static str {
    match method {
        DeliveryMethod::Auto => "auto",
        DeliveryMethod::Download => "download",
        DeliveryMethod::Clipboard => "clipboard",
        DeliveryMethod::Bridge => "bridge",
        DeliveryMethod::Store => "store",
    }
}

/// Prometheus registry for session and delivery metrics.
pub struct MetricsRegistry {
    registry: Registry,

    // Session metrics
    session_active: IntGauge,
    session_starts: IntCounter,
    acquisition_failures: IntCounterVec,
    captures: IntCounter,

    // Delivery metrics
    deliveries: IntCounterVec,
    delivery_failures: IntCounterVec,
    recompression_attempts: IntCounter,
    last_payload_bytes: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new registry with every metric registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let session_active = IntGauge::new(
            "camera_share_session_active",
            "Whether a camera stream is live (1=active, 0=idle)",
        )?;
        let session_starts = IntCounter::new(
            "camera_share_session_starts_total",
            "Total number of successful stream acquisitions",
        )?;
        let acquisition_failures = IntCounterVec::new(
            Opts::new(
                "camera_share_acquisition_failures_total",
                "Total number of failed stream acquisitions",
            ),
            &["kind"],
        )?;
        let captures = IntCounter::new(
            "camera_share_captures_total",
            "Total number of stills captured",
        )?;

        let deliveries = IntCounterVec::new(
            Opts::new(
                "camera_share_deliveries_total",
                "Total number of successful deliveries",
            ),
            &["method"],
        )?;
        let delivery_failures = IntCounterVec::new(
            Opts::new(
                "camera_share_delivery_failures_total",
                "Total number of failed deliveries",
            ),
            &["kind"],
        )?;
        let recompression_attempts = IntCounter::new(
            "camera_share_recompression_attempts_total",
            "Total JPEG encodes spent fitting host payloads",
        )?;
        let last_payload_bytes = IntGauge::new(
            "camera_share_last_payload_bytes",
            "Size of the last payload sent to the host",
        )?;

        registry.register(Box::new(session_active.clone()))?;
        registry.register(Box::new(session_starts.clone()))?;
        registry.register(Box::new(acquisition_failures.clone()))?;
        registry.register(Box::new(captures.clone()))?;
        registry.register(Box::new(deliveries.clone()))?;
        registry.register(Box::new(delivery_failures.clone()))?;
        registry.register(Box::new(recompression_attempts.clone()))?;
        registry.register(Box::new(last_payload_bytes.clone()))?;

        Ok(Self {
            registry,
            session_active,
            session_starts,
            acquisition_failures,
            captures,
            deliveries,
            delivery_failures,
            recompression_attempts,
            last_payload_bytes,
        })
    }

    pub fn record_start(&self) {
        self.session_starts.inc();
    }

    pub fn record_acquisition_failure(&self, kind: ErrorKind) {
        self.acquisition_failures
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn set_active(&self, active: bool) {
        self.session_active.set(i64::from(active));
    }

    pub fn record_capture(&self) {
        self.captures.inc();
    }

    pub fn record_delivery(&self, outcome: &DeliveryOutcome) {
        self.deliveries
            .with_label_values(&[method_label(outcome.method())])
            .inc();
        if let DeliveryOutcome::Sent {
            bytes, attempts, ..
        } = outcome
        {
            self.recompression_attempts.inc_by(*attempts as u64);
            self.last_payload_bytes.set(*bytes as i64);
        }
    }

    pub fn record_delivery_failure(&self, kind: ErrorKind) {
        self.delivery_failures
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}
