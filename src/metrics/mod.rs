//! Prometheus metrics for camera sessions and deliveries.
//!
//! # Metrics Exposed
//!
//! - `camera_share_session_active` - 1 while a stream is live
//! - `camera_share_session_starts_total` - Successful stream acquisitions
//! - `camera_share_acquisition_failures_total{kind}` - Failed acquisitions by error kind
//! - `camera_share_captures_total` - Stills captured
//! - `camera_share_deliveries_total{method}` - Successful deliveries by route
//! - `camera_share_delivery_failures_total{kind}` - Failed deliveries by error kind
//! - `camera_share_recompression_attempts_total` - JPEG encodes spent fitting payloads
//! - `camera_share_last_payload_bytes` - Size of the last payload sent to the host
//!
//! # Example
//!
//! ```
//! use camera_share::metrics::MetricsRegistry;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.record_capture();
//! assert!(registry.encode().unwrap().contains("camera_share_captures_total 1"));
//! ```

mod collector;

pub use collector::{MetricsError, MetricsRegistry};
