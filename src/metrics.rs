//! Metric helpers for `mjpeg_stream`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::{
    codec::{ExtractionStrategy, FramingError},
    error::TransportError,
};

/// Name of the gauge tracking active stream sessions.
pub const SESSIONS_ACTIVE: &str = "mjpeg_sessions_active";
/// Name of the counter tracking decoded frames.
pub const FRAMES_DECODED: &str = "mjpeg_frames_decoded_total";
/// Name of the counter tracking soft framing errors.
pub const FRAMING_ERRORS: &str = "mjpeg_framing_errors_total";
/// Name of the counter tracking transport failures.
pub const TRANSPORT_ERRORS: &str = "mjpeg_transport_errors_total";

/// Increment the active sessions gauge.
pub fn inc_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).increment(1.0);
}

/// Decrement the active sessions gauge.
pub fn dec_sessions() {
    #[cfg(feature = "metrics")]
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
}

/// Record a decoded frame for the strategy that produced it.
pub fn inc_frames(strategy: ExtractionStrategy) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_DECODED, "strategy" => strategy.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = strategy;
}

/// Record a soft framing error.
pub fn inc_framing_errors(error: &FramingError) {
    #[cfg(feature = "metrics")]
    counter!(FRAMING_ERRORS, "kind" => error.kind()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = error;
}

/// Record a transport failure surfaced to the consumer.
pub fn inc_transport_errors(error: &TransportError) {
    #[cfg(feature = "metrics")]
    counter!(TRANSPORT_ERRORS, "kind" => error.kind()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = error;
}
