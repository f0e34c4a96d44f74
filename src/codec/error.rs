//! Soft framing errors raised while carving frames out of the stream.
//!
//! None of these errors end a session. The decoder logs them, records a
//! metric, and either falls back to boundary search or skips the affected
//! part and waits for more data.

use thiserror::Error;

/// Framing-level disagreements detected during frame boundary detection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The announced payload was not followed by the boundary marker.
    #[error("{declared} byte payload is not followed by the boundary marker")]
    BoundaryMismatch {
        /// Length announced by the `Content-Length` header.
        declared: usize,
    },

    /// The `Content-Length` value is not a decimal integer.
    #[error("malformed Content-Length value")]
    MalformedLength,

    /// A part grew past the configured maximum without completing.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Bytes announced or buffered for the part.
        size: usize,
        /// Maximum allowed frame size.
        max: usize,
    },

    /// A cumulative delivery was shorter than the bytes already consumed.
    #[error("buffer of {len} bytes is behind consumed offset {consumed}")]
    BufferRegressed {
        /// Length of the offending delivery.
        len: usize,
        /// Bytes already consumed by the decoder.
        consumed: usize,
    },
}

impl FramingError {
    /// Returns the error kind as a static string for metrics and logging.
    ///
    /// # Examples
    ///
    /// ```
    /// use mjpeg_stream::codec::FramingError;
    ///
    /// assert_eq!(FramingError::MalformedLength.kind(), "malformed_length");
    /// ```
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BoundaryMismatch { .. } => "boundary_mismatch",
            Self::MalformedLength => "malformed_length",
            Self::OversizedFrame { .. } => "oversized_frame",
            Self::BufferRegressed { .. } => "buffer_regressed",
        }
    }
}
