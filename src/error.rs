//! Canonical error and result types for the crate.
//!
//! Framing problems are handled inside the decoder and never reach this
//! surface. Consumers only see transport failures and undecodable payloads,
//! and decide for themselves whether to restart the stream.

use std::io;

use thiserror::Error;

use crate::frame::PayloadError;

/// Status reported by a connection when it stops delivering data.
///
/// A deliberately aborted request reports a zero status, which is an
/// expected outcome of cancellation rather than a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The connection was aborted locally.
    Aborted,
    /// An HTTP status code.
    Code(u16),
}

impl From<u16> for ConnectionStatus {
    fn from(code: u16) -> Self {
        if code == 0 {
            Self::Aborted
        } else {
            Self::Code(code)
        }
    }
}

impl ConnectionStatus {
    /// Returns `true` for statuses that indicate a failure worth surfacing.
    ///
    /// # Examples
    ///
    /// ```
    /// use mjpeg_stream::ConnectionStatus;
    ///
    /// assert!(!ConnectionStatus::from(0).is_error());
    /// assert!(!ConnectionStatus::from(200).is_error());
    /// assert!(ConnectionStatus::from(503).is_error());
    /// ```
    #[must_use]
    pub fn is_error(self) -> bool {
        match self {
            Self::Aborted => false,
            Self::Code(code) => !(200..300).contains(&code),
        }
    }
}

/// Failures of the underlying connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("stream request failed with status {code}")]
    Status {
        /// HTTP status code.
        code: u16,
    },
    /// The HTTP client failed to connect or read the body.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The stream URL could not be built.
    #[error("invalid stream url: {0}")]
    Url(#[from] url::ParseError),
    /// Any other I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Returns the error kind as a static string for metrics and logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Http(_) => "http",
            Self::Url(_) => "url",
            Self::Io(_) => "io",
        }
    }
}

/// Errors surfaced to stream consumers.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The connection failed while its session was current.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A frame's payload could not be decoded and was skipped.
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// The stream controller has shut down.
    #[error("stream controller is no longer running")]
    ControllerClosed,
}

impl StreamError {
    /// Returns `true` when reconnecting may help.
    ///
    /// Only transport failures qualify: an undecodable payload is a single
    /// skipped frame, and a closed controller cannot be restarted.
    ///
    /// ```
    /// use mjpeg_stream::{StreamError, TransportError};
    ///
    /// assert!(StreamError::from(TransportError::Status { code: 503 }).should_reconnect());
    /// assert!(!StreamError::ControllerClosed.should_reconnect());
    /// ```
    #[must_use]
    pub fn should_reconnect(&self) -> bool { matches!(self, Self::Transport(_)) }
}

/// Canonical result alias used by `mjpeg_stream` public APIs.
pub type Result<T> = std::result::Result<T, StreamError>;
