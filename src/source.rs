//! Connection sources delivering the raw multipart body.
//!
//! A [`ConnectionSource`] opens one long-lived response and hands back its
//! body as a stream of byte chunks. Sources know nothing about framing; the
//! controller feeds their chunks into the active session.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::TransportError;

mod http;

pub use http::{HttpSource, HttpSourceConfig, boundary_from_content_type};

/// Body of an open connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// An open connection to a frame source.
pub struct Connection {
    boundary: Option<Vec<u8>>,
    body: ByteStream,
}

impl Connection {
    /// Wrap a body stream.
    #[must_use]
    pub fn new(body: ByteStream) -> Self {
        Self {
            boundary: None,
            body,
        }
    }

    /// Record the boundary marker advertised by the response, including its
    /// leading `--`.
    #[must_use]
    pub fn with_boundary(mut self, boundary: Option<Vec<u8>>) -> Self {
        self.boundary = boundary;
        self
    }

    /// Boundary marker advertised by the response, if any.
    #[must_use]
    pub fn boundary(&self) -> Option<&[u8]> { self.boundary.as_deref() }

    /// Split into the advertised boundary and the body stream.
    #[must_use]
    pub fn into_parts(self) -> (Option<Vec<u8>>, ByteStream) { (self.boundary, self.body) }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("boundary", &self.boundary.as_deref().map(String::from_utf8_lossy))
            .finish_non_exhaustive()
    }
}

/// Opens connections to a multipart frame source.
///
/// Dropping the returned [`Connection`] aborts it; implementations must not
/// keep delivering data afterwards.
#[async_trait]
pub trait ConnectionSource: Send + Sync + 'static {
    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the connection cannot be established
    /// or the source answers with a non-success status.
    async fn open(&self) -> Result<Connection, TransportError>;
}
