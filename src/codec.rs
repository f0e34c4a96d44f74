//! Incremental framing for `multipart/x-mixed-replace` image streams.
//!
//! An MJPEG-over-HTTP response is one long-lived body carrying a sequence of
//! parts:
//!
//! ```text
//! --FRAME
//! Content-Type: image/jpeg
//! Content-Length: <N>
//!
//! <N payload bytes>
//! ```
//!
//! [`FrameDecoder`] carves complete payloads out of the growing body as bytes
//! arrive. It tracks a cursor into the stream so bytes that have already been
//! consumed are never scanned again.
//!
//! # Extraction strategies
//!
//! - [`ExtractionStrategy::LengthDirected`]: take exactly the announced
//!   `Content-Length` bytes and confirm the next boundary marker follows.
//! - [`ExtractionStrategy::BoundarySearch`]: a degraded fallback that treats
//!   everything up to the next boundary marker as the payload. It needs the
//!   following part's marker to be present, so it lags by one part.
//!
//! Framing problems are never fatal. See [`FramingError`] for the soft error
//! taxonomy reported through tracing.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

mod decoder;
pub mod error;
mod header;

pub use decoder::{FrameDecoder, Frames};
pub use error::FramingError;
pub use header::FrameHeader;

use crate::frame::Frame;

/// Boundary marker written by the camera stream before every part.
pub const BOUNDARY_MARKER: &[u8] = b"--FRAME";

/// Header field announcing the encoded payload length.
pub const CONTENT_LENGTH_FIELD: &[u8] = b"Content-Length:";

/// Minimum frame length in bytes.
///
/// Configured maxima are clamped to at least this value.
pub const MIN_FRAME_LENGTH: usize = 1024;

/// Maximum frame length in bytes (64 MiB).
///
/// Configured maxima are clamped to at most this value to bound the memory a
/// single pending part may hold.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Default maximum frame length (8 MiB), enough for base64 encoded stills.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Which header the decoder adopts when several complete headers are
/// waiting in the unconsumed part of the stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeaderSelection {
    /// Jump to the most recent header and skip any older parts.
    ///
    /// Display consumers only care about the newest image, so this is the
    /// default.
    #[default]
    Latest,
    /// Decode every part in arrival order.
    Sequential,
}

/// Method used to carve a frame out of the stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// The payload was taken using the announced `Content-Length`.
    LengthDirected,
    /// The payload was delimited by the next boundary marker.
    BoundarySearch,
}

impl ExtractionStrategy {
    /// Returns the strategy name as a static string for metrics and logging.
    ///
    /// # Examples
    ///
    /// ```
    /// use mjpeg_stream::codec::ExtractionStrategy;
    ///
    /// assert_eq!(ExtractionStrategy::LengthDirected.as_str(), "length");
    /// assert_eq!(ExtractionStrategy::BoundarySearch.as_str(), "boundary");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LengthDirected => "length",
            Self::BoundarySearch => "boundary",
        }
    }
}

/// Configuration for [`FrameDecoder`].
///
/// # Examples
///
/// ```
/// use mjpeg_stream::codec::{DecoderConfig, HeaderSelection};
///
/// let config = DecoderConfig::default()
///     .with_boundary("--myboundary")
///     .with_header_selection(HeaderSelection::Sequential);
/// assert_eq!(config.boundary(), b"--myboundary");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderConfig {
    boundary: Vec<u8>,
    max_frame_length: usize,
    header_selection: HeaderSelection,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            boundary: BOUNDARY_MARKER.to_vec(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            header_selection: HeaderSelection::default(),
        }
    }
}

impl DecoderConfig {
    /// Replace the boundary marker. Empty markers are ignored.
    #[must_use]
    pub fn with_boundary(mut self, boundary: impl AsRef<[u8]>) -> Self {
        let boundary = boundary.as_ref();
        if !boundary.is_empty() {
            self.boundary = boundary.to_vec();
        }
        self
    }

    /// Set the largest payload the decoder will hold while waiting for a
    /// frame. The value is clamped to
    /// [`MIN_FRAME_LENGTH`]`..=`[`MAX_FRAME_LENGTH`].
    #[must_use]
    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = clamp_frame_length(max_frame_length);
        self
    }

    /// Choose how headers are selected when several are pending.
    #[must_use]
    pub fn with_header_selection(mut self, selection: HeaderSelection) -> Self {
        self.header_selection = selection;
        self
    }

    /// Boundary marker separating parts.
    #[must_use]
    pub fn boundary(&self) -> &[u8] { &self.boundary }

    /// Largest payload held while waiting for a frame.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    /// Header selection mode.
    #[must_use]
    pub fn header_selection(&self) -> HeaderSelection { self.header_selection }
}

/// [`FrameDecoder`] exposed as a Tokio [`Decoder`].
///
/// `tokio_util` hands the decoder only the unconsumed suffix of the stream,
/// so the adapter advances `src` by exactly the number of bytes the inner
/// decoder consumed on each call.
///
/// ```
/// use bytes::BytesMut;
/// use mjpeg_stream::codec::MultipartCodec;
/// use tokio_util::codec::Decoder;
///
/// let mut codec = MultipartCodec::default();
/// let mut buf = BytesMut::from(&b"--FRAME\r\nContent-Length: 4\r\n\r\nAAAA\r\n--FRAME"[..]);
/// let frame = codec.decode(&mut buf).unwrap().expect("frame");
/// assert_eq!(frame.payload().as_ref(), b"AAAA");
/// ```
#[derive(Debug, Default)]
pub struct MultipartCodec {
    inner: FrameDecoder,
}

impl MultipartCodec {
    /// Construct a codec with the provided decoder configuration.
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            inner: FrameDecoder::new(config),
        }
    }

    /// Access the wrapped decoder.
    #[must_use]
    pub fn decoder(&self) -> &FrameDecoder { &self.inner }
}

impl Decoder for MultipartCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let before = self.inner.consumed_offset();
        let frame = self.inner.decode_window(src);
        let consumed = self.inner.consumed_offset() - before;
        src.advance(consumed);
        Ok(frame)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            tracing::debug!(
                trailing_bytes = src.len(),
                awaiting_header = self.inner.awaiting_header(),
                "stream ended with an incomplete part"
            );
            src.clear();
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests;
