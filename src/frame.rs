//! Decoded image frames and payload encodings.
//!
//! The camera stream can send JPEG bytes as-is or base64 encoded so the body
//! stays text-safe. [`Frame`] always carries the bytes exactly as framed;
//! [`Frame::decode`] turns an encoded payload into raw image bytes.

use std::{fmt, str::FromStr};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use thiserror::Error;

use crate::codec::ExtractionStrategy;

/// Encoding applied to each part's payload on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// Raw JPEG bytes.
    #[default]
    Binary,
    /// Base64 text wrapping the JPEG bytes.
    Base64,
}

impl PayloadEncoding {
    /// Returns the encoding name as used in the stream's `encoding` query
    /// parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Base64 => "base64",
        }
    }
}

impl fmt::Display for PayloadEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Error returned when parsing an unknown [`PayloadEncoding`] name.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown payload encoding: {0}")]
pub struct UnknownEncoding(pub String);

impl FromStr for PayloadEncoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" | "raw" => Ok(Self::Binary),
            "base64" => Ok(Self::Base64),
            other => Err(UnknownEncoding(other.to_owned())),
        }
    }
}

/// Errors raised while decoding a frame's payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The payload is not valid base64.
    #[error("frame {sequence} carries invalid base64")]
    Base64 {
        /// Sequence number of the offending frame.
        sequence: u64,
        /// Underlying decode failure.
        #[source]
        source: base64::DecodeError,
    },
}

/// One image payload carved out of the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
    declared_length: Option<usize>,
    strategy: ExtractionStrategy,
    sequence: u64,
}

impl Frame {
    /// Construct a frame.
    #[must_use]
    pub fn new(
        payload: Bytes,
        declared_length: Option<usize>,
        strategy: ExtractionStrategy,
        sequence: u64,
    ) -> Self {
        Self {
            payload,
            declared_length,
            strategy,
            sequence,
        }
    }

    /// Payload bytes.
    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Consume the frame and return its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }

    /// Length announced by the part's `Content-Length` header, if any.
    #[must_use]
    pub fn declared_length(&self) -> Option<usize> { self.declared_length }

    /// Strategy that produced this frame.
    #[must_use]
    pub fn strategy(&self) -> ExtractionStrategy { self.strategy }

    /// One-based position of the frame within its session.
    #[must_use]
    pub fn sequence(&self) -> u64 { self.sequence }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.payload.len() }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.payload.is_empty() }

    /// Decode the payload from `encoding` into raw image bytes.
    ///
    /// The declared length is kept; it describes the encoded form.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Base64`] if a base64 payload is malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::Bytes;
    /// use mjpeg_stream::{
    ///     codec::ExtractionStrategy,
    ///     frame::{Frame, PayloadEncoding},
    /// };
    ///
    /// let frame = Frame::new(Bytes::from_static(b"/9j/"), Some(4), ExtractionStrategy::LengthDirected, 1);
    /// let decoded = frame.decode(PayloadEncoding::Base64).unwrap();
    /// assert_eq!(decoded.payload().as_ref(), &[0xff, 0xd8, 0xff]);
    /// ```
    pub fn decode(self, encoding: PayloadEncoding) -> Result<Self, PayloadError> {
        match encoding {
            PayloadEncoding::Binary => Ok(self),
            PayloadEncoding::Base64 => {
                let raw = BASE64
                    .decode(&self.payload)
                    .map_err(|source| PayloadError::Base64 {
                        sequence: self.sequence,
                        source,
                    })?;
                Ok(Self {
                    payload: Bytes::from(raw),
                    ..self
                })
            }
        }
    }
}
