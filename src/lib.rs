#![doc(html_root_url = "https://docs.rs/mjpeg-stream/latest")]
//! Public API for the `mjpeg_stream` library.
//!
//! This crate consumes `multipart/x-mixed-replace` (MJPEG-over-HTTP) camera
//! streams. It carves JPEG frames out of a single long-lived response as the
//! bytes arrive, and manages the lifecycle of the connection feeding it.
//!
//! - [`codec`]: incremental frame decoder.
//! - [`session`]: epoch-stamped sessions that discard stale deliveries.
//! - [`controller`]: async actor wiring a [`source`] to a [`sink`].

pub mod codec;
pub mod controller;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod session;
pub mod sink;
pub mod source;

pub use codec::{
    BOUNDARY_MARKER,
    DecoderConfig,
    ExtractionStrategy,
    FrameDecoder,
    FrameHeader,
    FramingError,
    HeaderSelection,
    MultipartCodec,
};
pub use controller::{ControllerConfig, StreamController};
pub use error::{ConnectionStatus, Result, StreamError, TransportError};
pub use frame::{Frame, PayloadEncoding, PayloadError};
pub use session::{SessionEpoch, SessionManager, StreamSession};
pub use sink::{FileSink, FrameSink, FrameWatch, LatestFrame, WatchEvent};
pub use source::{Connection, ConnectionSource, HttpSource, HttpSourceConfig};
