//! Utilities for exercising `mjpeg_stream` without a camera.
//!
//! - [`multipart`] builds stream bodies in the camera's wire format.
//! - [`ScriptedSource`] is an in-memory [`ConnectionSource`] whose
//!   connections are fed by the test.
//! - [`RecordingSink`] captures every frame and error the controller emits.
//!
//! ```rust
//! use mjpeg_testing::multipart::part;
//!
//! let body = part(b"AAAA");
//! assert!(body.starts_with(b"--FRAME\r\n"));
//! ```
//!
//! [`ConnectionSource`]: mjpeg_stream::ConnectionSource

pub mod multipart;
pub mod sink;
pub mod source;

pub use multipart::{chunks, part, part_with_length, stream_of};
pub use sink::{Recorded, RecordingSink, next_recorded};
pub use source::{ConnectionFeed, ScriptedSource};
