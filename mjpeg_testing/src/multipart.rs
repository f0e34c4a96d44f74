//! Builders for multipart stream bodies.

use bytes::Bytes;
use mjpeg_stream::BOUNDARY_MARKER;

/// Encode one part exactly as the camera server writes it.
#[must_use]
pub fn part(payload: &[u8]) -> Vec<u8> { part_with_length(payload.len(), payload) }

/// Encode one part announcing `declared` bytes regardless of the actual
/// payload length.
#[must_use]
pub fn part_with_length(declared: usize, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 96);
    out.extend_from_slice(BOUNDARY_MARKER);
    out.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n");
    out.extend_from_slice(format!("Content-Length: {declared}\r\n\r\n").as_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

/// Concatenate one well-formed part per payload.
#[must_use]
pub fn stream_of<P: AsRef<[u8]>>(payloads: &[P]) -> Vec<u8> {
    payloads
        .iter()
        .flat_map(|payload| part(payload.as_ref()))
        .collect()
}

/// Split `body` into chunks of at most `size` bytes. A `size` of zero is
/// treated as one.
#[must_use]
pub fn chunks(body: &[u8], size: usize) -> Vec<Bytes> {
    body.chunks(size.max(1)).map(Bytes::copy_from_slice).collect()
}
