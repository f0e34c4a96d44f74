//! Cursor-tracking multipart frame decoder.

use bytes::Bytes;

use super::{
    CONTENT_LENGTH_FIELD,
    DecoderConfig,
    ExtractionStrategy,
    FrameHeader,
    FramingError,
    header::{self, Scan},
};
use crate::frame::Frame;

/// Bytes a boundary-search body may exceed the maximum frame length by
/// before the part is abandoned. Covers the blank lines around the payload.
const TRAILER_ALLOWANCE: usize = 256;

fn leading_whitespace(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Incremental decoder for `multipart/x-mixed-replace` image streams.
///
/// The decoder is fed the cumulative stream seen so far via
/// [`on_data`](Self::on_data) and tracks how much of it has been consumed.
/// Once a header is adopted it is held until its frame has been consumed, so
/// subsequent calls only look at the body that follows it. While no header is
/// adopted, scanned bytes that cannot start one are released, so header-less
/// input never accumulates.
///
/// # Examples
///
/// ```
/// use mjpeg_stream::codec::FrameDecoder;
///
/// let mut decoder = FrameDecoder::default();
/// let mut stream = b"--FRAME\nContent-Type: image/jpeg\nContent-Length: 4\n\nAA".to_vec();
/// assert!(decoder.on_data(&stream).is_none());
///
/// stream.extend_from_slice(b"AA--FRAME");
/// let frame = decoder.on_data(&stream).expect("frame");
/// assert_eq!(frame.payload().as_ref(), b"AAAA");
/// ```
#[derive(Debug, Default)]
pub struct FrameDecoder {
    config: DecoderConfig,
    consumed_offset: usize,
    scan_offset: usize,
    pending: Option<FrameHeader>,
    mismatch_reported: bool,
    sequence: u64,
}

impl FrameDecoder {
    /// Construct a decoder with the provided configuration.
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &DecoderConfig { &self.config }

    /// Absolute stream offset before which every byte has been processed.
    #[must_use]
    pub fn consumed_offset(&self) -> usize { self.consumed_offset }

    /// Returns `true` when no header has been adopted for the next frame.
    #[must_use]
    pub fn awaiting_header(&self) -> bool { self.pending.is_none() }

    /// Header adopted for the frame currently being received.
    #[must_use]
    pub fn pending_header(&self) -> Option<FrameHeader> { self.pending }

    /// Length announced for the frame currently being received.
    #[must_use]
    pub fn pending_frame_length(&self) -> Option<usize> {
        self.pending.and_then(|header| header.declared_length())
    }

    /// Number of frames emitted since construction or the last reset.
    #[must_use]
    pub fn frames_emitted(&self) -> u64 { self.sequence }

    /// Discard all progress, ready for a fresh stream.
    pub fn reset(&mut self) {
        self.consumed_offset = 0;
        self.scan_offset = 0;
        self.pending = None;
        self.mismatch_reported = false;
        self.sequence = 0;
    }

    /// Re-evaluate the stream given every byte received so far.
    ///
    /// Returns at most one frame. `buffer_so_far` must extend the buffer
    /// passed on the previous call; a shorter buffer is logged and ignored.
    pub fn on_data(&mut self, buffer_so_far: &[u8]) -> Option<Frame> {
        let Some(window) = buffer_so_far.get(self.consumed_offset..) else {
            let error = FramingError::BufferRegressed {
                len: buffer_so_far.len(),
                consumed: self.consumed_offset,
            };
            tracing::warn!(%error, "ignoring delivery");
            crate::metrics::inc_framing_errors(&error);
            return None;
        };
        self.decode_window(window)
    }

    /// Lazily yield every frame decodable from `buffer_so_far`.
    ///
    /// With [`HeaderSelection::Latest`](super::HeaderSelection::Latest) this
    /// yields at most one frame, the newest complete one.
    pub fn frames<'a>(&'a mut self, buffer_so_far: &'a [u8]) -> Frames<'a> {
        Frames {
            decoder: self,
            buffer: buffer_so_far,
        }
    }

    /// Decode from `window`, whose first byte sits at the consumed offset.
    pub(crate) fn decode_window(&mut self, window: &[u8]) -> Option<Frame> {
        let base = self.consumed_offset;
        let header = match self.pending {
            Some(header) => header,
            None => {
                let scan_from = self.scan_offset.max(base);
                let rest = window.get(scan_from - base..)?;
                let Scan { header, resume_at } = header::scan(rest, scan_from, &self.config);
                self.scan_offset = resume_at;
                let Some(header) = header else {
                    self.release_scanned(base + window.len());
                    return None;
                };
                tracing::trace!(
                    header_end = header.end(),
                    declared_len = ?header.declared_length(),
                    "adopted frame header"
                );
                self.pending = Some(header);
                self.mismatch_reported = false;
                header
            }
        };

        let Some(body) = header
            .end()
            .checked_sub(base)
            .and_then(|start| window.get(start..))
        else {
            self.clear_pending();
            return None;
        };
        let body_start = header.end();

        if let Some(declared) = header.declared_length() {
            let skip = leading_whitespace(body);
            let content = body.get(skip..).unwrap_or_default();
            if content.len() < declared {
                return None;
            }
            let (payload, rest) = content.split_at(declared);
            let trailer = rest.get(leading_whitespace(rest)..).unwrap_or_default();
            let boundary = self.config.boundary();
            if trailer.is_empty() || trailer.starts_with(boundary) {
                let consumed_to = body_start + skip + declared;
                return Some(self.emit(
                    payload,
                    consumed_to,
                    ExtractionStrategy::LengthDirected,
                    header,
                ));
            }
            if boundary.starts_with(trailer) {
                tracing::trace!(declared, "boundary marker still arriving");
            } else {
                self.report_mismatch(declared);
            }
        }

        self.search_boundary(body, body_start, header)
    }

    /// Warn about a payload not followed by the boundary marker, once per
    /// adopted header.
    fn report_mismatch(&mut self, declared: usize) {
        if self.mismatch_reported {
            return;
        }
        self.mismatch_reported = true;
        let error = FramingError::BoundaryMismatch { declared };
        tracing::warn!(%error, "length-directed extraction failed, searching for boundary");
        crate::metrics::inc_framing_errors(&error);
    }

    /// Release scanned bytes that cannot start a header while no header is
    /// adopted. `window_end` is the absolute end of the delivered bytes.
    fn release_scanned(&mut self, window_end: usize) {
        self.advance(self.scan_offset);
        let retained = window_end.saturating_sub(self.consumed_offset);
        let limit = self.config.max_frame_length().saturating_add(TRAILER_ALLOWANCE);
        if retained > limit {
            // An unterminated header line; keep only a possible field prefix.
            let consumed_to = window_end.saturating_sub(CONTENT_LENGTH_FIELD.len());
            let error = FramingError::OversizedFrame {
                size: retained,
                max: self.config.max_frame_length(),
            };
            tracing::warn!(%error, dropped = consumed_to - self.consumed_offset, "abandoning header line");
            crate::metrics::inc_framing_errors(&error);
            self.advance(consumed_to);
        }
    }

    fn clear_pending(&mut self) {
        self.pending = None;
        self.mismatch_reported = false;
    }

    fn search_boundary(&mut self, body: &[u8], body_start: usize, header: FrameHeader) -> Option<Frame> {
        let boundary_len = self.config.boundary().len();
        if let Some(index) = find(body, self.config.boundary()) {
            let payload = body.get(..index).unwrap_or_default().trim_ascii();
            return Some(self.emit(
                payload,
                body_start + index,
                ExtractionStrategy::BoundarySearch,
                header,
            ));
        }

        let limit = self.config.max_frame_length().saturating_add(TRAILER_ALLOWANCE);
        if body.len() > limit {
            // Keep a tail that may hold the start of a boundary marker.
            let keep = boundary_len.saturating_sub(1).min(body.len());
            let consumed_to = body_start + body.len() - keep;
            let error = FramingError::OversizedFrame {
                size: body.len(),
                max: self.config.max_frame_length(),
            };
            tracing::warn!(%error, dropped = consumed_to - self.consumed_offset, "abandoning part");
            crate::metrics::inc_framing_errors(&error);
            self.advance(consumed_to);
            self.clear_pending();
            return None;
        }

        tracing::trace!(buffered = body.len(), "waiting for more data");
        None
    }

    fn advance(&mut self, consumed_to: usize) {
        debug_assert!(consumed_to >= self.consumed_offset, "consumed offset moved backwards");
        self.consumed_offset = self.consumed_offset.max(consumed_to);
        self.scan_offset = self.scan_offset.max(self.consumed_offset);
    }

    fn emit(
        &mut self,
        payload: &[u8],
        consumed_to: usize,
        strategy: ExtractionStrategy,
        header: FrameHeader,
    ) -> Frame {
        self.advance(consumed_to);
        self.clear_pending();
        self.sequence += 1;
        tracing::debug!(
            decoded_len = payload.len(),
            declared_len = ?header.declared_length(),
            strategy = strategy.as_str(),
            sequence = self.sequence,
            "frame extracted"
        );
        crate::metrics::inc_frames(strategy);
        Frame::new(
            Bytes::copy_from_slice(payload),
            header.declared_length(),
            strategy,
            self.sequence,
        )
    }
}

/// Iterator over the frames decodable from one cumulative buffer.
///
/// Created by [`FrameDecoder::frames`].
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
    buffer: &'a [u8],
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> { self.decoder.on_data(self.buffer) }
}
