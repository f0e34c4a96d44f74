//! Location of `Content-Length` headers inside the unconsumed stream.

use super::{CONTENT_LENGTH_FIELD, DecoderConfig, FramingError, HeaderSelection};

/// A `Content-Length` line located in the stream.
///
/// `end` is the absolute stream offset just past the length value. The
/// frame body, including the blank separator line, starts there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    end: usize,
    declared_length: Option<usize>,
}

impl FrameHeader {
    /// Construct a header ending at absolute offset `end`.
    #[must_use]
    pub fn new(end: usize, declared_length: Option<usize>) -> Self {
        Self {
            end,
            declared_length,
        }
    }

    /// Absolute offset just past the header's length value.
    #[must_use]
    pub fn end(&self) -> usize { self.end }

    /// Announced payload length, or `None` when the value was malformed or
    /// exceeded the configured maximum.
    #[must_use]
    pub fn declared_length(&self) -> Option<usize> { self.declared_length }
}

/// Result of scanning a window for headers.
#[derive(Debug)]
pub(crate) struct Scan {
    pub(crate) header: Option<FrameHeader>,
    /// Absolute offset at which the next scan should start. The byte there
    /// only serves as line-start context for a field beginning right after
    /// it; every header that could start before it has been inspected.
    pub(crate) resume_at: usize,
}

fn is_line_end(byte: u8) -> bool { byte == b'\n' || byte == b'\r' }

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse the value of a `Content-Length` line.
///
/// # Errors
///
/// Returns [`FramingError::MalformedLength`] when the value is not a decimal
/// integer and [`FramingError::OversizedFrame`] when it exceeds `max`.
pub(crate) fn parse_length(value: &[u8], max: usize) -> Result<usize, FramingError> {
    let value = value.trim_ascii();
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(FramingError::MalformedLength);
    }
    let size = std::str::from_utf8(value)
        .ok()
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or(FramingError::MalformedLength)?;
    if size > max {
        return Err(FramingError::OversizedFrame { size, max });
    }
    Ok(size)
}

/// Scan `window`, whose first byte sits at absolute offset `base`, for
/// complete `Content-Length` lines.
///
/// A header line only counts once its line terminator has arrived, so a
/// partially received value such as `12` (of `1234`) is never adopted. The
/// first byte of a window past the stream start is context only: a field
/// there cannot be shown to start a line.
pub(crate) fn scan(window: &[u8], base: usize, config: &DecoderConfig) -> Scan {
    let mut header = None;
    let mut cursor = 0;
    let mut resume_at = base;
    let mut partial = None;

    while let Some(found) = window.get(cursor..).and_then(|rest| find(rest, CONTENT_LENGTH_FIELD)) {
        let start = cursor + found;
        cursor = start + 1;

        let at_line_start = match start.checked_sub(1) {
            Some(previous) => window.get(previous).copied().is_some_and(is_line_end),
            None => base == 0,
        };
        if !at_line_start {
            continue;
        }

        let value_start = start + CONTENT_LENGTH_FIELD.len();
        let Some(value_len) = window
            .get(value_start..)
            .and_then(|rest| rest.iter().position(|&b| is_line_end(b)))
        else {
            // Header line still arriving; rescan it from its context byte.
            partial = Some(base + start.saturating_sub(1));
            break;
        };
        let value_end = value_start + value_len;
        cursor = value_end + 1;

        let declared_length = match window
            .get(value_start..value_end)
            .map(|value| parse_length(value, config.max_frame_length()))
        {
            Some(Ok(size)) => Some(size),
            Some(Err(error)) => {
                tracing::warn!(%error, offset = base + start, "unusable Content-Length header");
                crate::metrics::inc_framing_errors(&error);
                None
            }
            None => None,
        };
        header = Some(FrameHeader::new(base + value_end, declared_length));
        resume_at = base + value_end;

        if config.header_selection() == HeaderSelection::Sequential {
            return Scan { header, resume_at };
        }
    }

    // A field cannot start before the last line terminator or within the
    // final field-length bytes without having been seen above.
    if let Some(last_line_end) = window.iter().rposition(|&b| is_line_end(b)) {
        resume_at = resume_at.max(base + last_line_end);
    }
    resume_at = resume_at.max(base + window.len().saturating_sub(CONTENT_LENGTH_FIELD.len()));
    if let Some(partial) = partial {
        resume_at = resume_at.min(partial);
    }
    Scan { header, resume_at }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn config() -> DecoderConfig { DecoderConfig::default() }

    #[rstest]
    #[case(b"4", Ok(4))]
    #[case(b" 128 ", Ok(128))]
    #[case(b"", Err(FramingError::MalformedLength))]
    #[case(b"12x", Err(FramingError::MalformedLength))]
    #[case(b"-3", Err(FramingError::MalformedLength))]
    #[case(b"99999999999999999999999999", Err(FramingError::MalformedLength))]
    fn parses_length_values(#[case] value: &[u8], #[case] expected: Result<usize, FramingError>) {
        assert_eq!(parse_length(value, 1 << 20), expected);
    }

    #[test]
    fn rejects_lengths_above_maximum() {
        assert_eq!(
            parse_length(b"2048", 1024),
            Err(FramingError::OversizedFrame {
                size: 2048,
                max: 1024
            })
        );
    }

    #[test]
    fn locates_header_and_reports_absolute_end() {
        let window = b"--FRAME\r\nContent-Length: 4\r\n\r\nAAAA";
        let scan = scan(window, 100, &config());
        let header = scan.header.expect("header");
        assert_eq!(header.declared_length(), Some(4));
        assert_eq!(header.end(), 100 + 26);
    }

    #[test]
    fn ignores_header_without_line_terminator() {
        let scan = scan(b"--FRAME\r\nContent-Length: 12", 0, &config());
        assert!(scan.header.is_none());
        assert_eq!(scan.resume_at, 8);
    }

    #[test]
    fn resumes_near_window_end_without_line_breaks() {
        let window = vec![b'x'; 4096];
        let scan = scan(&window, 10, &config());
        assert!(scan.header.is_none());
        assert_eq!(scan.resume_at, 10 + 4096 - CONTENT_LENGTH_FIELD.len());
    }

    #[rstest]
    #[case(0, true)]
    #[case(7, false)]
    fn first_byte_starts_a_line_only_at_stream_start(#[case] base: usize, #[case] found: bool) {
        let scan = scan(b"Content-Length: 4
", base, &config());
        assert_eq!(scan.header.is_some(), found);
    }

    #[test]
    fn latest_selection_picks_last_header() {
        let window = b"Content-Length: 1\n\nA--FRAME\nContent-Length: 2\n\nBB";
        let header = scan(window, 0, &config()).header.expect("header");
        assert_eq!(header.declared_length(), Some(2));
    }

    #[test]
    fn sequential_selection_picks_first_header() {
        let window = b"Content-Length: 1\n\nA--FRAME\nContent-Length: 2\n\nBB";
        let config = config().with_header_selection(HeaderSelection::Sequential);
        let scan = scan(window, 0, &config);
        let header = scan.header.expect("header");
        assert_eq!(header.declared_length(), Some(1));
        assert_eq!(scan.resume_at, 17);
    }

    #[test]
    fn field_must_start_a_line() {
        let scan = scan(b"X-Content-Length: 4\n", 0, &config());
        assert!(scan.header.is_none());
    }

    #[test]
    fn malformed_value_yields_header_without_length() {
        let header = scan(b"Content-Length: many\n", 0, &config())
            .header
            .expect("header");
        assert_eq!(header.declared_length(), None);
    }
}
