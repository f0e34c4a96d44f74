//! Unit tests for the multipart frame decoder.
//!
//! Covers length-directed extraction, the boundary-search fallback,
//! incremental delivery, header selection, and recovery from oversized parts.

use bytes::BytesMut;
use rstest::{fixture, rstest};
use tokio_util::codec::Decoder;
use tracing_test::traced_test;

use super::*;

#[fixture]
fn decoder() -> FrameDecoder { FrameDecoder::default() }

fn payloads(frames: impl IntoIterator<Item = Frame>) -> Vec<Vec<u8>> {
    frames.into_iter().map(|f| f.payload().to_vec()).collect()
}

#[rstest]
fn emits_declared_length_payload(mut decoder: FrameDecoder) {
    let buffer = b"--FRAME\nContent-Type: image/jpeg\nContent-Length: 4\n\nAAAA--FRAME\n";
    let frame = decoder.on_data(buffer).expect("frame");
    assert_eq!(frame.payload().as_ref(), b"AAAA");
    assert_eq!(frame.declared_length(), Some(4));
    assert_eq!(frame.strategy(), ExtractionStrategy::LengthDirected);
    assert!(decoder.awaiting_header());
}

#[rstest]
fn waits_for_remaining_payload(mut decoder: FrameDecoder) {
    let mut buffer = b"--FRAME\nContent-Type: image/jpeg\nContent-Length: 4\n\nAA".to_vec();
    assert!(decoder.on_data(&buffer).is_none());
    assert_eq!(decoder.pending_frame_length(), Some(4));

    buffer.extend_from_slice(b"AA--FRAME");
    let frame = decoder.on_data(&buffer).expect("frame");
    assert_eq!(frame.payload().as_ref(), b"AAAA");
    assert!(decoder.on_data(&buffer).is_none());
}

#[rstest]
fn mismatched_length_falls_back_to_boundary(mut decoder: FrameDecoder) {
    let buffer = b"--FRAME\nContent-Type: image/jpeg\nContent-Length: 4\n\nAAAAA--FRAME";
    let frame = decoder.on_data(buffer).expect("frame");
    assert_eq!(frame.payload().as_ref(), b"AAAAA");
    assert_eq!(frame.strategy(), ExtractionStrategy::BoundarySearch);
    assert_eq!(frame.declared_length(), Some(4));
}

#[rstest]
fn fallback_failure_is_retried_with_length_first(mut decoder: FrameDecoder) {
    let mut buffer = b"Content-Length: 2\n\nABC".to_vec();
    assert!(decoder.on_data(&buffer).is_none());
    assert!(!decoder.awaiting_header());

    buffer.extend_from_slice(b"\r\n--FRAME");
    let frame = decoder.on_data(&buffer).expect("frame");
    assert_eq!(frame.payload().as_ref(), b"ABC");
}

#[rstest]
fn no_header_means_no_frame(mut decoder: FrameDecoder) {
    let buffer = b"--FRAME\r\nContent-Type: image/jpeg\r\n";
    assert!(decoder.on_data(buffer).is_none());
    assert!(decoder.awaiting_header());
    // Only the final line terminator is kept, as context for the next line.
    assert_eq!(decoder.consumed_offset(), buffer.len() - 1);
}

#[rstest]
fn header_value_split_across_deliveries(mut decoder: FrameDecoder) {
    let mut buffer = b"--FRAME\r\nContent-Length: 1".to_vec();
    assert!(decoder.on_data(&buffer).is_none());
    assert!(decoder.awaiting_header());

    buffer.extend_from_slice(b"0\r\n\r\n0123456789\r\n");
    let frame = decoder.on_data(&buffer).expect("frame");
    assert_eq!(frame.payload().as_ref(), b"0123456789");
}

#[rstest]
#[case::crlf(b"--FRAME\r\nContent-Length: 3\r\n\r\nxyz\r\n\r\n--FRAME".as_slice())]
#[case::end_of_buffer(b"Content-Length: 3\n\nxyz".as_slice())]
#[case::blank_trailer(b"Content-Length: 3\n\nxyz\r\n".as_slice())]
fn accepts_trailers_that_lead_into_a_boundary(mut decoder: FrameDecoder, #[case] buffer: &[u8]) {
    let frame = decoder.on_data(buffer).expect("frame");
    assert_eq!(frame.payload().as_ref(), b"xyz");
    assert_eq!(frame.strategy(), ExtractionStrategy::LengthDirected);
}

#[rstest]
fn partial_boundary_defers_until_marker_completes(mut decoder: FrameDecoder) {
    let mut buffer = b"--FRAME\r\nContent-Length: 3\r\n\r\nxyz\r\n\r\n--FR".to_vec();
    assert!(decoder.on_data(&buffer).is_none());
    assert_eq!(decoder.pending_frame_length(), Some(3));

    buffer.extend_from_slice(b"AME\r\n");
    let frame = decoder.on_data(&buffer).expect("frame");
    assert_eq!(frame.payload().as_ref(), b"xyz");
    assert_eq!(frame.strategy(), ExtractionStrategy::LengthDirected);
}

#[rstest]
fn dash_after_declared_bytes_is_not_a_boundary(mut decoder: FrameDecoder) {
    let mut buffer = b"Content-Length: 4\n\nAAAA-".to_vec();
    assert!(decoder.on_data(&buffer).is_none());

    buffer.extend_from_slice(b"B--FRAME");
    let frame = decoder.on_data(&buffer).expect("frame");
    assert_eq!(frame.payload().as_ref(), b"AAAA-B");
    assert_eq!(frame.strategy(), ExtractionStrategy::BoundarySearch);
}

#[rstest]
fn malformed_length_uses_boundary_search(mut decoder: FrameDecoder) {
    let buffer = b"--FRAME\r\nContent-Length: lots\r\n\r\nQUJD\r\n--FRAME\r\n";
    let frame = decoder.on_data(buffer).expect("frame");
    assert_eq!(frame.payload().as_ref(), b"QUJD");
    assert_eq!(frame.declared_length(), None);
    assert_eq!(frame.strategy(), ExtractionStrategy::BoundarySearch);
}

#[rstest]
fn latest_selection_skips_older_parts(mut decoder: FrameDecoder) {
    let buffer = b"--FRAME\nContent-Length: 1\n\nA\n--FRAME\nContent-Length: 2\n\nBB\n--FRAME\nContent-Length: 3\n\nCCC\n";
    assert_eq!(payloads(decoder.frames(buffer)), vec![b"CCC".to_vec()]);
}

#[test]
fn sequential_selection_yields_every_part() {
    let mut decoder = FrameDecoder::new(
        DecoderConfig::default().with_header_selection(HeaderSelection::Sequential),
    );
    let buffer = b"--FRAME\nContent-Length: 1\n\nA\n--FRAME\nContent-Length: 2\n\nBB\n--FRAME\nContent-Length: 3\n\nCCC\n";
    assert_eq!(
        payloads(decoder.frames(buffer)),
        vec![b"A".to_vec(), b"BB".to_vec(), b"CCC".to_vec()]
    );
    assert_eq!(decoder.frames_emitted(), 3);
}

#[rstest]
fn fallback_lags_and_drops_the_part_in_between(mut decoder: FrameDecoder) {
    // Every part under-declares its length, so only boundary search works and
    // the part whose header arrives with the delimiting boundary is skipped.
    let mut buffer = b"--FRAME\nContent-Length: 1\n\nAAA\n".to_vec();
    assert!(decoder.on_data(&buffer).is_none());

    buffer.extend_from_slice(b"--FRAME\nContent-Length: 1\n\nBBB\n--FRAME\nContent-Length: 1\n\nCCC\n");
    let first = decoder.on_data(&buffer).expect("first frame");
    assert_eq!(first.payload().as_ref(), b"AAA");
    assert!(decoder.on_data(&buffer).is_none());

    buffer.extend_from_slice(b"--FRAME\n");
    let second = decoder.on_data(&buffer).expect("second frame");
    assert_eq!(second.payload().as_ref(), b"CCC");
}

#[rstest]
fn consumed_offset_only_moves_forward(mut decoder: FrameDecoder) {
    let mut buffer = Vec::new();
    let mut last = 0;
    for payload in [b"one".as_slice(), b"three", b"five5"] {
        buffer.extend_from_slice(b"--FRAME\r\nContent-Length: ");
        buffer.extend_from_slice(payload.len().to_string().as_bytes());
        buffer.extend_from_slice(b"\r\n\r\n");
        buffer.extend_from_slice(payload);
        buffer.extend_from_slice(b"\r\n\r\n");
        let frame = decoder.on_data(&buffer).expect("frame");
        assert_eq!(frame.payload().as_ref(), payload);
        assert!(decoder.consumed_offset() > last);
        assert!(decoder.consumed_offset() <= buffer.len());
        last = decoder.consumed_offset();
    }
}

#[rstest]
fn shrinking_buffer_is_ignored(mut decoder: FrameDecoder) {
    let buffer = b"Content-Length: 2\n\nAB--FRAME";
    decoder.on_data(buffer).expect("frame");
    assert!(decoder.on_data(b"Con").is_none());
    assert_eq!(decoder.consumed_offset(), 21);
}

#[test]
fn oversized_boundaryless_part_is_abandoned() {
    let config = DecoderConfig::default().with_max_frame_length(MIN_FRAME_LENGTH);
    let mut decoder = FrameDecoder::new(config);

    let mut buffer = b"Content-Length: nope\n\n".to_vec();
    buffer.extend(std::iter::repeat_n(b'x', MIN_FRAME_LENGTH + 512));
    assert!(decoder.on_data(&buffer).is_none());
    assert!(decoder.awaiting_header());
    assert!(decoder.consumed_offset() > MIN_FRAME_LENGTH);

    buffer.extend_from_slice(b"\n--FRAME\nContent-Length: 2\n\nok\n");
    let frame = decoder.on_data(&buffer).expect("frame after resync");
    assert_eq!(frame.payload().as_ref(), b"ok");
}

#[test]
fn headerless_input_is_released() {
    let mut codec = MultipartCodec::default();
    let mut buf = BytesMut::new();
    for _ in 0..64 {
        buf.extend(std::iter::repeat_n(b'x', 64 * 1024));
        assert!(codec.decode(&mut buf).expect("decode").is_none());
        assert!(buf.len() <= CONTENT_LENGTH_FIELD.len());
    }
    assert!(codec.decoder().awaiting_header());
    assert_eq!(
        codec.decoder().consumed_offset(),
        64 * 64 * 1024 - CONTENT_LENGTH_FIELD.len()
    );
}

#[test]
fn header_split_across_released_tail_is_found() {
    let mut codec = MultipartCodec::default();
    let mut buf = BytesMut::from(&b"xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\r\nContent-Le"[..]);
    assert!(codec.decode(&mut buf).expect("decode").is_none());
    assert!(buf.len() <= CONTENT_LENGTH_FIELD.len());

    buf.extend_from_slice(b"ngth: 2\r\n\r\nok\r\n");
    let frame = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(frame.payload().as_ref(), b"ok");
}

#[test]
fn unterminated_header_line_is_abandoned() {
    let config = DecoderConfig::default().with_max_frame_length(MIN_FRAME_LENGTH);
    let mut codec = MultipartCodec::new(config);
    let mut buf = BytesMut::from(&b"\nContent-Length: "[..]);
    buf.extend(std::iter::repeat_n(b'9', 2 * MIN_FRAME_LENGTH));
    assert!(codec.decode(&mut buf).expect("decode").is_none());
    assert!(buf.len() <= CONTENT_LENGTH_FIELD.len());

    buf.extend_from_slice(b"\nContent-Length: 2\n\nok\n");
    let frame = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(frame.payload().as_ref(), b"ok");
}

#[rstest]
fn reset_forgets_progress(mut decoder: FrameDecoder) {
    decoder.on_data(b"Content-Length: 1\n\nA--FRAME").expect("frame");
    decoder.reset();
    assert_eq!(decoder.consumed_offset(), 0);
    assert_eq!(decoder.frames_emitted(), 0);
    let frame = decoder.on_data(b"Content-Length: 1\n\nZ").expect("frame");
    assert_eq!(frame.sequence(), 1);
}

#[test]
fn config_clamps_max_frame_length() {
    let config = DecoderConfig::default().with_max_frame_length(MAX_FRAME_LENGTH + 1);
    assert_eq!(config.max_frame_length(), MAX_FRAME_LENGTH);
    let config = DecoderConfig::default().with_max_frame_length(1);
    assert_eq!(config.max_frame_length(), MIN_FRAME_LENGTH);
}

#[test]
fn empty_boundary_is_ignored() {
    let config = DecoderConfig::default().with_boundary("");
    assert_eq!(config.boundary(), BOUNDARY_MARKER);
}

#[test]
fn codec_advances_source_buffer() {
    let mut codec = MultipartCodec::default();
    let mut buf = BytesMut::from(&b"--FRAME\r\nContent-Length: 2\r\n\r\nhi\r\n\r\n"[..]);
    let frame = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(frame.payload().as_ref(), b"hi");
    assert_eq!(buf.as_ref(), b"\r\n\r\n");
    assert_eq!(codec.decoder().consumed_offset(), 32);

    buf.extend_from_slice(b"--FRAME\r\nContent-Length: 3\r\n\r\nyo!");
    let frame = codec.decode(&mut buf).expect("decode").expect("frame");
    assert_eq!(frame.payload().as_ref(), b"yo!");
    assert_eq!(frame.sequence(), 2);
}

#[test]
fn codec_discards_incomplete_part_at_eof() {
    let mut codec = MultipartCodec::default();
    let mut buf = BytesMut::from(&b"--FRAME\r\nContent-Length: 10\r\n\r\nhalf"[..]);
    assert!(codec.decode_eof(&mut buf).expect("decode").is_none());
    assert!(buf.is_empty());
}

#[rstest]
#[traced_test]
fn logs_extracted_frames(mut decoder: FrameDecoder) {
    decoder.on_data(b"Content-Length: 2\n\nok").expect("frame");
    assert!(logs_contain("frame extracted"));
    assert!(logs_contain("strategy=\"length\""));
}

#[rstest]
#[traced_test]
fn logs_boundary_fallback(mut decoder: FrameDecoder) {
    decoder.on_data(b"Content-Length: 1\n\nAAAA--FRAME").expect("frame");
    assert!(logs_contain("searching for boundary"));
    assert!(logs_contain("not followed by the boundary marker"));
}

#[rstest]
#[traced_test]
fn boundary_mismatch_is_reported_once_per_part(mut decoder: FrameDecoder) {
    let mut buffer = b"Content-Length: 1\n\nAAAA".to_vec();
    for _ in 0..5 {
        assert!(decoder.on_data(&buffer).is_none());
        buffer.extend_from_slice(b"AAAA");
    }
    buffer.extend_from_slice(b"--FRAME");
    decoder.on_data(&buffer).expect("frame");

    logs_assert(|lines: &[&str]| {
        match lines
            .iter()
            .filter(|line| line.contains("searching for boundary"))
            .count()
        {
            1 => Ok(()),
            n => Err(format!("expected one mismatch warning, got {n}")),
        }
    });
}
