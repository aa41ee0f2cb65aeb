//! Property-based tests for rill_core stream splitting.
//!
//! However a byte stream is cut into chunks, the events coming out of the
//! buffer must be the same as when the whole stream arrives at once.

use proptest::prelude::*;
use rill_core::scanner::{scan_all, DELIMITER};
use rill_core::StreamBuffer;

fn feed(chunks: &[&[u8]]) -> (Vec<String>, StreamBuffer) {
    let mut buffer = StreamBuffer::new();
    let mut events = Vec::new();
    for chunk in chunks {
        let completed = buffer.append(chunk).expect("valid utf-8 input");
        events.extend(completed.into_iter().map(|e| e.into_string()));
    }
    (events, buffer)
}

/// Event texts, possibly empty, possibly multibyte, never containing `\n\n`.
fn event_text() -> impl Strategy<Value = String> {
    "[a-zé日\u{1F600} :\n]{0,12}".prop_map(|s| {
        let mut out = s;
        while out.contains(DELIMITER) {
            out = out.replace(DELIMITER, "\n");
        }
        out.trim_end_matches('\n').to_string()
    })
}

fn stream_of_events() -> impl Strategy<Value = (Vec<String>, String)> {
    (prop::collection::vec(event_text(), 0..8), event_text()).prop_map(|(events, tail)| {
        let mut body = String::new();
        for event in &events {
            body.push_str(event);
            body.push_str(DELIMITER);
        }
        body.push_str(&tail);
        (events, body)
    })
}

/// Cut `bytes` at the given (sorted, deduplicated) positions.
fn split_at_points<'a>(bytes: &'a [u8], points: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for &point in points {
        chunks.push(&bytes[start..point]);
        start = point;
    }
    chunks.push(&bytes[start..]);
    chunks
}

// ============================================================================
// Chunking Independence
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// **Two-way split**: cutting the stream at any single byte offset, even
    /// inside a multibyte character, yields the same events.
    #[test]
    fn any_two_way_split_matches_whole((expected, body) in stream_of_events()) {
        let bytes = body.as_bytes();
        for cut in 0..=bytes.len() {
            let (events, _) = feed(&[&bytes[..cut], &bytes[cut..]]);
            prop_assert_eq!(&events, &expected, "cut at byte {} of {:?}", cut, body);
        }
    }

    /// **Arbitrary fragmentation** agrees with the single-chunk result.
    #[test]
    fn arbitrary_fragmentation_matches_whole(
        (expected, body) in stream_of_events(),
        points in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
    ) {
        let bytes = body.as_bytes();
        let mut cuts: Vec<usize> = points.iter().map(|i| i.index(bytes.len() + 1)).collect();
        cuts.sort_unstable();
        cuts.dedup();

        let (whole, _) = feed(&[bytes]);
        let (fragmented, _) = feed(&split_at_points(bytes, &cuts));
        prop_assert_eq!(&whole, &expected);
        prop_assert_eq!(&fragmented, &whole);
    }

    /// **Byte-at-a-time** delivery is the worst case of fragmentation.
    #[test]
    fn single_byte_chunks_match_whole((expected, body) in stream_of_events()) {
        let chunks: Vec<&[u8]> = body.as_bytes().chunks(1).collect();
        let (events, _) = feed(&chunks);
        prop_assert_eq!(events, expected);
    }
}

// ============================================================================
// Buffer Invariants
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// After every append the pending text holds no complete delimiter.
    #[test]
    fn pending_never_holds_a_delimiter(
        chunks in prop::collection::vec("[ab\n]{0,10}", 0..12),
    ) {
        let mut buffer = StreamBuffer::new();
        for chunk in &chunks {
            buffer.append(chunk.as_bytes()).unwrap();
            prop_assert!(
                !buffer.pending().contains(DELIMITER),
                "pending {:?} after chunks {:?}", buffer.pending(), chunks
            );
        }
    }

    /// The remnant left at the end is exactly what follows the last delimiter.
    #[test]
    fn remnant_is_text_after_last_delimiter(body in "[ab\n]{0,60}") {
        let (_, mut buffer) = feed(&[body.as_bytes()]);
        let (_, rest) = scan_all(&body);
        prop_assert_eq!(buffer.finish().text, rest);
    }

    /// Appending an empty chunk changes nothing.
    #[test]
    fn empty_chunk_is_a_no_op(body in "[ab\n]{0,40}") {
        let mut buffer = StreamBuffer::new();
        buffer.append(body.as_bytes()).unwrap();
        let before = buffer.pending().to_string();

        prop_assert!(buffer.append(b"").unwrap().is_empty());
        prop_assert_eq!(buffer.pending(), before.as_str());
    }

    /// Arbitrary bytes either decode or fail cleanly; never panic.
    #[test]
    fn arbitrary_bytes_never_panic(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..8)) {
        let mut buffer = StreamBuffer::new();
        for chunk in &chunks {
            if buffer.append(chunk).is_err() {
                break;
            }
        }
    }
}
