//! Event-frame decoding for line-delimited token streams.
//!
//! The upstream transport delivers opaque byte chunks whose boundaries carry
//! no relation to logical event boundaries: one chunk may hold several
//! events, half an event, or split a multi-byte UTF-8 sequence. The decoder
//! reassembles complete lines out of that stream.
//!
//! Buffering happens at the byte level and text conversion only runs on
//! complete lines, so a codepoint split across two chunks is never torn: its
//! bytes sit in the pending buffer until the line they belong to terminates.

use std::fmt;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use crate::error::RelayError;

/// Literal marker a line must start with to qualify as an event.
pub const EVENT_MARKER: &str = "data:";

/// Incremental line reassembler.
///
/// Owns the pending buffer for one relay operation: after any number of
/// [`push`](Self::push) calls it holds exactly the suffix of received bytes
/// not yet terminated by a line break.
#[derive(Debug, Default)]
pub struct EventFrameDecoder {
    pending: Vec<u8>,
}

impl EventFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one raw chunk and return every complete line it unlocked, in
    /// order. Trailing `\r` is trimmed so CRLF upstreams decode the same as
    /// LF upstreams.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Flush any residual bytes as a final best-effort line. Upstreams may
    /// terminate without a trailing delimiter.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.pending);
        if line.ends_with(b"\r") {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes currently buffered and not yet resolved into a complete line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Whether a complete line qualifies as an event. Case-sensitive literal
/// match; blank lines and non-prefixed control lines are discarded upstream
/// of the extractor.
pub fn is_event(line: &str) -> bool {
    line.starts_with(EVENT_MARKER)
}

/// A finite, non-restartable sequence of event lines tied to one upstream
/// connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

/// Turn a fallible byte stream into a lazy stream of qualifying event lines.
///
/// Non-event lines are dropped without error. A transport error ends the
/// stream after surfacing it once.
pub fn event_frames<S, B, E>(byte_stream: S) -> FrameStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let out = async_stream::stream! {
        let mut stream = byte_stream;
        let mut decoder = EventFrameDecoder::new();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    for line in decoder.push(bytes.as_ref()) {
                        if is_event(&line) {
                            yield Ok(line);
                        }
                    }
                }
                Err(e) => {
                    yield Err(RelayError::StreamError(format!("upstream read failed: {e}")));
                    return;
                }
            }
        }

        if let Some(line) = decoder.finish() {
            if is_event(&line) {
                yield Ok(line);
            }
        }
    };

    Box::pin(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn decode_all(chunks: &[&[u8]]) -> Vec<String> {
        let mut decoder = EventFrameDecoder::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(decoder.push(chunk));
        }
        lines.extend(decoder.finish());
        lines
    }

    #[test]
    fn single_chunk_splits_into_lines() {
        let lines = decode_all(&[b"data: a\ndata: b\n\n"]);
        assert_eq!(lines, vec!["data: a", "data: b", ""]);
    }

    #[test]
    fn event_split_across_chunks_is_reassembled() {
        let lines = decode_all(&[b"data: {\"con", b"tent\":\"hi\"}\n"]);
        assert_eq!(lines, vec!["data: {\"content\":\"hi\"}"]);
    }

    #[test]
    fn multibyte_codepoint_split_across_chunks_survives() {
        let text = "data: héllo\n".as_bytes();
        // Split inside the two-byte 'é' sequence.
        let split = text.iter().position(|&b| b == 0xc3).unwrap() + 1;
        let lines = decode_all(&[&text[..split], &text[split..]]);
        assert_eq!(lines, vec!["data: héllo"]);
    }

    #[test]
    fn residual_without_trailing_newline_is_flushed() {
        let lines = decode_all(&[b"data: a\ndata: tail"]);
        assert_eq!(lines, vec!["data: a", "data: tail"]);
    }

    #[test]
    fn crlf_lines_decode_like_lf_lines() {
        let lines = decode_all(&[b"data: a\r\ndata: b\r\n"]);
        assert_eq!(lines, vec!["data: a", "data: b"]);
    }

    #[test]
    fn pending_buffer_holds_exactly_the_unterminated_suffix() {
        let mut decoder = EventFrameDecoder::new();
        decoder.push(b"data: a\npar");
        assert_eq!(decoder.pending_len(), 3);
        decoder.push(b"tial");
        assert_eq!(decoder.pending_len(), 7);
        assert_eq!(decoder.finish(), Some("partial".to_string()));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[tokio::test]
    async fn frame_stream_keeps_only_event_lines() {
        let chunks: Vec<Result<&[u8], std::convert::Infallible>> = vec![
            Ok(b": keep-alive\n".as_slice()),
            Ok(b"data: {\"a\":1}\n\nretry: 100\n".as_slice()),
            Ok(b"data: [DONE]".as_slice()),
        ];
        let mut frames = event_frames(stream::iter(chunks));

        let mut out = Vec::new();
        while let Some(item) = frames.next().await {
            out.push(item.expect("frame"));
        }
        assert_eq!(out, vec!["data: {\"a\":1}", "data: [DONE]"]);
    }

    #[tokio::test]
    async fn transport_error_surfaces_once_and_ends_the_stream() {
        let chunks: Vec<Result<&[u8], &str>> = vec![
            Ok(b"data: first\n".as_slice()),
            Err("connection reset"),
            Ok(b"data: never\n".as_slice()),
        ];
        let mut frames = event_frames(stream::iter(chunks));

        assert_eq!(frames.next().await.unwrap().unwrap(), "data: first");
        let err = frames.next().await.unwrap().unwrap_err();
        assert!(matches!(err, RelayError::StreamError(_)));
        assert!(frames.next().await.is_none());
    }

    mod reassembly_property {
        use super::*;
        use proptest::prelude::*;

        fn decode_one_shot(input: &[u8]) -> Vec<String> {
            decode_all(&[input])
        }

        proptest! {
            // decode(chunked(X)) == decode(X) for arbitrary chunkings,
            // including ones that split multi-byte sequences.
            #[test]
            fn chunking_never_changes_the_decoded_lines(
                input in proptest::collection::vec(any::<u8>(), 0..512),
                cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..8),
            ) {
                let mut offsets: Vec<usize> =
                    cuts.iter().map(|ix| ix.index(input.len() + 1)).collect();
                offsets.push(0);
                offsets.push(input.len());
                offsets.sort_unstable();
                offsets.dedup();

                let chunks: Vec<&[u8]> = offsets
                    .windows(2)
                    .map(|w| &input[w[0]..w[1]])
                    .collect();

                prop_assert_eq!(decode_all(&chunks), decode_one_shot(&input));
            }

            #[test]
            fn utf8_text_roundtrips_under_chunking(
                text in "[a-zA-Z0-9éλ☃ ]{0,64}",
                cut in any::<prop::sample::Index>(),
            ) {
                let bytes = text.as_bytes();
                let split = cut.index(bytes.len() + 1);
                let chunked = decode_all(&[&bytes[..split], &bytes[split..]]);
                let whole = decode_one_shot(bytes);
                prop_assert_eq!(chunked, whole);
            }
        }
    }
}
