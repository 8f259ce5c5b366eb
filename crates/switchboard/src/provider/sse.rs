//! Server-Sent Events decoding for upstream provider responses.
//!
//! Upstream chat APIs stream `data:` lines whose boundaries do not line up
//! with network chunks, so this decoder buffers partial lines across chunks.
//! Each decoded payload is handed to a provider-specific extractor, and the
//! resulting text deltas are re-framed as stream parts (one output chunk per
//! network chunk) for [`normalize`](crate::api::streaming::normalize).

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, trace};

use crate::api::streaming::{ChunkStream, encode_error_part, encode_text_part};
use crate::error::StreamError;

/// Incremental SSE line decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk and return the `data:` payloads it completes.
    ///
    /// Bytes are held until their line is complete, so a multi-byte
    /// character split across chunks decodes intact.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(data) = data_payload(&String::from_utf8_lossy(&line)) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&String::from_utf8_lossy(&rest)).into_iter().collect()
    }
}

fn data_payload(line: &str) -> Option<String> {
    let line = line.trim();
    // Blank lines separate events; lines starting with ':' are comments.
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}

/// What a provider-specific extractor found in one SSE payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Text(String),
    Error(String),
    Done,
    Skip,
}

struct FrameState<E> {
    body: std::pin::Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>,
    decoder: SseDecoder,
    extract: fn(&str) -> SseEvent,
    finished: bool,
}

impl<E> FrameState<E> {
    fn frame(&mut self, payloads: Vec<String>) -> String {
        let mut out = String::new();
        for payload in payloads {
            if self.finished {
                break;
            }
            if payload == "[DONE]" {
                self.finished = true;
                break;
            }
            match (self.extract)(&payload) {
                SseEvent::Text(text) if !text.is_empty() => out.push_str(&encode_text_part(&text)),
                SseEvent::Text(_) | SseEvent::Skip => {}
                SseEvent::Error(message) => out.push_str(&encode_error_part(&message)),
                SseEvent::Done => self.finished = true,
            }
        }
        out
    }
}

/// Turn an upstream SSE body into a raw stream of framed parts.
pub fn frame_sse_stream<S, E>(body: S, extract: fn(&str) -> SseEvent) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = FrameState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        extract,
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let payloads = st.decoder.push(&chunk);
                    let framed = st.frame(payloads);
                    if framed.is_empty() {
                        continue;
                    }
                    trace!("Framed {} bytes of stream parts", framed.len());
                    return Some((Ok(Bytes::from(framed)), st));
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(StreamError::Upstream(e.to_string())), st));
                }
                None => {
                    let payloads = st.decoder.finish();
                    let framed = st.frame(payloads);
                    st.finished = true;
                    debug!("Upstream stream ended");
                    if framed.is_empty() {
                        return None;
                    }
                    return Some((Ok(Bytes::from(framed)), st));
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::streaming::{collect_text, normalize};

    fn extract_plain(payload: &str) -> SseEvent {
        if let Some(message) = payload.strip_prefix("err ") {
            return SseEvent::Error(message.to_string());
        }
        match payload {
            "skip" => SseEvent::Skip,
            "stop" => SseEvent::Done,
            p => SseEvent::Text(p.to_string()),
        }
    }

    fn body(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, String>> + Send + 'static {
        let items: Vec<Result<Bytes, String>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        futures::stream::iter(items)
    }

    #[test]
    fn decoder_buffers_partial_lines() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: hel").is_empty());
        assert_eq!(dec.push(b"lo\n\n: comment\ndata:x\n"), vec!["hello", "x"]);
        assert!(dec.finish().is_empty());
    }

    #[test]
    fn decoder_flushes_trailing_line() {
        let mut dec = SseDecoder::new();
        dec.push(b"data: tail");
        assert_eq!(dec.finish(), vec!["tail"]);
    }

    #[test]
    fn decoder_keeps_characters_split_across_chunks() {
        let mut dec = SseDecoder::new();
        assert!(dec.push(b"data: caf\xC3").is_empty());
        assert_eq!(dec.push(b"\xA9\n"), vec!["café"]);
    }

    #[tokio::test]
    async fn split_multibyte_text_survives_framing() {
        let items: Vec<Result<Bytes, String>> = vec![
            Ok(Bytes::from_static(b"data: caf\xC3")),
            Ok(Bytes::from_static(b"\xA9 \xE6\x97")),
            Ok(Bytes::from_static(b"\xA5\n")),
        ];
        let raw = frame_sse_stream(futures::stream::iter(items), extract_plain);
        let text = collect_text(normalize(raw)).await.unwrap();
        assert_eq!(text, "café 日");
    }

    #[tokio::test]
    async fn frames_split_events_into_parts() {
        let raw = frame_sse_stream(
            body(&["data: Hel", "lo\ndata: skip\n", "data:  world\n"]),
            extract_plain,
        );
        let text = collect_text(normalize(raw)).await.unwrap();
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn done_marker_stops_stream() {
        let raw = frame_sse_stream(
            body(&["data: a\ndata: [DONE]\ndata: b\n", "data: c\n"]),
            extract_plain,
        );
        let text = collect_text(normalize(raw)).await.unwrap();
        assert_eq!(text, "a");
    }

    #[tokio::test]
    async fn error_events_become_error_parts() {
        let raw = frame_sse_stream(body(&["data: a\ndata: err overloaded\n"]), extract_plain);
        let err = collect_text(normalize(raw)).await.unwrap_err();
        assert_eq!(err, StreamError::ProviderReported("overloaded".into()));
    }

    #[tokio::test]
    async fn transport_errors_end_stream() {
        let items: Vec<Result<Bytes, String>> =
            vec![Ok(Bytes::from_static(b"data: a\n")), Err("reset".into())];
        let raw = frame_sse_stream(futures::stream::iter(items), extract_plain);
        let out: Vec<_> = raw.collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], Err(StreamError::Upstream("reset".into())));
    }
}
