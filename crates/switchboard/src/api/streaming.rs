//! Stream normalization: provider-framed chunks in, plain text chunks out.
//!
//! Provider clients yield raw byte chunks, each holding zero or more
//! newline-terminated *stream parts*. [`normalize`] turns every incoming
//! chunk into exactly one outgoing chunk holding the concatenated text of
//! its parts, so fragment boundaries follow the provider's boundaries and
//! nothing is buffered across chunks.
//!
//! Two line framings are understood:
//!
//! - JSON object: `{"value":"Hel"}`, optionally with `"type"` (`"text"`,
//!   `"error"`, or anything else for non-text payloads).
//! - Code-prefixed: `0:"Hel"` where `0` is text, `3` is an error, and any
//!   other code carries a non-text payload.
//!
//! Empty lines are skipped. Non-text parts, and text parts whose value is
//! not a string, contribute nothing. A line that parses as neither framing
//! is a [`StreamError::MalformedPart`]; an error part becomes
//! [`StreamError::ProviderReported`]. Neither is swallowed.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::api::timeouts::{TimeoutHandle, TimeoutRegistry};
use crate::error::StreamError;

/// A boxed stream of byte chunks, raw or normalized.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// Code used for text parts in the prefixed framing.
pub const TEXT_PART_CODE: &str = "0";

/// Code used for error parts in the prefixed framing.
pub const ERROR_PART_CODE: &str = "3";

/// One parsed line of a provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    Text(String),
    Error(String),
    /// Any part that carries no text (tool calls, metadata, finish markers).
    Data {
        kind: String,
        value: serde_json::Value,
    },
}

#[derive(Deserialize)]
struct ObjectPart {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    value: serde_json::Value,
}

fn malformed(line: &str, reason: impl Into<String>) -> StreamError {
    StreamError::MalformedPart {
        line: line.to_string(),
        reason: reason.into(),
    }
}

fn error_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Parse one non-empty line into a [`StreamPart`].
pub fn parse_stream_part(line: &str) -> Result<StreamPart, StreamError> {
    let line = line.trim();
    if line.starts_with('{') {
        let part: ObjectPart = serde_json::from_str(line).map_err(|e| malformed(line, e.to_string()))?;
        return match part.kind.as_deref() {
            None | Some("text") => match part.value {
                serde_json::Value::String(text) => Ok(StreamPart::Text(text)),
                other => Ok(StreamPart::Data {
                    kind: part.kind.unwrap_or_default(),
                    value: other,
                }),
            },
            Some("error") => Ok(StreamPart::Error(error_text(part.value))),
            Some(kind) => Ok(StreamPart::Data {
                kind: kind.to_string(),
                value: part.value,
            }),
        };
    }

    let Some((code, payload)) = line.split_once(':') else {
        return Err(malformed(line, "missing part code"));
    };
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(malformed(line, "invalid part code"));
    }
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| malformed(line, e.to_string()))?;
    match code {
        TEXT_PART_CODE => match value {
            serde_json::Value::String(text) => Ok(StreamPart::Text(text)),
            other => Ok(StreamPart::Data {
                kind: code.to_string(),
                value: other,
            }),
        },
        ERROR_PART_CODE => Ok(StreamPart::Error(error_text(value))),
        _ => Ok(StreamPart::Data {
            kind: code.to_string(),
            value,
        }),
    }
}

/// Normalize a single chunk into the text it carries.
pub fn normalize_chunk(chunk: &[u8]) -> Result<Bytes, StreamError> {
    let text = std::str::from_utf8(chunk).map_err(|_| StreamError::InvalidUtf8)?;
    let mut out = String::new();
    for line in text.split('\n') {
        if line.trim().is_empty() {
            continue;
        }
        match parse_stream_part(line)? {
            StreamPart::Text(value) => out.push_str(&value),
            StreamPart::Error(message) => return Err(StreamError::ProviderReported(message)),
            StreamPart::Data { kind, .. } => trace!("Skipping non-text stream part {kind:?}"),
        }
    }
    Ok(Bytes::from(out))
}

/// Transform a raw provider stream into a plain text stream.
///
/// Single pass and finite: the output ends when the input ends. Each input
/// chunk yields one output item, in order. Upstream errors pass through.
pub fn normalize<S>(raw: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
{
    Box::pin(raw.map(|item| item.and_then(|chunk| normalize_chunk(&chunk))))
}

/// Encode text as a single prefixed text part line.
pub fn encode_text_part(text: &str) -> String {
    format!(
        "{TEXT_PART_CODE}:{}\n",
        serde_json::Value::String(text.to_string())
    )
}

/// Encode an error message as a single prefixed error part line.
pub fn encode_error_part(message: &str) -> String {
    format!(
        "{ERROR_PART_CODE}:{}\n",
        serde_json::Value::String(message.to_string())
    )
}

/// Drain a normalized stream into a single string.
pub async fn collect_text(mut stream: ChunkStream) -> Result<String, StreamError> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        text.push_str(&String::from_utf8_lossy(&chunk));
    }
    Ok(text)
}

/// Cut a stream off after `limit` with [`StreamError::DeadlineExceeded`].
///
/// The deadline is a timer in `registry` under `key`. It is cancelled when
/// the stream finishes or is dropped early (client disconnect), so no timer
/// outlives the stream it guards.
pub fn with_stream_deadline(
    stream: ChunkStream,
    registry: &TimeoutRegistry,
    key: impl Into<String>,
    limit: Duration,
) -> ChunkStream {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = registry.schedule(
        key,
        move || {
            let _ = tx.send(());
        },
        limit,
    );

    struct Guarded {
        stream: ChunkStream,
        expired: tokio::sync::oneshot::Receiver<()>,
        timer: TimeoutHandle,
        limit: Duration,
        done: bool,
    }

    impl Drop for Guarded {
        fn drop(&mut self) {
            if self.timer.cancel() {
                trace!("Stream deadline {:?} released", self.timer.key());
            }
        }
    }

    let state = Guarded {
        stream,
        expired: rx,
        timer: handle,
        limit,
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        tokio::select! {
            biased;
            item = st.stream.next() => match item {
                Some(item) => Some((item, st)),
                None => {
                    st.timer.cancel();
                    None
                }
            },
            Ok(()) = &mut st.expired => {
                debug!("Stream {:?} exceeded {:?}", st.timer.key(), st.limit);
                st.done = true;
                Some((Err(StreamError::DeadlineExceeded(st.limit)), st))
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(chunks: &[&str]) -> ChunkStream {
        let items: Vec<Result<Bytes, StreamError>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        Box::pin(futures::stream::iter(items))
    }

    async fn fragments(stream: ChunkStream) -> Vec<Result<String, StreamError>> {
        stream
            .map(|r| r.map(|b| String::from_utf8(b.to_vec()).unwrap()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn value_objects_concatenate_per_chunk() {
        let out = fragments(normalize(raw(&["{\"value\":\"Hel\"}\n", "{\"value\":\"lo\"}\n"]))).await;
        assert_eq!(out, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn empty_lines_are_dropped() {
        let out = fragments(normalize(raw(&[
            "{\"value\":\"Hel\"}\n\n\n{\"value\":\"lo\"}\n",
        ])))
        .await;
        assert_eq!(out, vec![Ok("Hello".to_string())]);
    }

    #[tokio::test]
    async fn prefixed_framing() {
        let out = fragments(normalize(raw(&["0:\"a\"\n0:\"b\\n\"\n", "8:{\"x\":1}\n0:\"c\"\n"]))).await;
        assert_eq!(out, vec![Ok("ab\n".to_string()), Ok("c".to_string())]);
    }

    #[tokio::test]
    async fn malformed_line_is_an_error() {
        let out = fragments(normalize(raw(&["0:\"ok\"\n", "not a part\n"]))).await;
        assert_eq!(out[0], Ok("ok".to_string()));
        assert!(matches!(out[1], Err(StreamError::MalformedPart { .. })));
    }

    #[tokio::test]
    async fn non_string_text_value_adds_nothing() {
        let out = fragments(normalize(raw(&["0:\"a\"\n0:42\n0:\"b\"\n"]))).await;
        assert_eq!(out, vec![Ok("ab".to_string())]);
    }

    #[tokio::test]
    async fn error_part_surfaces() {
        let out = fragments(normalize(raw(&["0:\"a\"\n3:\"overloaded\"\n"]))).await;
        assert_eq!(
            out,
            vec![Err(StreamError::ProviderReported("overloaded".into()))]
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_error() {
        let items: Vec<Result<Bytes, StreamError>> = vec![Ok(Bytes::from_static(&[0xff, 0xfe]))];
        let out = fragments(normalize(futures::stream::iter(items))).await;
        assert_eq!(out, vec![Err(StreamError::InvalidUtf8)]);
    }

    #[tokio::test]
    async fn upstream_errors_pass_through() {
        let items: Vec<Result<Bytes, StreamError>> = vec![
            Ok(Bytes::from("0:\"x\"\n")),
            Err(StreamError::Upstream("reset".into())),
        ];
        let out = fragments(normalize(futures::stream::iter(items))).await;
        assert_eq!(out[1], Err(StreamError::Upstream("reset".into())));
    }

    #[test]
    fn part_parsing() {
        assert_eq!(
            parse_stream_part("{\"type\":\"text\",\"value\":\"hi\"}").unwrap(),
            StreamPart::Text("hi".into())
        );
        assert_eq!(
            parse_stream_part("{\"type\":\"error\",\"value\":\"bad\"}").unwrap(),
            StreamPart::Error("bad".into())
        );
        assert!(matches!(
            parse_stream_part("{\"value\":{\"tool\":1}}").unwrap(),
            StreamPart::Data { .. }
        ));
        assert!(matches!(
            parse_stream_part("{\"type\":\"text\",\"value\":3}").unwrap(),
            StreamPart::Data { .. }
        ));
        assert!(parse_stream_part("{\"nope\":1}").is_err());
        assert!(matches!(parse_stream_part("0:3").unwrap(), StreamPart::Data { .. }));
        assert!(parse_stream_part("0:nope").is_err());
        assert!(parse_stream_part(":\"x\"").is_err());
        assert!(parse_stream_part("0:\"x\"\r").is_ok());
    }

    #[test]
    fn encoded_parts_round_trip_through_parser() {
        let line = encode_text_part("say \"hi\"\n");
        assert!(line.ends_with('\n'));
        assert_eq!(
            parse_stream_part(&line).unwrap(),
            StreamPart::Text("say \"hi\"\n".into())
        );
        assert_eq!(
            parse_stream_part(&encode_error_part("boom")).unwrap(),
            StreamPart::Error("boom".into())
        );
    }

    #[tokio::test]
    async fn collect_text_joins_fragments() {
        let text = collect_text(normalize(raw(&["0:\"Hel\"\n", "0:\"lo\"\n"]))).await;
        assert_eq!(text.unwrap(), "Hello");
    }

    #[tokio::test(start_paused = true)]
    async fn stream_deadline_cuts_off_slow_stream() {
        let registry = TimeoutRegistry::new();
        let slow: ChunkStream = Box::pin(futures::stream::unfold(0u32, |n| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Some((Ok(Bytes::from(format!("{n}"))), n + 1))
        }));
        let guarded = with_stream_deadline(slow, &registry, "req-1", Duration::from_millis(2500));
        let out: Vec<Result<Bytes, StreamError>> = guarded.collect().await;
        assert_eq!(out.len(), 3);
        assert_eq!(
            out[2],
            Err(StreamError::DeadlineExceeded(Duration::from_millis(2500)))
        );
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_stream_releases_deadline() {
        let registry = TimeoutRegistry::new();
        let guarded = with_stream_deadline(
            raw(&["0:\"a\"\n"]),
            &registry,
            "req-2",
            Duration::from_secs(60),
        );
        assert!(registry.contains("req-2"));
        let text = collect_text(normalize(guarded)).await.unwrap();
        assert_eq!(text, "a");
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_stream_releases_deadline() {
        let registry = TimeoutRegistry::new();
        let guarded = with_stream_deadline(
            raw(&["0:\"a\"\n"]),
            &registry,
            "req-3",
            Duration::from_secs(60),
        );
        drop(guarded);
        assert!(registry.is_empty());
    }
}
