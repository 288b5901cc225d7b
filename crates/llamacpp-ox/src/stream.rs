//! Decoding of `stream: true` chat completions.
//!
//! The transport yields text lines; [`StreamAccumulator`] turns them into one
//! content string and one reasoning string, dropping lines it cannot read.

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream::BoxStream};
use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    error::LlamaCppError, progress::ProgressReporter, response::StreamEvent, split::split_inline,
};

/// Payload that terminates an event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Scale of the progress positions reported while streaming.
pub const PROGRESS_TOTAL: u64 = 1000;

const DATA_PREFIX: &str = "data:";

/// Bookkeeping reported alongside the decoded text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamMeta {
    /// Whether the `[DONE]` sentinel was seen before input ended.
    pub done: bool,
    /// Number of events that decoded to a JSON object.
    pub chunks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Accumulating,
    Done,
}

/// Result of a finished stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOutcome {
    pub content: String,
    pub reasoning: String,
    pub meta: StreamMeta,
}

/// Collects content and reasoning fragments in arrival order.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content_parts: Vec<String>,
    reasoning_parts: Vec<String>,
    meta: StreamMeta,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of the event stream.
    ///
    /// Once the sentinel has been seen every further line is ignored.
    pub fn push_line(&mut self, line: &str) -> DecoderState {
        if self.meta.done {
            return DecoderState::Done;
        }

        let line = line.trim();
        if line.is_empty() {
            return DecoderState::Accumulating;
        }

        let data = line.strip_prefix(DATA_PREFIX).map_or(line, str::trim);
        if data == DONE_SENTINEL {
            self.meta.done = true;
            return DecoderState::Done;
        }

        let Some(event) = StreamEvent::parse(data) else {
            trace!(line = data, "dropping unreadable stream event");
            return DecoderState::Accumulating;
        };

        self.meta.chunks += 1;
        self.push_event(&event);
        DecoderState::Accumulating
    }

    fn push_event(&mut self, event: &StreamEvent) {
        // Some servers replay a whole message per event instead of deltas.
        for part in [event.delta.as_ref(), event.message.as_ref()].into_iter().flatten() {
            if let Some(content) = part.content_fragment() {
                self.content_parts.push(content.to_string());
            }
            if let Some(reasoning) = part.reasoning_fragment() {
                self.reasoning_parts.push(reasoning.to_string());
            }
        }
    }

    /// Join the fragments. Without a dedicated reasoning channel, an inline
    /// `<think>` block in the content is promoted to reasoning.
    pub fn finish(self) -> StreamOutcome {
        let mut content = self.content_parts.concat().trim().to_string();
        let mut reasoning = self.reasoning_parts.concat().trim().to_string();

        if reasoning.is_empty() && !content.is_empty() {
            let split = split_inline(&content);
            if !split.thinking.is_empty() {
                reasoning = split.thinking;
                content = split.answer;
            }
        }

        debug!(
            chunks = self.meta.chunks,
            done = self.meta.done,
            content_len = content.len(),
            reasoning_len = reasoning.len(),
            "stream finished"
        );

        StreamOutcome {
            content,
            reasoning,
            meta: self.meta,
        }
    }
}

/// Decode an in-memory sequence of lines.
pub fn decode_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> StreamOutcome {
    let mut accumulator = StreamAccumulator::new();
    for line in lines {
        if accumulator.push_line(line) == DecoderState::Done {
            break;
        }
    }
    accumulator.finish()
}

/// Decode lines as they arrive, reporting one progress step per line.
///
/// A transport error aborts decoding and is returned as is.
pub async fn decode_line_stream<S, E>(
    lines: S,
    progress: &dyn ProgressReporter,
) -> Result<StreamOutcome, E>
where
    S: Stream<Item = Result<String, E>>,
{
    let mut lines = Box::pin(lines);
    let mut accumulator = StreamAccumulator::new();
    let mut seen: u64 = 0;

    while let Some(line) = lines.next().await {
        let line = line?;
        seen = (seen + 1).min(PROGRESS_TOTAL);
        progress.report(seen, PROGRESS_TOTAL);

        if accumulator.push_line(&line) == DecoderState::Done {
            break;
        }
    }

    Ok(accumulator.finish())
}

/// Split a response body into trimmed, non-blank text lines.
///
/// Lines may straddle chunk boundaries; invalid UTF-8 is replaced rather
/// than rejected so that one bad line cannot end the stream.
pub fn sse_lines<S>(byte_stream: S) -> BoxStream<'static, Result<String, LlamaCppError>>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        let mut byte_stream = Box::pin(byte_stream);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
                if let Some(line) = decode_line(&line_bytes) {
                    yield line;
                }
            }
        }

        if let Some(line) = decode_line(&buffer) {
            yield line;
        }
    })
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(bytes);
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn deltas_are_concatenated_in_order() {
        let outcome = decode_lines([
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            "data: [DONE]",
        ]);
        assert_eq!(outcome.content, "Hello");
        assert_eq!(outcome.reasoning, "");
        assert_eq!(outcome.meta, StreamMeta { done: true, chunks: 2 });
    }

    #[test]
    fn inline_think_block_is_recovered() {
        let outcome = decode_lines([
            r#"data: {"choices":[{"delta":{"content":"<think>pl"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"an</think>"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"result"}}]}"#,
            "data: [DONE]",
        ]);
        assert_eq!(outcome.reasoning, "plan");
        assert_eq!(outcome.content, "result");
    }

    #[test]
    fn dedicated_reasoning_channel_keeps_inline_markers() {
        let outcome = decode_lines([
            r#"data: {"choices":[{"delta":{"reasoning_content":"think "}}]}"#,
            r#"data: {"choices":[{"delta":{"reasoning":"hard"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"<think>x</think>y"}}]}"#,
        ]);
        assert_eq!(outcome.reasoning, "think hard");
        assert_eq!(outcome.content, "<think>x</think>y");
        assert!(!outcome.meta.done);
    }

    #[test]
    fn malformed_events_are_skipped() {
        let outcome = decode_lines([
            "data: {not json",
            "data: [1, 2, 3]",
            ": keep-alive comment",
            "",
            r#"data: {"choices":[{"delta":{"content":"ok"}}]}"#,
            r#"{"choices":[{"delta":{"content":"!"}}]}"#,
            "data: [DONE]",
        ]);
        assert_eq!(outcome.content, "ok!");
        assert_eq!(outcome.meta.chunks, 2);
        assert!(outcome.meta.done);
    }

    #[test]
    fn events_without_choices_still_count() {
        let outcome = decode_lines([
            r#"data: {"choices":[]}"#,
            r#"data: {"usage":{"total_tokens":3}}"#,
            r#"data: {"choices":[{"delta":{"content":"x"}}]}"#,
        ]);
        assert_eq!(outcome.content, "x");
        assert_eq!(outcome.meta.chunks, 3);
    }

    #[test]
    fn full_message_replays_are_accumulated() {
        let outcome = decode_lines([
            r#"data: {"choices":[{"message":{"content":"part one, ","thoughts":"t1"}}]}"#,
            r#"data: {"choices":[{"message":{"content":"part two","thoughts":" t2"}}]}"#,
            "data: [DONE]",
        ]);
        assert_eq!(outcome.content, "part one, part two");
        assert_eq!(outcome.reasoning, "t1 t2");
    }

    #[test]
    fn nothing_after_sentinel_is_consumed() {
        let outcome = decode_lines([
            r#"data: {"choices":[{"delta":{"content":"a"}}]}"#,
            "data: [DONE]",
            r#"data: {"choices":[{"delta":{"content":"b"}}]}"#,
        ]);
        assert_eq!(outcome.content, "a");
        assert_eq!(outcome.meta.chunks, 1);
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let lines = futures_util::stream::iter(vec![
            Ok(r#"data: {"choices":[{"delta":{"content":"a"}}]}"#.to_string()),
            Err("connection reset"),
        ]);
        let result = decode_line_stream(lines, &crate::progress::NoProgress).await;
        assert_eq!(result, Err("connection reset"));
    }

    #[tokio::test]
    async fn progress_is_reported_per_line_and_capped() {
        let positions = Mutex::new(Vec::new());
        let reporter = |position: u64, total: u64| {
            assert_eq!(total, PROGRESS_TOTAL);
            positions.lock().unwrap().push(position);
        };

        let mut lines: Vec<Result<String, ()>> = (0..1005)
            .map(|_| Ok(r#"data: {"choices":[{"delta":{"content":"."}}]}"#.to_string()))
            .collect();
        lines.push(Ok("data: [DONE]".to_string()));

        let outcome = decode_line_stream(futures_util::stream::iter(lines), &reporter)
            .await
            .unwrap();

        assert_eq!(outcome.meta.chunks, 1005);
        let positions = positions.into_inner().unwrap();
        assert_eq!(positions.len(), 1006);
        assert_eq!(positions[0], 1);
        assert_eq!(*positions.last().unwrap(), PROGRESS_TOTAL);
    }

    #[tokio::test]
    async fn sse_lines_reassembles_split_chunks() {
        let chunks: Vec<Result<Bytes, reqwest::Error>> = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":")),
            Ok(Bytes::from_static(b"{\"content\":\"caf\xc3")),
            Ok(Bytes::from_static(b"\xa9\"}}]}\r\n\r\ndata: [DO")),
            Ok(Bytes::from_static(b"NE]")),
        ];
        let lines: Vec<String> = sse_lines(futures_util::stream::iter(chunks))
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(
            lines,
            vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}".to_string(),
                "data: [DONE]".to_string(),
            ]
        );
    }
}
