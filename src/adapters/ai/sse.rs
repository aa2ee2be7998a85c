//! Server-Sent Events framing for chat-completion streams.
//!
//! The body is a sequence of lines; `data: <json>` lines carry one delta
//! frame, `data: [DONE]` ends the stream, anything else is ignored. Network
//! chunks may split a line (or a multi-byte character) anywhere, so bytes are
//! buffered until a newline arrives.

use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;

use crate::ports::{DeltaStream, ReplyError, StreamDelta};

/// One meaningful SSE line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Payload of a `data:` line.
    Data(String),
    /// The `[DONE]` terminator.
    Done,
}

/// Splits a byte stream into SSE frames.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes and returns every frame completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            frames.extend(parse_line(&line));
        }
        frames
    }

    /// Flushes a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(line: &[u8]) -> Option<SseFrame> {
    let text = String::from_utf8_lossy(line);
    let data = text.trim().strip_prefix("data:")?.trim();

    match data {
        "" => None,
        "[DONE]" => Some(SseFrame::Done),
        payload => Some(SseFrame::Data(payload.to_string())),
    }
}

/// Decodes one `data:` payload, folding content and refusal over all choices.
///
/// Returns `None` for payloads that are not a delta frame.
pub fn decode_delta(data: &str) -> Option<StreamDelta> {
    let chunk: StreamResponseChunk = serde_json::from_str(data).ok()?;

    let mut delta = StreamDelta::default();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content {
            delta.content.push_str(&content);
        }
        if let Some(refusal) = choice.delta.refusal {
            delta.refusal.push_str(&refusal);
        }
    }
    Some(delta)
}

struct SseState {
    bytes: Pin<Box<dyn Stream<Item = Result<Vec<u8>, ReplyError>> + Send>>,
    decoder: SseLineDecoder,
    pending: VecDeque<Result<StreamDelta, ReplyError>>,
    finished: bool,
}

impl SseState {
    fn accept(&mut self, frame: SseFrame) {
        if self.finished {
            return;
        }
        match frame {
            SseFrame::Done => self.finished = true,
            SseFrame::Data(data) => match decode_delta(&data) {
                Some(delta) if !delta.is_empty() => self.pending.push_back(Ok(delta)),
                Some(_) => {}
                None => tracing::debug!("Skipping malformed SSE frame: {}", data),
            },
        }
    }
}

/// Turns a raw response body into a stream of deltas.
///
/// Ends at `[DONE]` or at the end of the body. A read error is yielded once
/// and ends the stream.
pub fn delta_stream<S>(bytes: S) -> DeltaStream
where
    S: Stream<Item = Result<Vec<u8>, ReplyError>> + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        decoder: SseLineDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for frame in state.decoder.push(&chunk) {
                        state.accept(frame);
                    }
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    if let Some(frame) = state.decoder.finish() {
                        state.accept(frame);
                    }
                    state.finished = true;
                }
            }
        }
    }))
}

// ----- Wire Types -----

#[derive(Debug, Deserialize)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: WireDelta,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    content: Option<String>,
    refusal: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    async fn collect(chunks: Vec<Result<Vec<u8>, ReplyError>>) -> Vec<Result<StreamDelta, ReplyError>> {
        delta_stream(stream::iter(chunks)).collect().await
    }

    #[test]
    fn decoder_handles_lines_split_across_pushes() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(
            decoder.push(b":1}\n\ndata: [DONE]\n"),
            vec![SseFrame::Data("{\"a\":1}".to_string()), SseFrame::Done]
        );
    }

    #[test]
    fn decoder_keeps_multibyte_characters_intact() {
        let line = "data: caf\u{e9}\n".as_bytes();
        let split = line.len() - 2; // inside the two-byte é
        let mut decoder = SseLineDecoder::new();

        assert!(decoder.push(&line[..split]).is_empty());
        assert_eq!(
            decoder.push(&line[split..]),
            vec![SseFrame::Data("caf\u{e9}".to_string())]
        );
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut decoder = SseLineDecoder::new();
        let frames = decoder.push(b": keep-alive\nevent: ping\nid: 3\r\ndata:{\"x\":1}\r\n\n");
        assert_eq!(frames, vec![SseFrame::Data("{\"x\":1}".to_string())]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some(SseFrame::Done));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn decode_delta_folds_choices() {
        let delta = decode_delta(
            r#"{"choices":[{"delta":{"content":"a"}},{"delta":{"content":"b","refusal":"no"}}]}"#,
        )
        .unwrap();
        assert_eq!(delta.content, "ab");
        assert_eq!(delta.refusal, "no");

        let empty = decode_delta(r#"{"choices":[{"delta":{"content":null}}]}"#).unwrap();
        assert!(empty.is_empty());

        assert_eq!(decode_delta("not json"), None);
    }

    #[tokio::test]
    async fn delta_stream_stops_at_done() {
        let body = format!("{}{}data: [DONE]\n\n{}", frame("He"), frame("llo"), frame("late"));
        let items = collect(vec![Ok(body.into_bytes())]).await;

        let contents: Vec<String> = items.into_iter().map(|i| i.unwrap().content).collect();
        assert_eq!(contents, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn delta_stream_skips_malformed_frames() {
        let body = format!("data: {{oops\n\n{}", frame("ok"));
        let items = collect(vec![Ok(body.into_bytes())]).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().content, "ok");
    }

    #[tokio::test]
    async fn delta_stream_surfaces_read_errors_once() {
        let items = collect(vec![
            Ok(frame("a").into_bytes()),
            Err(ReplyError::stream_read("connection reset")),
            Ok(frame("b").into_bytes()),
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().content, "a");
        assert!(matches!(items[1], Err(ReplyError::StreamRead(_))));
    }

    #[tokio::test]
    async fn delta_stream_without_done_ends_with_body() {
        let body = frame("tail");
        let bytes = body.trim_end().as_bytes().to_vec();
        let items = collect(vec![Ok(bytes)]).await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().content, "tail");
    }
}
