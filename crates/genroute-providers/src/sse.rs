//! Incremental Server-Sent-Events decoder for token streaming.
//!
//! [`SseDecoder`] is a pull-based state machine: each [`next_chunk`] call
//! drains already-decoded chunks first, then reads from the byte source,
//! appends to the line buffer, and processes every complete line. The
//! trailing partial line stays buffered until the next read.
//!
//! Only `data: ` lines matter. `data: [DONE]` is skipped without ending the
//! stream, malformed JSON is skipped, and a vendor-specific extractor pulls
//! the delta text out of each payload.
//!
//! [`next_chunk`]: SseDecoder::next_chunk

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, trace};

use genroute_core::{GenError, Result};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Pulls the newly generated text out of one parsed SSE payload.
pub type DeltaExtractor = fn(&Value) -> Option<String>;

/// Lazy, single-pass sequence of text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Decodes a byte stream of SSE lines into text deltas.
pub struct SseDecoder<S> {
    /// Byte source; dropped as soon as it ends or fails.
    source: Option<S>,
    /// Bytes of the current, not yet terminated line.
    buffer: Vec<u8>,
    /// Chunks decoded from the last read but not yet handed out.
    pending: VecDeque<String>,
    extract: DeltaExtractor,
    provider: &'static str,
}

impl<S, B, E> SseDecoder<S>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    pub fn new(source: S, provider: &'static str, extract: DeltaExtractor) -> Self {
        Self {
            source: Some(source),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            extract,
            provider,
        }
    }

    /// Whether the source has been released.
    pub fn is_done(&self) -> bool {
        self.source.is_none() && self.pending.is_empty()
    }

    /// Next text chunk, `Ok(None)` at end of stream.
    ///
    /// A read error is returned once; the source is released first and every
    /// later call yields `Ok(None)`.
    pub async fn next_chunk(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Ok(Some(chunk));
            }

            let Some(source) = self.source.as_mut() else {
                return Ok(None);
            };

            match source.next().await {
                Some(Ok(bytes)) => self.feed(bytes.as_ref()),
                Some(Err(e)) => {
                    self.release();
                    return Err(GenError::provider(
                        self.provider,
                        format!("stream read failed: {e}"),
                    ));
                }
                None => {
                    // A final line without a trailing newline still counts.
                    let rest = std::mem::take(&mut self.buffer);
                    self.process_line(&rest);
                    self.release();
                    debug!(provider = self.provider, "stream finished");
                }
            }
        }
    }

    fn release(&mut self) {
        self.source = None;
        self.buffer.clear();
    }

    fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line[..line.len() - 1]);
        }
    }

    fn process_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == DONE_SENTINEL {
            return;
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                trace!(provider = self.provider, error = %e, "skipping malformed SSE payload");
                return;
            }
        };

        if let Some(text) = (self.extract)(&value).filter(|t| !t.is_empty()) {
            self.pending.push_back(text);
        }
    }
}

impl<S, B, E> SseDecoder<S>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    /// Adapt into a boxed [`Stream`] of chunks.
    pub fn into_stream(self) -> TextStream {
        Box::pin(futures_util::stream::unfold(self, |mut decoder| async move {
            decoder
                .next_chunk()
                .await
                .transpose()
                .map(|item| (item, decoder))
        }))
    }
}

// ─────────────────────────────────────────────
// Vendor delta extractors
// ─────────────────────────────────────────────

/// OpenAI-compatible chat: `choices[0].delta.content`.
pub fn openai_delta(value: &Value) -> Option<String> {
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(String::from)
}

/// Anthropic messages: `content_block_delta` events carry `delta.text`.
pub fn anthropic_delta(value: &Value) -> Option<String> {
    if value.get("type").and_then(Value::as_str) != Some("content_block_delta") {
        return None;
    }
    value
        .pointer("/delta/text")
        .and_then(Value::as_str)
        .map(String::from)
}

/// Gemini: concatenated `candidates[0].content.parts[*].text`.
pub fn gemini_delta(value: &Value) -> Option<String> {
    let parts = value.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    type Chunk = std::result::Result<Vec<u8>, String>;

    fn source(parts: &[&str]) -> impl Stream<Item = Chunk> + Unpin {
        let items: Vec<Chunk> = parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(items)
    }

    async fn collect<S>(mut decoder: SseDecoder<S>) -> Vec<String>
    where
        S: Stream<Item = Chunk> + Unpin,
    {
        let mut out = Vec::new();
        while let Some(chunk) = decoder.next_chunk().await.unwrap() {
            out.push(chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_single_chunk_then_done() {
        let decoder = SseDecoder::new(
            source(&[
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n",
                "data: [DONE]\n",
            ]),
            "openai",
            openai_delta,
        );
        assert_eq!(collect(decoder).await, vec!["Hi"]);
    }

    #[tokio::test]
    async fn test_malformed_json_skipped() {
        let decoder = SseDecoder::new(
            source(&[
                "data: not-json\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            ]),
            "openai",
            openai_delta,
        );
        assert_eq!(collect(decoder).await, vec!["ok"]);
    }

    #[tokio::test]
    async fn test_only_malformed_yields_nothing() {
        let decoder = SseDecoder::new(source(&["data: not-json\n"]), "openai", openai_delta);
        assert!(collect(decoder).await.is_empty());
    }

    #[tokio::test]
    async fn test_lines_split_across_reads() {
        let decoder = SseDecoder::new(
            source(&[
                "data: {\"choices\":[{\"del",
                "ta\":{\"content\":\"Hel\"}}]}\ndata: {\"choices\":[{\"delta\":",
                "{\"content\":\"lo\"}}]}\n\n",
            ]),
            "openai",
            openai_delta,
        );
        assert_eq!(collect(decoder).await, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_done_does_not_end_stream() {
        let decoder = SseDecoder::new(
            source(&[
                "data: [DONE]\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
            ]),
            "openai",
            openai_delta,
        );
        assert_eq!(collect(decoder).await, vec!["late"]);
    }

    #[tokio::test]
    async fn test_non_data_lines_and_crlf() {
        let decoder = SseDecoder::new(
            source(&[
                ": keep-alive\r\n",
                "event: message\r\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n",
            ]),
            "openai",
            openai_delta,
        );
        assert_eq!(collect(decoder).await, vec!["x"]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let decoder = SseDecoder::new(
            source(&["data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"]),
            "openai",
            openai_delta,
        );
        assert_eq!(collect(decoder).await, vec!["tail"]);
    }

    #[tokio::test]
    async fn test_multibyte_split_across_reads() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"héllo\"}}]}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let items: Vec<Chunk> = vec![Ok(line[..split].to_vec()), Ok(line[split..].to_vec())];
        let decoder = SseDecoder::new(stream::iter(items), "openai", openai_delta);
        assert_eq!(collect(decoder).await, vec!["héllo"]);
    }

    #[tokio::test]
    async fn test_read_error_releases_source() {
        let items: Vec<Chunk> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n".to_vec()),
            Err("connection reset".to_string()),
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n".to_vec()),
        ];
        let mut decoder = SseDecoder::new(stream::iter(items), "openai", openai_delta);

        assert_eq!(decoder.next_chunk().await.unwrap().as_deref(), Some("a"));
        let err = decoder.next_chunk().await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(decoder.is_done());
        assert!(decoder.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_into_stream_preserves_order() {
        let decoder = SseDecoder::new(
            source(&[
                "data: {\"choices\":[{\"delta\":{\"content\":\"1\"}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"2\"}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"3\"}}]}\n",
            ]),
            "openai",
            openai_delta,
        );
        let chunks: Vec<String> = decoder
            .into_stream()
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_anthropic_delta_only_on_block_delta() {
        let delta = serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "Hey"}
        });
        assert_eq!(anthropic_delta(&delta).as_deref(), Some("Hey"));

        let start = serde_json::json!({"type": "message_start", "message": {}});
        assert!(anthropic_delta(&start).is_none());
    }

    #[test]
    fn test_gemini_delta_joins_parts() {
        let value = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "a"}, {"text": "b"}]}}]
        });
        assert_eq!(gemini_delta(&value).as_deref(), Some("ab"));
        assert!(gemini_delta(&serde_json::json!({"usageMetadata": {}})).is_none());
    }

    #[test]
    fn test_openai_delta_ignores_role_only_chunk() {
        let value = serde_json::json!({"choices": [{"delta": {"role": "assistant"}}]});
        assert!(openai_delta(&value).is_none());
    }
}
