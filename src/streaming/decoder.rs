//! Incremental line decoder and per-backend frame parsers
//!
//! Network chunks arrive at arbitrary boundaries; a line may span
//! several chunks and a chunk may carry several lines. The decoder
//! buffers bytes and yields only complete lines, so a UTF-8 sequence
//! split across chunks is never broken apart. Malformed frames are
//! skipped by the parsers, never fatal.

/// Maximum buffered bytes for a single line (1MB)
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Accumulates raw bytes and emits complete lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::with_capacity(4096) }
    }

    /// Feed a chunk of bytes, returning every line completed by it
    ///
    /// Lines are split on `\n`; a trailing `\r` is stripped. Bytes
    /// after the last newline stay buffered for the next chunk. A line
    /// exceeding [`MAX_LINE_BYTES`] is discarded rather than growing
    /// without bound.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                lines.push(self.take_line());
            } else {
                if self.buffer.len() >= MAX_LINE_BYTES {
                    self.buffer.clear();
                }
                self.buffer.push(byte);
            }
        }

        lines
    }

    /// Drain whatever remains in the buffer as a final line
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        line
    }
}

/// Extract the text fragment from one Ollama NDJSON line
///
/// Ollama streams `{"message": {"content": "..."}, "done": false}`
/// objects, one per line. Lines that fail to parse or carry no content
/// yield `None`.
pub fn ollama_fragment(line: &str) -> Option<String> {
    if line.trim().is_empty() {
        return None;
    }

    let chunk: serde_json::Value = serde_json::from_str(line).ok()?;
    chunk
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

/// One decoded frame of a llama.cpp SSE stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Incremental text from `choices[0].delta.content`
    Fragment(String),
    /// The literal `data: [DONE]` terminator
    Done,
}

/// Decode one llama.cpp (OpenAI-style) SSE line
///
/// Lines without a `data:` prefix, and `data:` payloads that fail to
/// parse, yield `None` and are skipped by the caller.
pub fn llamacpp_frame(line: &str) -> Option<SseFrame> {
    let payload = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
    let payload = payload.trim();

    if payload == "[DONE]" {
        return Some(SseFrame::Done);
    }

    let chunk: serde_json::Value = serde_json::from_str(payload).ok()?;
    let content = chunk
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;

    Some(SseFrame::Fragment(content.to_string()))
}
