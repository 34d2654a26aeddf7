//! Incremental line handling for Dify response bodies.
//!
//! Dify answers with one JSON object per line, optionally prefixed with `data: `
//! when streaming. [`LineSplitter`] turns arbitrarily-sized byte chunks into
//! complete lines, and [`translate_line`] turns each line into one server-sent
//! event frame for the caller.

use bytes::{Bytes, BytesMut};

use super::dify_types::DifyStreamChunk;
use super::openai_types::ChatCompletionChunk;
use super::response::dify_to_openai;
use crate::error::{RelayError, Result};

const DATA_PREFIX: &str = "data: ";

/// Buffers bytes across reads and yields complete lines without their `\n` or `\r\n`.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + offset;
            self.scanned = 0;
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            lines.push(line.freeze());
        }
        self.scanned = self.buffer.len();
        lines
    }

    /// The trailing line left when the body ends without a newline.
    pub fn finish(mut self) -> Option<Bytes> {
        if self.buffer.last() == Some(&b'\r') {
            let len = self.buffer.len();
            self.buffer.truncate(len - 1);
        }
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.freeze())
        }
    }
}

/// Decode one backend line. Blank lines yield `None`; anything else must be a
/// JSON object once a leading `data: ` is removed.
pub fn decode_line(line: &[u8]) -> Result<Option<DifyStreamChunk>> {
    let text = std::str::from_utf8(line)
        .map_err(|e| RelayError::translation(format!("Backend line is not UTF-8: {}", e)))?;
    if text.trim().is_empty() {
        return Ok(None);
    }

    let payload = text.strip_prefix(DATA_PREFIX).unwrap_or(text);
    let chunk = serde_json::from_str(payload).map_err(|e| {
        RelayError::translation(format!("Backend line is not a valid chunk: {}", e))
    })?;
    Ok(Some(chunk))
}

/// Serialize a chunk as a `data: <json>\n\n` frame.
pub fn encode_frame(chunk: &ChatCompletionChunk) -> Result<Bytes> {
    let json = serde_json::to_string(chunk)?;
    Ok(Bytes::from(format!("{}{}\n\n", DATA_PREFIX, json)))
}

/// Decode, translate and frame one backend line.
pub fn translate_line(line: &[u8]) -> Result<Option<Bytes>> {
    match decode_line(line)? {
        Some(chunk) => {
            let frame = encode_frame(&dify_to_openai(&chunk))?;
            Ok(Some(frame))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_str(b: &Bytes) -> &str {
        std::str::from_utf8(b).unwrap()
    }

    #[test]
    fn test_splitter_handles_partial_reads() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"data: {\"ans").is_empty());

        let lines = splitter.push(b"wer\":\"a\"}\r\n\r\ndata: {}\nrest");
        assert_eq!(lines.len(), 3);
        assert_eq!(as_str(&lines[0]), "data: {\"answer\":\"a\"}");
        assert_eq!(as_str(&lines[1]), "");
        assert_eq!(as_str(&lines[2]), "data: {}");

        assert_eq!(splitter.finish().as_ref().map(as_str), Some("rest"));
    }

    #[test]
    fn test_splitter_keeps_multibyte_chars_split_across_reads() {
        let text = "data: {\"answer\":\"héllo\"}\n".as_bytes();
        let split_at = text.iter().position(|&b| b > 0x7f).unwrap() + 1;

        let mut splitter = LineSplitter::new();
        assert!(splitter.push(&text[..split_at]).is_empty());
        let lines = splitter.push(&text[split_at..]);

        let chunk = decode_line(&lines[0]).unwrap().unwrap();
        assert_eq!(chunk.answer.as_deref(), Some("héllo"));
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn test_splitter_long_line_fed_byte_by_byte() {
        let line = format!("data: {{\"answer\":\"{}\"}}\r\n", "x".repeat(4096));
        let mut splitter = LineSplitter::new();
        let mut lines = Vec::new();
        for byte in line.as_bytes() {
            lines.extend(splitter.push(std::slice::from_ref(byte)));
        }

        assert_eq!(lines.len(), 1);
        assert_eq!(as_str(&lines[0]), line.trim_end());
        assert!(splitter.finish().is_none());
    }

    #[test]
    fn test_decode_accepts_prefixed_and_bare_lines() {
        let prefixed = decode_line(b"data: {\"answer\":\"x\",\"task_id\":\"t\"}")
            .unwrap()
            .unwrap();
        assert_eq!(prefixed.answer.as_deref(), Some("x"));

        let bare = decode_line(b"{\"event\":\"message\",\"answer\":\"y\"}")
            .unwrap()
            .unwrap();
        assert_eq!(bare.answer.as_deref(), Some("y"));
    }

    #[test]
    fn test_decode_skips_blank_lines() {
        assert!(decode_line(b"").unwrap().is_none());
        assert!(decode_line(b"   ").unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_lines() {
        assert!(decode_line(b"event: ping").is_err());
        assert!(decode_line(b"data: {not json").is_err());
        assert!(decode_line(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_translate_line_emits_sse_frame() {
        let frame = translate_line(b"data: {\"answer\":\"hel\",\"task_id\":\"t1\",\"created_at\":100}")
            .unwrap()
            .unwrap();
        assert_eq!(
            as_str(&frame),
            "data: {\"choices\":[{\"delta\":{\"content\":\"hel\"},\"index\":0,\"finish_reason\":null}],\"id\":\"t1\",\"object\":\"chat.completion.chunk\",\"created\":100,\"model\":\"dify\",\"usage\":{\"prompt_tokens\":0,\"completion_tokens\":0,\"total_tokens\":0}}\n\n"
        );
    }
}
