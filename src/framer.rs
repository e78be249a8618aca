//! Content-Length message framing for the LSP stdio protocol.
//!
//! Mirrors the header-then-body scheme used by every editor's LSP client:
//! a block of `Key: Value\r\n` header lines terminated by a blank line, then
//! exactly `Content-Length` bytes of UTF-8 JSON body. `MessageFramer` is fed
//! arbitrary byte chunks as they arrive off a pipe and yields complete
//! messages as soon as enough bytes have accumulated, buffering the rest —
//! the split between chunks is arbitrary and never affects the sequence of
//! messages produced.

use crate::error::LspError;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct MessageFramer {
    buf: Vec<u8>,
}

impl MessageFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly read bytes to the internal buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Try to pull one complete message out of the buffer. Returns `Ok(None)`
    /// when more bytes are needed. On success, the header + body bytes are
    /// drained from the buffer; any trailing bytes remain for the next call.
    pub fn try_next(&mut self) -> Result<Option<Value>, LspError> {
        let Some(header_end) = find_header_end(&self.buf) else {
            return Ok(None);
        };
        let header = std::str::from_utf8(&self.buf[..header_end])
            .map_err(|e| LspError::Protocol(format!("non-utf8 header: {e}")))?;
        let content_length = parse_content_length(header)
            .ok_or_else(|| LspError::Protocol("missing Content-Length header".into()))?;

        let body_start = header_end + separator_len(&self.buf[header_end..]);
        let body_end = body_start + content_length;
        if self.buf.len() < body_end {
            return Ok(None);
        }

        let body = &self.buf[body_start..body_end];
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| LspError::Protocol(format!("invalid JSON body: {e}")))?;
        self.buf.drain(..body_end);
        Ok(Some(value))
    }
}

/// Find the index where the header block ends (start of the blank-line
/// separator), scanning for either `\r\n\r\n` or a bare `\n\n`.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .or_else(|| buf.windows(2).position(|w| w == b"\n\n"))
}

fn separator_len(tail: &[u8]) -> usize {
    if tail.starts_with(b"\r\n\r\n") {
        4
    } else {
        2
    }
}

fn parse_content_length(header: &str) -> Option<usize> {
    header.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Frame a single outbound message with a `Content-Length` header.
pub fn encode_message(value: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(value).expect("Value always serializes");
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(&body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_single_message() {
        let msg = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"});
        let bytes = encode_message(&msg);
        let mut framer = MessageFramer::new();
        framer.push(&bytes);
        let parsed = framer.try_next().unwrap().unwrap();
        assert_eq!(parsed, msg);
        assert!(framer.try_next().unwrap().is_none());
    }

    #[test]
    fn resumes_across_arbitrary_split_points() {
        let msg = json!({"jsonrpc": "2.0", "id": 2, "result": {"ok": true}});
        let bytes = encode_message(&msg);
        for split in 0..bytes.len() {
            let mut framer = MessageFramer::new();
            framer.push(&bytes[..split]);
            assert!(framer.try_next().unwrap().is_none() || split == bytes.len());
            framer.push(&bytes[split..]);
            let parsed = framer.try_next().unwrap().unwrap();
            assert_eq!(parsed, msg, "failed at split {split}");
        }
    }

    #[test]
    fn parses_consecutive_messages_in_order() {
        let a = json!({"id": 1});
        let b = json!({"id": 2});
        let mut bytes = encode_message(&a);
        bytes.extend(encode_message(&b));
        let mut framer = MessageFramer::new();
        framer.push(&bytes);
        assert_eq!(framer.try_next().unwrap().unwrap(), a);
        assert_eq!(framer.try_next().unwrap().unwrap(), b);
        assert!(framer.try_next().unwrap().is_none());
    }

    #[test]
    fn rejects_missing_content_length() {
        let mut framer = MessageFramer::new();
        framer.push(b"X-Custom: 1\r\n\r\n{}");
        assert!(framer.try_next().is_err());
    }

    #[test]
    fn leftover_buffer_holds_only_partial_message() {
        let a = json!({"id": 1});
        let mut bytes = encode_message(&a);
        bytes.extend_from_slice(b"Content-Length: 5\r\n\r\nabc");
        let mut framer = MessageFramer::new();
        framer.push(&bytes);
        assert_eq!(framer.try_next().unwrap().unwrap(), a);
        assert!(framer.try_next().unwrap().is_none());
        assert_eq!(framer.buf, b"Content-Length: 5\r\n\r\nabc");
    }
}
