//! Server-Sent Events framing.
//!
//! The parser accumulates raw bytes and yields typed frames; the emitter
//! writes the wire form back out. The HTTP LM client parses provider
//! streams with `SseParser`; the round-trip property (emit then parse)
//! is what the streaming endpoints rely on.

use bytes::Bytes;

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name; `message` when the frame carried no `event:` line.
    pub event: String,
    /// Concatenated `data:` lines, joined with `\n`.
    pub data: String,
}

impl SseFrame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Incremental SSE parser.
///
/// Feed arbitrary byte chunks; complete frames are returned as they are
/// terminated by a blank line. Partial frames stay buffered.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk and collect every frame completed by it.
    pub fn push(&mut self, chunk: &Bytes) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut frames = Vec::new();

        loop {
            let Some((boundary, sep_len)) = next_frame_boundary(&self.buffer) else {
                break;
            };
            let raw: String = self.buffer.drain(..boundary + sep_len).collect();
            let raw = &raw[..boundary];
            if let Some(frame) = parse_frame(raw) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Flush a trailing unterminated frame (stream ended without a blank
    /// line). Returns `None` when the buffer holds no data lines.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let raw = std::mem::take(&mut self.buffer);
        parse_frame(&raw)
    }
}

/// Find the earliest frame separator, preferring whichever of `\n\n` /
/// `\r\n\r\n` appears first in the buffer.
fn next_frame_boundary(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n");
    let crlf = buffer.find("\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) if b < a => Some((b, 4)),
        (Some(a), _) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = "message".to_string();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            event = rest.strip_prefix(' ').unwrap_or(rest).to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            let value = rest.strip_prefix(' ').unwrap_or(rest);
            if !value.is_empty() {
                data_lines.push(value);
            }
        }
        // Comment lines (`:`) and unknown fields are skipped.
    }

    if data_lines.is_empty() {
        return None;
    }

    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Serialize one frame to its wire form.
pub fn emit_frame(frame: &SseFrame) -> String {
    let mut out = String::new();
    out.push_str("event: ");
    out.push_str(&frame.event);
    out.push('\n');
    for line in frame.data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_event() {
        let mut parser = SseParser::new();
        let frames = parser.push(&Bytes::from_static(
            b"event: delta\ndata: {\"delta\":\"hi\"}\n\n",
        ));
        assert_eq!(frames, vec![SseFrame::new("delta", "{\"delta\":\"hi\"}")]);
    }

    #[test]
    fn defaults_to_message_event() {
        let mut parser = SseParser::new();
        let frames = parser.push(&Bytes::from_static(b"data: hello\n\n"));
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "hello");
    }

    #[test]
    fn joins_multiline_data() {
        let mut parser = SseParser::new();
        let frames = parser.push(&Bytes::from_static(b"data: a\ndata: b\n\n"));
        assert_eq!(frames[0].data, "a\nb");
    }

    #[test]
    fn handles_crlf_separators() {
        let mut parser = SseParser::new();
        let frames = parser.push(&Bytes::from_static(b"event: x\r\ndata: 1\r\n\r\n"));
        assert_eq!(frames, vec![SseFrame::new("x", "1")]);
    }

    #[test]
    fn buffers_partial_frames_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(&Bytes::from_static(b"event: delta\nda")).is_empty());
        let frames = parser.push(&Bytes::from_static(b"ta: tail\n\n"));
        assert_eq!(frames, vec![SseFrame::new("delta", "tail")]);
    }

    #[test]
    fn skips_empty_data_lines() {
        let mut parser = SseParser::new();
        let frames = parser.push(&Bytes::from_static(b"data:\ndata: kept\n\n"));
        assert_eq!(frames[0].data, "kept");
    }

    #[test]
    fn round_trip_preserves_sequence() {
        let events = vec![
            SseFrame::new("delta", "{\"delta\":\"one\"}"),
            SseFrame::new("tool-call", "{\"name\":\"project_list\"}"),
            SseFrame::new("message", "line1\nline2"),
            SseFrame::new("done", "{}"),
        ];

        let wire: String = events.iter().map(emit_frame).collect();
        let mut parser = SseParser::new();
        let parsed = parser.push(&Bytes::from(wire.into_bytes()));

        assert_eq!(parsed, events);
        assert!(parser.finish().is_none());
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut parser = SseParser::new();
        assert!(parser.push(&Bytes::from_static(b"data: tail")).is_empty());
        let frame = parser.finish().unwrap();
        assert_eq!(frame.data, "tail");
    }
}
