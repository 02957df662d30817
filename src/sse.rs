//! Server-Sent Events (SSE) parsing
//!
//! Turns the raw bytes of an event stream into discrete events. Events are
//! separated by a blank line; inside an event, `event:` names the type and
//! each `data:` line adds one line to the payload.

use tracing::debug;

/// Type used when an event has no `event:` line
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// SSE event structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SSEEvent {
    pub event_type: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
}

impl SSEEvent {
    /// The event type, `message` when none was given
    pub fn event_type(&self) -> &str {
        self.event_type.as_deref().unwrap_or(DEFAULT_EVENT_TYPE)
    }

    /// Parse a single event block (the text between two blank lines)
    pub fn parse_block(block: &str) -> Self {
        let mut event_type = None;
        let mut data_lines = Vec::new();

        for line in block.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix("event:") {
                event_type = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value);
            }
            // Comments (`:`), `id:`, `retry:` and anything else are ignored
        }

        Self {
            event_type,
            data: data_lines.join("\n"),
        }
    }
}

/// SSE stream parser that converts bytes into SSE events.
///
/// Chunk boundaries may fall anywhere, including inside a UTF-8 sequence or
/// between the two newlines of a separator; the events produced do not
/// depend on where they fall.
#[derive(Debug, Default)]
pub struct SSEParser {
    /// Undecoded tail of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a blank line
    buffer: String,
}

impl SSEParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes, returning every event it completes
    pub fn parse_chunk(&mut self, chunk: &[u8]) -> Vec<SSEEvent> {
        self.decode(chunk);

        let mut events = Vec::new();

        // Split buffer by double newlines (event boundaries)
        while let Some(double_newline_pos) = self.buffer.find("\n\n") {
            let event_block: String = self.buffer.drain(..double_newline_pos + 2).collect();
            let event_block = &event_block[..double_newline_pos];

            if !event_block.trim().is_empty() {
                let event = SSEEvent::parse_block(event_block);
                debug!(
                    "Parsed event: type={}, data={:?}",
                    event.event_type(),
                    preview(&event.data)
                );
                events.push(event);
            }
        }

        events
    }

    /// Flush the parser at end of stream.
    ///
    /// Whatever is left in the buffer is treated as one last event, even
    /// without its terminating blank line.
    pub fn finish(&mut self) -> Option<SSEEvent> {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            push_normalized(&mut self.buffer, &tail);
        }

        let remaining = std::mem::take(&mut self.buffer);
        if remaining.trim().is_empty() {
            None
        } else {
            debug!("Flushing {} unterminated chars as a final event", remaining.len());
            Some(SSEEvent::parse_block(&remaining))
        }
    }

    /// Check if there's remaining data in the buffer
    pub fn has_remaining_data(&self) -> bool {
        !self.pending.is_empty() || !self.buffer.trim().is_empty()
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);

        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(text) => {
                    push_normalized(&mut self.buffer, text);
                    consumed = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = consumed + e.valid_up_to();
                    let valid = String::from_utf8_lossy(&self.pending[consumed..valid_end]);
                    push_normalized(&mut self.buffer, &valid);
                    match e.error_len() {
                        // Invalid sequence: replace it and keep going
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + len;
                        }
                        // Incomplete sequence at the end: wait for more bytes
                        None => {
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
    }
}

/// Append text with CRLF line endings folded to LF.
///
/// A `\r` at the end of the buffer is kept until the next chunk shows
/// whether a `\n` follows it.
fn push_normalized(buffer: &mut String, text: &str) {
    buffer.push_str(text);
    if buffer.contains("\r\n") {
        *buffer = buffer.replace("\r\n", "\n");
    }
}

fn preview(data: &str) -> &str {
    match data.char_indices().nth(100) {
        Some((index, _)) => &data[..index],
        None => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse_all(chunks: &[&[u8]]) -> Vec<SSEEvent> {
        let mut parser = SSEParser::new();
        let mut events: Vec<SSEEvent> = chunks
            .iter()
            .flat_map(|chunk| parser.parse_chunk(chunk))
            .collect();
        events.extend(parser.finish());
        events
    }

    #[test]
    fn test_sse_parser_basic() {
        let mut parser = SSEParser::new();

        let chunk = b"event: message\ndata: hello world\n\n";
        let events = parser.parse_chunk(chunk);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, Some("message".to_string()));
        assert_eq!(events[0].data, " hello world");
    }

    #[test]
    fn test_sse_parser_multiple_events() {
        let mut parser = SSEParser::new();

        let chunk = b"data: first\n\nevent: node-result\ndata: second\n\n";
        let events = parser.parse_chunk(chunk);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "message");
        assert_eq!(events[0].data, " first");
        assert_eq!(events[1].event_type(), "node-result");
    }

    #[test]
    fn test_sse_parser_incomplete_event() {
        let mut parser = SSEParser::new();

        // First chunk with incomplete event
        let events1 = parser.parse_chunk(b"data: incomplete");
        assert_eq!(events1.len(), 0);
        assert!(parser.has_remaining_data());

        // Second chunk completes the event
        let events2 = parser.parse_chunk(b"\n\n");
        assert_eq!(events2.len(), 1);
        assert_eq!(events2[0].data, " incomplete");
        assert!(!parser.has_remaining_data());
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let events = parse_all(&[b"event: node-result\ndata: {\"a\":\ndata: 1}\n\n"]);
        assert_eq!(events[0].data, " {\"a\":\n 1}");
        let parsed: serde_json::Value = serde_json::from_str(&events[0].data).unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn test_comments_and_unknown_fields_ignored() {
        let events = parse_all(&[b": keepalive\nid: 4\nretry: 100\ndata: x\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, None);
        assert_eq!(events[0].data, " x");
    }

    #[test]
    fn test_block_without_data_is_still_an_event() {
        let events = parse_all(&[b"event: ping\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "ping");
        assert!(events[0].data.is_empty());
    }

    #[test]
    fn test_blank_blocks_are_skipped() {
        let events = parse_all(&[b"\n\n\n\n  \n\ndata: a\n\n"]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let events = parse_all(&[b"event: flow-complete\ndata: {}"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "flow-complete");
    }

    #[test]
    fn test_multibyte_character_split_across_chunks() {
        let text = "data: {\"text\":\"héllo ✓\"}\n\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xE2).unwrap() + 1;
        let events = parse_all(&[&text[..split], &text[split..]]);
        assert_eq!(events[0].data, " {\"text\":\"héllo ✓\"}");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let events = parse_all(&[b"data: a\xFFb\n\n"]);
        assert_eq!(events[0].data, " a\u{FFFD}b");
    }

    #[test]
    fn test_crlf_line_endings() {
        let events = parse_all(&[b"event: message\r\ndata: 1\r", b"\n\r\ndata: 2\r\n\r\n"]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, " 1");
        assert_eq!(events[1].data, " 2");
    }

    proptest! {
        #[test]
        fn prop_chunk_boundaries_do_not_change_events(
            cuts in proptest::collection::vec(0usize..200, 0..12)
        ) {
            let stream = "event: message\ndata: {\"text\":\"héllo\"}\n\n\
                          event: node-result\r\ndata: {\"n\":1}\r\n\r\n\
                          : comment\ndata: [1,\ndata: 2]\n\n\
                          event: flow-complete\ndata: {\"done\":true}"
                .as_bytes();

            let whole = parse_all(&[stream]);

            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (stream.len() + 1)).collect();
            cuts.sort_unstable();
            cuts.dedup();
            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut start = 0;
            for cut in cuts {
                chunks.push(&stream[start..cut]);
                start = cut;
            }
            chunks.push(&stream[start..]);

            prop_assert_eq!(parse_all(&chunks), whole);
        }
    }
}
