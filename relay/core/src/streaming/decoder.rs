//! Server-sent event decoder for chat completion streams

use serde_json::Value;

/// Marker preceding every event payload
pub const DATA_PREFIX: &str = "data: ";

/// Payload signalling the end of the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Minimum buffer capacity for the decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Longest line the decoder buffers (1MB)
pub const MAX_LINE_SIZE: usize = 1024 * 1024;

/// Bytes of an oversized line kept in its `Malformed` event
const OVERSIZED_PREVIEW: usize = 64;

/// A decoded upstream event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// A non-empty fragment of the reply
    ContentDelta(String),
    /// The provider finished the reply
    Done,
    /// A `data:` payload that is not valid JSON, or the head of a line
    /// longer than [`MAX_LINE_SIZE`]
    Malformed(String),
}

/// Classify one complete line of the event stream
///
/// Returns `None` for lines that carry nothing: blanks, comments, non-`data`
/// fields, and events without a content delta (role announcements, usage
/// records, finish reasons).
#[must_use]
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return None;
    }

    let payload = line.strip_prefix(DATA_PREFIX)?;
    if payload.trim_end() == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(event) => event
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .filter(|content| !content.is_empty())
            .map(|content| StreamEvent::ContentDelta(content.to_string())),
        Err(_) => Some(StreamEvent::Malformed(payload.to_string())),
    }
}

/// Incremental decoder over raw body bytes
///
/// Bytes are buffered until a full line is available and only then decoded
/// as UTF-8, so characters split across reads survive intact. One decoder
/// serves exactly one response; after [`StreamEvent::Done`] it ignores all
/// further input.
///
/// A line growing past [`MAX_LINE_SIZE`] is reported once as
/// [`StreamEvent::Malformed`] and its remaining bytes are skipped up to the
/// next newline.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
    /// Skipping the tail of an oversized line
    discarding: bool,
    finished: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    /// Create a new decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            discarding: false,
            finished: false,
        }
    }

    /// Append body bytes
    pub fn push(&mut self, data: &[u8]) {
        if self.finished {
            return;
        }
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Signal end of body
    ///
    /// A trailing line without a newline becomes decodable.
    pub fn finish(&mut self) {
        if !self.finished && self.buffer.len() > self.read_pos && self.buffer.last() != Some(&b'\n')
        {
            self.buffer.push(b'\n');
        }
    }

    /// Whether `[DONE]` has been seen
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode the next event from the buffered complete lines
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        while !self.finished {
            let pending = &self.buffer[self.read_pos..];
            let Some(newline) = pending.iter().position(|b| *b == b'\n') else {
                return self.skip_oversized();
            };

            if self.discarding {
                self.read_pos += newline + 1;
                self.discarding = false;
                continue;
            }
            if newline > MAX_LINE_SIZE {
                let head = preview(pending);
                self.read_pos += newline + 1;
                tracing::warn!(bytes = newline, "Dropping oversized stream line");
                return Some(StreamEvent::Malformed(head));
            }

            let line = String::from_utf8_lossy(&pending[..newline]).into_owned();
            self.read_pos += newline + 1;

            if let Some(event) = decode_line(&line) {
                if event == StreamEvent::Done {
                    self.finished = true;
                    self.buffer.clear();
                    self.read_pos = 0;
                }
                return Some(event);
            }
        }
        None
    }

    /// Drop a partial line that has outgrown [`MAX_LINE_SIZE`]
    ///
    /// Reports the line once, when it first crosses the limit.
    fn skip_oversized(&mut self) -> Option<StreamEvent> {
        let pending = &self.buffer[self.read_pos..];
        if self.discarding {
            self.read_pos = self.buffer.len();
            return None;
        }
        if pending.len() <= MAX_LINE_SIZE {
            return None;
        }

        let head = preview(pending);
        tracing::warn!(
            bytes = pending.len(),
            "Stream line exceeds size limit, skipping to next newline"
        );
        self.read_pos = self.buffer.len();
        self.discarding = true;
        Some(StreamEvent::Malformed(head))
    }

    /// Drain every event decodable from the buffered input
    pub fn events(&mut self) -> impl Iterator<Item = StreamEvent> + '_ {
        std::iter::from_fn(move || self.next_event())
    }
}

fn preview(bytes: &[u8]) -> String {
    String::from_utf8_lossy(&bytes[..bytes.len().min(OVERSIZED_PREVIEW)]).into_owned()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn delta(text: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n\n", serde_json::to_string(text).unwrap())
    }

    #[test]
    fn test_decode_line_variants() {
        assert_eq!(decode_line(""), None);
        assert_eq!(decode_line("\r"), None);
        assert_eq!(decode_line(": OPENROUTER PROCESSING"), None);
        assert_eq!(decode_line("event: message"), None);
        assert_eq!(decode_line("data: [DONE]"), Some(StreamEvent::Done));
        assert_eq!(decode_line("data: [DONE]\r"), Some(StreamEvent::Done));
        assert_eq!(
            decode_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            Some(StreamEvent::ContentDelta("Hi".to_string()))
        );
        assert_eq!(
            decode_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
        assert_eq!(
            decode_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#),
            None
        );
        assert_eq!(
            decode_line(r#"data: {"choices":[{"delta":{"content":null}}]}"#),
            None
        );
        assert_eq!(decode_line(r#"data: {"choices":[]}"#), None);
        assert_eq!(
            decode_line(r#"data: {"choices":[{"del"#),
            Some(StreamEvent::Malformed(r#"{"choices":[{"del"#.to_string()))
        );
    }

    #[test]
    fn test_deltas_in_order_then_done() {
        let body = format!("{}{}{}data: [DONE]\n\n", delta("Hel"), delta("lo"), delta(" world"));

        let mut decoder = SseDecoder::new();
        decoder.push(body.as_bytes());
        let events: Vec<StreamEvent> = decoder.events().collect();

        assert_eq!(
            events,
            vec![
                StreamEvent::ContentDelta("Hel".to_string()),
                StreamEvent::ContentDelta("lo".to_string()),
                StreamEvent::ContentDelta(" world".to_string()),
                StreamEvent::Done,
            ]
        );
        assert!(decoder.is_finished());
    }

    #[test]
    fn test_lines_reassembled_across_reads() {
        let body = delta("split me");
        let mut decoder = SseDecoder::new();

        for byte in body.as_bytes() {
            decoder.push(std::slice::from_ref(byte));
            if let Some(event) = decoder.next_event() {
                assert_eq!(event, StreamEvent::ContentDelta("split me".to_string()));
                return;
            }
        }
        panic!("delta never decoded");
    }

    #[test]
    fn test_multibyte_character_split_across_reads() {
        let body = delta("日本語");
        let bytes = body.as_bytes();
        let split = bytes.iter().position(|b| *b >= 0x80).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        decoder.push(&bytes[..split]);
        assert_eq!(decoder.next_event(), None);
        decoder.push(&bytes[split..]);
        assert_eq!(
            decoder.next_event(),
            Some(StreamEvent::ContentDelta("日本語".to_string()))
        );
    }

    #[test]
    fn test_malformed_between_valid_deltas() {
        let body = format!("{}data: {{\"choices\":[{{\"del\n\n{}", delta("a"), delta("b"));
        let mut decoder = SseDecoder::new();
        decoder.push(body.as_bytes());

        let events: Vec<StreamEvent> = decoder.events().collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::ContentDelta("a".to_string()),
                StreamEvent::Malformed("{\"choices\":[{\"del".to_string()),
                StreamEvent::ContentDelta("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_input_after_done_is_ignored() {
        let body = format!("{}data: [DONE]\n\n{}", delta("kept"), delta("ignored"));
        let mut decoder = SseDecoder::new();
        decoder.push(body.as_bytes());
        decoder.push(delta("also ignored").as_bytes());

        let events: Vec<StreamEvent> = decoder.events().collect();
        assert_eq!(
            events,
            vec![StreamEvent::ContentDelta("kept".to_string()), StreamEvent::Done]
        );
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        decoder.push(br#"data: {"choices":[{"delta":{"content":"tail"}}]}"#);
        assert_eq!(decoder.next_event(), None);

        decoder.finish();
        assert_eq!(
            decoder.next_event(),
            Some(StreamEvent::ContentDelta("tail".to_string()))
        );
        assert_eq!(decoder.next_event(), None);
    }

    #[test]
    fn test_oversized_line_is_skipped_to_next_newline() {
        let mut decoder = SseDecoder::new();
        decoder.push(delta("before").as_bytes());
        assert_eq!(
            decoder.next_event(),
            Some(StreamEvent::ContentDelta("before".to_string()))
        );

        // A runaway line arriving over several reads with no newline
        let chunk = vec![b'y'; 256 * 1024];
        decoder.push(b"data: ");
        let mut reported = Vec::new();
        for _ in 0..8 {
            decoder.push(&chunk);
            reported.extend(decoder.events());
        }
        assert_eq!(reported.len(), 1);
        match &reported[0] {
            StreamEvent::Malformed(head) => {
                assert!(head.starts_with("data: yyy"));
                assert_eq!(head.len(), OVERSIZED_PREVIEW);
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
        assert!(decoder.buffer.len() - decoder.read_pos <= chunk.len());

        // The rest of the oversized line is swallowed; the next line decodes
        decoder.push(&chunk);
        decoder.push(b"tail\n");
        decoder.push(delta("after").as_bytes());
        decoder.push(b"data: [DONE]\n");
        let events: Vec<StreamEvent> = decoder.events().collect();
        assert_eq!(
            events,
            vec![StreamEvent::ContentDelta("after".to_string()), StreamEvent::Done]
        );
    }

    #[test]
    fn test_oversized_complete_line_in_one_read() {
        let mut body = b"data: ".to_vec();
        body.extend(std::iter::repeat(b'z').take(MAX_LINE_SIZE + 1));
        body.push(b'\n');
        body.extend_from_slice(delta("ok").as_bytes());

        let mut decoder = SseDecoder::new();
        decoder.push(&body);
        let events: Vec<StreamEvent> = decoder.events().collect();

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            StreamEvent::Malformed(head) if head.len() == OVERSIZED_PREVIEW
        ));
        assert_eq!(events[1], StreamEvent::ContentDelta("ok".to_string()));
    }

    #[test]
    fn test_crlf_line_endings() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r\n\r\ndata: [DONE]\r\n";
        let mut decoder = SseDecoder::new();
        decoder.push(body.as_bytes());

        let events: Vec<StreamEvent> = decoder.events().collect();
        assert_eq!(
            events,
            vec![StreamEvent::ContentDelta("x".to_string()), StreamEvent::Done]
        );
    }
}
