//! Incremental server-sent-events parser.
//!
//! Bytes arrive in arbitrary chunks; complete events are dispatched on the
//! blank line that ends them.

/// Event type used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// A dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (`message` unless the frame named another).
    pub event: String,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// Last `id:` field seen in the frame.
    pub id: Option<String>,
}

impl SseEvent {
    /// Whether this event would reach an `onmessage` handler.
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT
    }
}

/// Buffers partial frames between chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
}

impl SseParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(pos) = find_double_newline(&self.buf) {
            let frame = self.buf.drain(..pos + 2).collect::<Vec<_>>();
            if let Some(event) = parse_frame(&String::from_utf8_lossy(&frame)) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_frame(text: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data: Option<String> = None;
    let mut id = None;

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => match data.as_mut() {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            "event" => event = Some(value.to_string()),
            "id" => id = Some(value.to_string()),
            _ => {}
        }
    }

    // Frames without data are not dispatched.
    let data = data?;
    Some(SseEvent {
        event: event
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        data,
        id,
    })
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: compl").is_empty());
        assert!(parser.push(b"eted\n").is_empty());

        let events = parser.push(b"\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "completed");
        assert!(events[0].is_message());
    }

    #[test]
    fn multiple_data_lines_are_joined() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data: first\ndata: second\n\n");
        assert_eq!(events[0].data, "first\nsecond");
    }

    #[test]
    fn comments_and_dataless_frames_are_skipped() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keep-alive\n\nevent: ping\n\ndata:processing\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "processing");
    }

    #[test]
    fn crlf_and_named_events() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: progress\r\nid: 7\r\ndata: 50%\r\n\r\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "progress".into(),
                data: "50%".into(),
                id: Some("7".into()),
            }]
        );
        assert!(!events[0].is_message());
    }

    #[test]
    fn only_one_leading_space_is_stripped() {
        let mut parser = SseParser::new();
        let events = parser.push(b"data:  padded\n\n");
        assert_eq!(events[0].data, " padded");
    }
}
