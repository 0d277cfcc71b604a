use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// How many consecutive line fragments may be buffered while waiting for a
/// JSON record to become parseable before the stream is declared corrupt.
pub const MAX_RECORD_FRAGMENTS: usize = 4;

/// A decoded record from the backend event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of assistant output. `done` marks the final record of a turn.
    Message { content: String, done: bool },
    /// A transient progress update, e.g. "Searching repositories...".
    Processing { message: String },
    /// A generated user prompt (search flows).
    Prompt { content: String, message: String },
    /// A generated system prompt (search flows).
    SystemPrompt { content: String, message: String },
    /// A backend-reported failure.
    Error { content: String },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unparseable record after {fragments} fragments: {snippet}")]
    Malformed { fragments: usize, snippet: String },

    #[error("invalid utf-8 in stream at byte {offset}")]
    InvalidUtf8 { offset: usize },
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Incremental newline-delimited JSON decoder.
///
/// Network chunks arrive at arbitrary boundaries, so a record may be split
/// across chunks or a chunk may carry several records. Lines that fail to
/// parse are buffered and retried with the next line appended, bounded by
/// [`MAX_RECORD_FRAGMENTS`].
#[derive(Debug, Default)]
pub struct EventDecoder {
    byte_tail: Vec<u8>,
    tail: String,
    pending: String,
    fragments: usize,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw network bytes. A chunk boundary may fall inside a multibyte
    /// UTF-8 character; the incomplete trailing sequence is held back and
    /// completed by the next chunk, so content is never mangled into
    /// replacement characters.
    pub fn push_bytes(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, DecodeError> {
        self.byte_tail.extend_from_slice(chunk);
        let valid_len = match std::str::from_utf8(&self.byte_tail) {
            Ok(_) => self.byte_tail.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(err) => {
                return Err(DecodeError::InvalidUtf8 {
                    offset: err.valid_up_to(),
                });
            }
        };
        let consumed: Vec<u8> = self.byte_tail.drain(..valid_len).collect();
        // Lossless: everything up to valid_len was verified above.
        let text = String::from_utf8_lossy(&consumed);
        self.push_chunk(&text)
    }

    /// Feed a raw chunk, returning every event completed by it.
    pub fn push_chunk(&mut self, chunk: &str) -> Result<Vec<StreamEvent>, DecodeError> {
        self.tail.push_str(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.tail.find('\n') {
            let raw: String = self.tail.drain(..=pos).collect();
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(event) = self.consume_line(line)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Flush at end of stream. A trailing record without a newline is still
    /// decoded; an unresolved partial record or a truncated UTF-8 sequence
    /// is an error.
    pub fn finish(&mut self) -> Result<Option<StreamEvent>, DecodeError> {
        if !self.byte_tail.is_empty() {
            return Err(DecodeError::InvalidUtf8 { offset: 0 });
        }
        let tail = std::mem::take(&mut self.tail);
        let line = tail.trim();
        if !line.is_empty() {
            if let Some(event) = self.consume_line(line)? {
                return Ok(Some(event));
            }
        }
        if !self.pending.is_empty() {
            return Err(DecodeError::Malformed {
                fragments: self.fragments,
                snippet: snippet_of(&self.pending),
            });
        }
        Ok(None)
    }

    fn consume_line(&mut self, line: &str) -> Result<Option<StreamEvent>, DecodeError> {
        let candidate = if self.pending.is_empty() {
            line.to_string()
        } else {
            format!("{}{}", self.pending, line)
        };

        match serde_json::from_str::<WireRecord>(&candidate) {
            Ok(record) => {
                self.pending.clear();
                self.fragments = 0;
                Ok(map_record(record))
            }
            Err(_) => {
                self.fragments += 1;
                if self.fragments >= MAX_RECORD_FRAGMENTS {
                    let snippet = snippet_of(&candidate);
                    self.pending.clear();
                    let fragments = std::mem::take(&mut self.fragments);
                    return Err(DecodeError::Malformed { fragments, snippet });
                }
                self.pending = candidate;
                Ok(None)
            }
        }
    }
}

fn map_record(record: WireRecord) -> Option<StreamEvent> {
    let data = &record.data;
    match record.event.as_str() {
        "message" => Some(StreamEvent::Message {
            content: str_field(data, "content"),
            done: data.get("done").and_then(Value::as_bool).unwrap_or(false),
        }),
        "processing" => Some(StreamEvent::Processing {
            message: str_field(data, "message"),
        }),
        "prompt" => Some(StreamEvent::Prompt {
            content: str_field(data, "content"),
            message: str_field(data, "message"),
        }),
        "systemprompt" => Some(StreamEvent::SystemPrompt {
            content: str_field(data, "content"),
            message: str_field(data, "message"),
        }),
        "error" => Some(StreamEvent::Error {
            content: str_field(data, "content"),
        }),
        other => {
            debug!(event = other, "skipping unknown stream event kind");
            None
        }
    }
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn snippet_of(text: &str) -> String {
    text.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_single_record() {
        let mut decoder = EventDecoder::new();
        let events = decoder
            .push_chunk("{\"event\":\"message\",\"data\":{\"content\":\"hi\",\"done\":false}}\n")
            .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Message {
                content: "hi".to_string(),
                done: false
            }]
        );
    }

    #[test]
    fn test_record_split_across_chunks() {
        let mut decoder = EventDecoder::new();
        let events = decoder
            .push_chunk("{\"event\":\"message\",\"data\":{\"con")
            .unwrap();
        assert!(events.is_empty());
        let events = decoder
            .push_chunk("tent\":\"hello\",\"done\":true}}\n")
            .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Message {
                content: "hello".to_string(),
                done: true
            }]
        );
    }

    #[test]
    fn test_multiple_records_in_one_chunk() {
        let mut decoder = EventDecoder::new();
        let events = decoder
            .push_chunk(
                "{\"event\":\"processing\",\"data\":{\"message\":\"working\"}}\n\
                 {\"event\":\"message\",\"data\":{\"content\":\"a\",\"done\":false}}\n",
            )
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            StreamEvent::Processing {
                message: "working".to_string()
            }
        );
    }

    #[test]
    fn test_record_with_embedded_newline_is_reassembled() {
        // A record whose JSON string payload was split by a stray newline
        // parses once the second half arrives.
        let mut decoder = EventDecoder::new();
        let events = decoder
            .push_chunk("{\"event\":\"message\",\"data\":{\"content\":\"part one\n")
            .unwrap();
        assert!(events.is_empty());
        let events = decoder
            .push_chunk(" part two\",\"done\":false}}\n")
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_fragment_cap_yields_malformed() {
        let mut decoder = EventDecoder::new();
        let mut result = Ok(Vec::new());
        for _ in 0..MAX_RECORD_FRAGMENTS {
            result = decoder.push_chunk("not json\n");
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(
            result,
            Err(DecodeError::Malformed { fragments, .. }) if fragments == MAX_RECORD_FRAGMENTS
        ));
    }

    #[test]
    fn test_decoder_recovers_after_malformed_record() {
        let mut decoder = EventDecoder::new();
        for _ in 0..MAX_RECORD_FRAGMENTS - 1 {
            decoder.push_chunk("garbage\n").unwrap();
        }
        assert!(decoder.push_chunk("garbage\n").is_err());

        // State was reset, a valid record decodes normally afterwards.
        let events = decoder
            .push_chunk("{\"event\":\"error\",\"data\":{\"content\":\"boom\"}}\n")
            .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Error {
                content: "boom".to_string()
            }]
        );
    }

    #[test]
    fn test_finish_decodes_trailing_record_without_newline() {
        let mut decoder = EventDecoder::new();
        decoder
            .push_chunk("{\"event\":\"message\",\"data\":{\"content\":\"end\",\"done\":true}}")
            .unwrap();
        let event = decoder.finish().unwrap();
        assert_eq!(
            event,
            Some(StreamEvent::Message {
                content: "end".to_string(),
                done: true
            })
        );
    }

    #[test]
    fn test_finish_with_unresolved_partial_is_error() {
        let mut decoder = EventDecoder::new();
        decoder.push_chunk("{\"event\":\"mess\n").unwrap();
        assert!(decoder.finish().is_err());
    }

    #[test]
    fn test_unknown_event_kind_is_skipped() {
        let mut decoder = EventDecoder::new();
        let events = decoder
            .push_chunk("{\"event\":\"heartbeat\",\"data\":{}}\n")
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_chunk_boundary_inside_multibyte_char() {
        // "café" split between the two bytes of 'é' (0xC3 0xA9).
        let record = "{\"event\":\"message\",\"data\":{\"content\":\"café\",\"done\":true}}\n";
        let bytes = record.as_bytes();
        let split = record.find('\u{e9}').unwrap() + 1;

        let mut decoder = EventDecoder::new();
        let events = decoder.push_bytes(&bytes[..split]).unwrap();
        assert!(events.is_empty());
        let events = decoder.push_bytes(&bytes[split..]).unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Message {
                content: "café".to_string(),
                done: true
            }]
        );
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let record = "{\"event\":\"message\",\"data\":{\"content\":\"héllo\",\"done\":true}}\n";
        let mut decoder = EventDecoder::new();
        let mut events = Vec::new();
        for byte in record.as_bytes() {
            events.extend(decoder.push_bytes(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(
            events,
            vec![StreamEvent::Message {
                content: "héllo".to_string(),
                done: true
            }]
        );
    }

    #[test]
    fn test_genuinely_invalid_utf8_is_an_error() {
        let mut decoder = EventDecoder::new();
        // 0xC3 followed by an ASCII byte is not a valid sequence.
        let result = decoder.push_bytes(&[0xC3, 0x28]);
        assert!(matches!(result, Err(DecodeError::InvalidUtf8 { .. })));
    }

    #[test]
    fn test_truncated_utf8_at_end_of_stream_is_an_error() {
        let mut decoder = EventDecoder::new();
        decoder.push_bytes(&[0xC3]).unwrap();
        assert!(matches!(
            decoder.finish(),
            Err(DecodeError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let mut decoder = EventDecoder::new();
        let events = decoder.push_chunk("\n  \n\n").unwrap();
        assert!(events.is_empty());
        assert!(decoder.finish().unwrap().is_none());
    }
}
