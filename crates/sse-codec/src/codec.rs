use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio_util::codec::Decoder;

use crate::error::SseError;
use crate::event::SseEvent;

/// Default upper bound for a single line (1 MiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// Fields accumulated since the last dispatch.
#[derive(Debug, Default)]
struct PendingEvent {
    event: Option<String>,
    data: String,
    has_data: bool,
    retry: Option<Duration>,
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Lines may end in `\n`, `\r\n` or a lone `\r`. An event is dispatched on a
/// blank line; blocks without any `data:` field are discarded.
#[derive(Debug)]
pub struct SseCodec {
    max_line_length: usize,
    /// Offset already scanned for a terminator in the current buffer.
    next_index: usize,
    bom_checked: bool,
    pending: PendingEvent,
    last_event_id: Option<String>,
}

impl Default for SseCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl SseCodec {
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            next_index: 0,
            bom_checked: false,
            pending: PendingEvent::default(),
            last_event_id: None,
        }
    }

    /// The most recent `id:` value seen on this stream.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Locate the next line terminator, returning `(line_len, terminator_len)`.
    ///
    /// A trailing `\r` is only a terminator at EOF; otherwise it may be the
    /// first half of `\r\n` and we wait for more input.
    fn find_line_end(&mut self, src: &[u8], eof: bool) -> Option<(usize, usize)> {
        let start = self.next_index.min(src.len());
        let Some(offset) = memchr::memchr2(b'\n', b'\r', &src[start..]) else {
            self.next_index = src.len();
            return None;
        };

        let pos = start + offset;
        if src[pos] == b'\n' {
            return Some((pos, 1));
        }

        match src.get(pos + 1) {
            Some(b'\n') => Some((pos, 2)),
            Some(_) => Some((pos, 1)),
            None if eof => Some((pos, 1)),
            None => {
                self.next_index = pos;
                None
            }
        }
    }

    fn process_line(&mut self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(idx) => {
                let value = &line[idx + 1..];
                (&line[..idx], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line.as_ref(), ""),
        };

        match field {
            "event" => self.pending.event = Some(value.to_string()),
            "data" => {
                if self.pending.has_data {
                    self.pending.data.push('\n');
                }
                self.pending.data.push_str(value);
                self.pending.has_data = true;
            }
            "id" if !value.contains('\0') => {
                self.last_event_id = (!value.is_empty()).then(|| value.to_string());
            }
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.pending.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.has_data {
            return None;
        }

        Some(SseEvent {
            event: pending.event.filter(|e| !e.is_empty()),
            data: pending.data,
            id: self.last_event_id.clone(),
            retry: pending.retry,
        })
    }

    fn decode_inner(
        &mut self,
        src: &mut BytesMut,
        eof: bool,
    ) -> Result<Option<SseEvent>, SseError> {
        if !self.bom_checked {
            if !eof && src.len() < BOM.len() && BOM.starts_with(src) {
                return Ok(None);
            }
            if src.starts_with(BOM) {
                src.advance(BOM.len());
            }
            self.bom_checked = true;
        }

        loop {
            let Some((line_len, terminator_len)) = self.find_line_end(src, eof) else {
                if src.len() > self.max_line_length {
                    return Err(SseError::LineTooLong {
                        max: self.max_line_length,
                    });
                }
                if !eof {
                    return Ok(None);
                }
                if !src.is_empty() {
                    let line = src.split_to(src.len());
                    self.next_index = 0;
                    self.process_line(&line);
                }
                return Ok(self.take_event());
            };

            if line_len > self.max_line_length {
                return Err(SseError::LineTooLong {
                    max: self.max_line_length,
                });
            }

            let line = src.split_to(line_len);
            src.advance(terminator_len);
            self.next_index = 0;

            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    return Ok(Some(event));
                }
                continue;
            }

            self.process_line(&line);
        }
    }
}

impl Decoder for SseCodec {
    type Item = SseEvent;
    type Error = SseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_inner(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode_inner(src, true)
    }
}
