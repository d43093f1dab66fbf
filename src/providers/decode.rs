//! Incremental stream decoding
//!
//! Vendor streams arrive as arbitrary byte chunks. [`LineDecoder`] cuts them
//! into complete lines and [`FrameStream`] feeds each line to a
//! vendor-specific [`FrameParser`], yielding normalized [`ProviderEvent`]s.

use crate::models::ProviderEvent;
use crate::utils::error::helpers::transport_error;
use crate::utils::error::{AppError, AppResult};
use futures::Stream;
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// Splits a byte stream into UTF-8 lines across chunk boundaries
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // the carried-over tail never holds a newline
        let scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut consumed = 0;
        for (offset, byte) in self.buffer[scan_from..].iter().enumerate() {
            if *byte == b'\n' {
                let end = scan_from + offset;
                lines.push(decode_line(&self.buffer[consumed..end]));
                consumed = end + 1;
            }
        }
        self.buffer.drain(..consumed);
        lines
    }

    /// Remaining partial line at end of input
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Extract the JSON payload of one framed line
///
/// Handles `data:` prefixed SSE lines and bare JSON lines wrapped in a
/// streamed array (`[`, `,` and `]`). Returns `None` for blank lines,
/// comments and `event:`/`id:` fields.
pub fn frame_payload(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') || line.starts_with("event:") || line.starts_with("id:") {
        return None;
    }

    let payload = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None => line
            .trim_start_matches(|c| c == '[' || c == ',')
            .trim_end_matches(|c| c == ']' || c == ',')
            .trim(),
    };

    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Vendor-specific interpretation of one decoded line
pub trait FrameParser: Send {
    /// Parse one line; malformed payloads should yield no events
    fn parse_line(&mut self, line: &str) -> AppResult<Vec<ProviderEvent>>;
}

pin_project! {
    /// Stream of provider events decoded from a byte stream
    ///
    /// Emits exactly one `Done` on success, synthesizing it at end of input
    /// when the vendor closes without signalling completion. A transport
    /// error or a vendor error frame ends the stream with `Err`.
    pub struct FrameStream<S, P> {
        #[pin]
        inner: S,
        parser: P,
        decoder: LineDecoder,
        pending: VecDeque<ProviderEvent>,
        error: Option<AppError>,
        done: bool,
        finished: bool,
    }
}

impl<S, P> FrameStream<S, P> {
    pub fn new(inner: S, parser: P) -> Self {
        Self {
            inner,
            parser,
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
            error: None,
            done: false,
            finished: false,
        }
    }
}

fn queue_events(
    events: Vec<ProviderEvent>,
    pending: &mut VecDeque<ProviderEvent>,
    done: &mut bool,
) {
    for event in events {
        if *done {
            break;
        }
        if event == ProviderEvent::Done {
            *done = true;
        }
        pending.push_back(event);
    }
}

impl<S, B, E, P> Stream for FrameStream<S, P>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    P: FrameParser,
{
    type Item = AppResult<ProviderEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if let Some(error) = this.error.take() {
                *this.finished = true;
                return Poll::Ready(Some(Err(error)));
            }
            if *this.finished || *this.done {
                *this.finished = true;
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    for line in this.decoder.push(chunk.as_ref()) {
                        if *this.done {
                            break;
                        }
                        match this.parser.parse_line(&line) {
                            Ok(events) => queue_events(events, this.pending, this.done),
                            Err(error) => {
                                *this.error = Some(error);
                                break;
                            }
                        }
                    }
                }
                Poll::Ready(Some(Err(error))) => {
                    *this.error = Some(transport_error(format!("stream interrupted: {}", error)));
                }
                Poll::Ready(None) => {
                    if let Some(line) = this.decoder.finish() {
                        match this.parser.parse_line(&line) {
                            Ok(events) => queue_events(events, this.pending, this.done),
                            Err(error) => {
                                *this.error = Some(error);
                                continue;
                            }
                        }
                    }
                    if !*this.done {
                        debug!("Stream closed without completion frame, finishing");
                        this.pending.push_back(ProviderEvent::Done);
                        *this.done = true;
                    }
                }
            }
        }
    }
}

/// Parse a payload as JSON, skipping malformed fragments
pub fn parse_json_payload(payload: &str) -> Option<serde_json::Value> {
    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Skipping malformed stream fragment: {}", e);
            None
        }
    }
}
