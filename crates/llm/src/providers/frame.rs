//! Line framing shared by the streaming backends.
//!
//! Backends stream either SSE (`data: ...` lines) or NDJSON. Both are line
//! oriented, so a single byte-level splitter feeds a per-backend line parser.
//! Bytes are buffered until a full line is available so multi-byte UTF-8
//! characters split across network chunks decode correctly.

use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Response;
use serde_json::Value;

use crate::provider::{FragmentStream, LlmError};

/// What a backend line parser makes of one line.
#[derive(Debug)]
pub(crate) enum LineOutcome {
    /// A piece of generated text.
    Fragment(String),
    /// The final piece of generated text; the stream ends after it.
    Last(String),
    /// Nothing to emit (keep-alives, metadata, empty deltas).
    Skip,
    /// Normal end of the generation.
    Done,
    /// The backend reported an error mid-stream.
    Fail(LlmError),
}

/// Accumulates raw bytes and hands out complete lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, without its terminator (`\n` or `\r\n`).
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left after the byte stream ended, if anything.
    pub(crate) fn take_rest(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

type ByteStream<E> = Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>;

struct State<E, F> {
    bytes: ByteStream<E>,
    lines: LineBuffer,
    parse: F,
    eof: bool,
    finished: bool,
}

/// Turn a byte stream into a [`FragmentStream`] by feeding each line to `parse`.
pub(crate) fn line_stream<B, E, F>(bytes: B, parse: F) -> FragmentStream
where
    B: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
    F: FnMut(&str) -> LineOutcome + Send + 'static,
{
    let state = State {
        bytes: Box::pin(bytes),
        lines: LineBuffer::default(),
        parse,
        eof: false,
        finished: false,
    };

    let fragments = stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            let next_line = match state.lines.next_line() {
                Some(line) => Some(line),
                None if state.eof => state.lines.take_rest(),
                None => None,
            };

            if let Some(line) = next_line {
                match (state.parse)(&line) {
                    LineOutcome::Fragment(text) => return Some((Ok(text), state)),
                    LineOutcome::Last(text) => {
                        state.finished = true;
                        return Some((Ok(text), state));
                    }
                    LineOutcome::Skip => continue,
                    LineOutcome::Done => return None,
                    LineOutcome::Fail(e) => {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }

            if state.eof {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.lines.push(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(LlmError::StreamError(e.to_string())), state));
                }
                None => state.eof = true,
            }
        }
    });

    FragmentStream::new(fragments)
}

/// Strip the SSE `data:` field name, returning the payload.
/// Other SSE fields and comments yield `None`.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data:")?;
    Some(payload.strip_prefix(' ').unwrap_or(payload))
}

/// Map a non-success HTTP status to an [`LlmError`], consuming the body.
pub(crate) async fn check_status(response: Response) -> Result<Response, LlmError> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response);
    }

    let body_text = response.text().await.unwrap_or_default();
    Err(status_error(status, body_text))
}

pub(crate) fn status_error(status: u16, body_text: String) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthError,
        429 => {
            let retry_after = serde_json::from_str::<Value>(&body_text)
                .ok()
                .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                .unwrap_or(30);
            LlmError::RateLimited {
                retry_after_secs: retry_after,
            }
        }
        _ => LlmError::ApiError {
            status,
            message: body_text,
        },
    }
}
