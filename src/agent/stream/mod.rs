//! Streaming output parser.
//!
//! Agent CLIs write JSON-lines to stdout, interleaved with whatever diagnostic
//! text the CLI or its child processes decide to print. The parser frames the
//! byte stream into lines ([`LineDecoder`]), classifies each line
//! ([`classify_line`]) and exposes the result as a lazy, forward-only
//! [`futures::Stream`]. Dropping the stream stops reading; nothing is buffered
//! beyond the current chunk.

mod classify;
mod decoder;
pub mod dialect;

pub use classify::{classify_line, classify_text, session_id};
pub use decoder::LineDecoder;
pub use dialect::{CLAUDE, CODEX, WireDialect};

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::OutputEvent;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Lazy stream of classified events over an async byte source
pub type EventStream = BoxStream<'static, OutputEvent>;

struct LineState<R> {
    reader: R,
    decoder: LineDecoder,
    pending: VecDeque<String>,
    chunk: Vec<u8>,
    eof: bool,
}

/// Non-empty trimmed lines of `reader`, in order. A read error ends the stream
/// the same way end-of-file does.
pub fn lines<R>(reader: R) -> BoxStream<'static, String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let state = LineState {
        reader,
        decoder: LineDecoder::new(),
        pending: VecDeque::new(),
        chunk: vec![0; READ_CHUNK_SIZE],
        eof: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                return Some((line, state));
            }
            if state.eof {
                return None;
            }

            match state.reader.read(&mut state.chunk).await {
                Ok(0) => {
                    state.eof = true;
                    state.pending.extend(state.decoder.finish());
                }
                Ok(n) => {
                    let complete = state.decoder.push(&state.chunk[..n]);
                    state.pending.extend(complete);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "agent output stream read failed");
                    state.eof = true;
                    state.pending.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

/// Classified events of `reader`, one per non-empty line
pub fn parse_output<R>(reader: R, dialect: &'static WireDialect) -> EventStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    lines(reader)
        .map(move |line| classify_line(&line, dialect))
        .boxed()
}

/// Classify a complete, already captured log
pub fn parse_log(text: &str, dialect: &WireDialect) -> Vec<OutputEvent> {
    let mut decoder = LineDecoder::new();
    let mut lines = decoder.push(text.as_bytes());
    lines.extend(decoder.finish());
    lines
        .iter()
        .map(|line| classify_line(line, dialect))
        .collect()
}
