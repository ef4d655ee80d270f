//! SSE plumbing for streaming adapters.
//!
//! A [`SseBuffer`] accumulates raw body chunks and hands back complete
//! `data:` payloads; [`sse_response_stream`] wires it to a `reqwest`
//! response and a provider-specific payload parser.

use crate::util::from_reqwest;
use sb_domain::error::Result;
use sb_domain::stream::{BoxStream, StreamEvent};

/// Incremental SSE event splitter.
///
/// Events are delimited by a blank line. `\r\n` line endings are
/// normalised so both `\n\n` and `\r\n\r\n` delimiters work.
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    buf: String,
}

impl SseBuffer {
    pub(crate) fn push(&mut self, chunk: &str) {
        self.buf.push_str(&chunk.replace("\r\n", "\n"));
    }

    /// Drain every complete event and return its `data:` payloads. A
    /// trailing partial event stays buffered.
    pub(crate) fn drain_payloads(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();
        while let Some(pos) = self.buf.find("\n\n") {
            let block: String = self.buf.drain(..pos + 2).collect();
            payloads.extend(data_lines(&block));
        }
        payloads
    }

    /// Flush whatever is left once the body has closed.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let rest = std::mem::take(&mut self.buf);
        data_lines(&rest)
    }
}

fn data_lines(block: &str) -> Vec<String> {
    block
        .lines()
        .filter_map(|line| line.trim().strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build a [`BoxStream`] from an SSE `reqwest::Response` and a payload
/// parser. A `Done` event is synthesised if the parser never produced one,
/// so consumers always see a terminal event.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut sse = SseBuffer::default();
        let mut done_emitted = false;

        loop {
            let payloads = match response.chunk().await {
                Ok(Some(bytes)) => {
                    sse.push(&String::from_utf8_lossy(&bytes));
                    sse.drain_payloads()
                }
                Ok(None) => {
                    let rest = sse.finish();
                    for data in rest {
                        for event in parse_data(&data) {
                            done_emitted |= matches!(&event, Ok(StreamEvent::Done { .. }));
                            yield event;
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            };
            for data in payloads {
                for event in parse_data(&data) {
                    done_emitted |= matches!(&event, Ok(StreamEvent::Done { .. }));
                    yield event;
                }
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
