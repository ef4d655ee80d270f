//! Streaming helpers: fold a provider event stream into a response while
//! forwarding text deltas, and chunk finished replies for callers that asked
//! for streaming but got none.

use std::collections::HashMap;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use sb_domain::error::{Error, Result};
use sb_domain::stream::{BoxStream, StreamEvent};
use sb_domain::tool::ToolCall;
use sb_providers::ChatResponse;

use crate::turn::TurnEvent;

/// Drain a provider stream into a [`ChatResponse`], forwarding tokens as
/// [`TurnEvent::AssistantDelta`]. Leading and trailing whitespace of the call
/// is held back, so on success `shown` equals `content.trim()`. On error
/// `shown` still holds whatever reached the caller.
pub(crate) async fn collect_stream(
    provider: &str,
    mut stream: BoxStream<'static, Result<StreamEvent>>,
    tx: &mpsc::Sender<TurnEvent>,
    shown: &mut String,
) -> Result<ChatResponse> {
    let mut response = ChatResponse::default();
    let mut held = String::new();
    // call_id -> (name, args_json), for providers that only send start+delta.
    let mut tc_bufs: HashMap<String, (String, String)> = HashMap::new();

    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Token { text } => {
                response.content.push_str(&text);
                let visible = trimmed_delta(&text, !shown.is_empty(), &mut held);
                if visible.is_empty() {
                    continue;
                }
                shown.push_str(&visible);
                let _ = tx.send(TurnEvent::AssistantDelta { text: visible }).await;
            }
            StreamEvent::ToolCallStarted { call_id, tool_name } => {
                tc_bufs.insert(call_id, (tool_name, String::new()));
            }
            StreamEvent::ToolCallDelta { call_id, delta } => {
                if let Some((_, args)) = tc_bufs.get_mut(&call_id) {
                    args.push_str(&delta);
                }
            }
            StreamEvent::ToolCallFinished {
                call_id,
                tool_name,
                arguments,
            } => {
                tc_bufs.remove(&call_id);
                response.tool_calls.push(ToolCall {
                    call_id,
                    tool_name,
                    arguments,
                });
            }
            StreamEvent::Done {
                usage,
                finish_reason,
            } => {
                response.usage = usage;
                response.finish_reason = finish_reason;
            }
            StreamEvent::Error { message } => {
                return Err(Error::Provider {
                    provider: provider.to_string(),
                    message,
                });
            }
        }
    }

    for (call_id, (tool_name, args)) in tc_bufs.drain() {
        let arguments = if args.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&args).unwrap_or_else(|e| {
                tracing::warn!(
                    call_id = %call_id,
                    tool = %tool_name,
                    error = %e,
                    "tool call arguments are not valid JSON; defaulting to empty object"
                );
                Value::Object(Default::default())
            })
        };
        response.tool_calls.push(ToolCall {
            call_id,
            tool_name,
            arguments,
        });
    }

    Ok(response)
}

/// The part of `text` that can be shown now. Whitespace before the first
/// visible character is dropped; trailing whitespace waits in `held` until
/// more text follows it.
fn trimmed_delta(text: &str, started: bool, held: &mut String) -> String {
    let text = if started { text } else { text.trim_start() };
    let body = text.trim_end();
    if body.is_empty() {
        if started {
            held.push_str(text);
        }
        return String::new();
    }
    let mut out = std::mem::take(held);
    out.push_str(body);
    held.push_str(&text[body.len()..]);
    out
}

/// Split `text` into pieces of at most `chunk_chars` characters.
pub fn chunk_reply(text: &str, chunk_chars: usize) -> Vec<String> {
    let size = chunk_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_domain::stream::Usage;

    #[test]
    fn chunks_rejoin_to_original() {
        let text = "Calculus lecture at 09:00, café after ✓";
        let chunks = chunk_reply(text, 7);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
        assert_eq!(chunks.concat(), text);
        assert!(chunk_reply("", 5).is_empty());
    }

    #[tokio::test]
    async fn folds_tokens_tool_calls_and_usage() {
        let events: Vec<Result<StreamEvent>> = vec![
            Ok(StreamEvent::Token { text: "Hel".into() }),
            Ok(StreamEvent::Token { text: "lo".into() }),
            Ok(StreamEvent::ToolCallStarted {
                call_id: "c1".into(),
                tool_name: "get_goals".into(),
            }),
            Ok(StreamEvent::ToolCallDelta {
                call_id: "c1".into(),
                delta: "{\"limit\":".into(),
            }),
            Ok(StreamEvent::ToolCallDelta {
                call_id: "c1".into(),
                delta: "2}".into(),
            }),
            Ok(StreamEvent::Done {
                usage: Some(Usage {
                    prompt_tokens: 3,
                    completion_tokens: 2,
                    total_tokens: 5,
                }),
                finish_reason: Some("stop".into()),
            }),
        ];
        let stream: BoxStream<'static, Result<StreamEvent>> =
            Box::pin(futures_util::stream::iter(events));
        let (tx, mut rx) = mpsc::channel(16);

        let mut shown = String::new();
        let resp = collect_stream("test", stream, &tx, &mut shown).await.unwrap();
        drop(tx);

        assert_eq!(resp.content, "Hello");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].arguments["limit"], 2);
        assert_eq!(resp.usage.map(|u| u.total_tokens), Some(5));

        let mut deltas = String::new();
        while let Some(ev) = rx.recv().await {
            if let TurnEvent::AssistantDelta { text } = ev {
                deltas.push_str(&text);
            }
        }
        assert_eq!(deltas, "Hello");
        assert_eq!(shown, "Hello");
    }

    #[tokio::test]
    async fn surrounding_whitespace_is_never_forwarded() {
        let tokens = ["\n  ", " Gym", " streak ", "\n", "is 3.", "  \n"];
        let events: Vec<Result<StreamEvent>> = tokens
            .iter()
            .map(|t| Ok(StreamEvent::Token { text: t.to_string() }))
            .collect();
        let stream: BoxStream<'static, Result<StreamEvent>> =
            Box::pin(futures_util::stream::iter(events));
        let (tx, mut rx) = mpsc::channel(16);

        let mut shown = String::new();
        let resp = collect_stream("test", stream, &tx, &mut shown).await.unwrap();
        drop(tx);

        let mut deltas = String::new();
        while let Some(ev) = rx.recv().await {
            if let TurnEvent::AssistantDelta { text } = ev {
                deltas.push_str(&text);
            }
        }
        assert_eq!(resp.content, tokens.concat());
        assert_eq!(deltas, resp.content.trim());
        assert_eq!(shown, deltas);
    }

    #[tokio::test]
    async fn error_event_fails_the_call() {
        let stream: BoxStream<'static, Result<StreamEvent>> =
            Box::pin(futures_util::stream::iter(vec![Ok(StreamEvent::Error {
                message: "boom".into(),
            })]));
        let (tx, _rx) = mpsc::channel(4);
        let mut shown = String::new();
        let err = collect_stream("test", stream, &tx, &mut shown)
            .await
            .unwrap_err();
        assert!(!err.is_rate_limit());
        assert!(shown.is_empty());
    }
}
