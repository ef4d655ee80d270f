//! Context compression: condense older history into a bounded summary.
//!
//! The newest `preserve_recent` messages stay verbatim; everything older is
//! summarized, by the model when it cooperates and by a heuristic extract
//! from the latest user/assistant lines otherwise. Compression never fails.

use std::time::Instant;

use sb_domain::config::ContextCompressionConfig;
use sb_domain::conversation::{ChatRole, ConversationMessage, PendingAction};
use sb_domain::tool::Message;
use sb_domain::trace::TraceEvent;
use sb_providers::{ChatRequest, LlmProvider};
use sb_tools::compact::truncate_chars;

use crate::cache::SessionCache;

/// Result of compressing a history.
#[derive(Debug, Clone)]
pub struct CompressedContext {
    pub summary: String,
    /// Messages kept verbatim, oldest first.
    pub preserved: Vec<ConversationMessage>,
    pub compressed_count: usize,
    /// Whether the summary came from the model (or a cached model summary).
    pub used_model: bool,
}

const SUMMARY_SECTIONS: [&str; 5] = [
    "Objectives",
    "Deadlines",
    "Commitments",
    "Preferences",
    "Open loops",
];

/// Split into (compressible, preserved). `preserved` is the newest
/// `preserve_recent` messages.
pub fn split_history(
    history: &[ConversationMessage],
    preserve_recent: usize,
) -> (&[ConversationMessage], &[ConversationMessage]) {
    let cut = history.len().saturating_sub(preserve_recent);
    history.split_at(cut)
}

fn role_label(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "User",
        ChatRole::Assistant => "Assistant",
    }
}

/// Plain-text transcript of `messages` followed by the pending actions.
pub fn build_transcript(
    messages: &[ConversationMessage],
    pending: &[PendingAction],
    line_chars: usize,
) -> String {
    let mut buf = String::new();
    for msg in messages {
        let content = msg.content.split_whitespace().collect::<Vec<_>>().join(" ");
        if content.is_empty() {
            continue;
        }
        buf.push_str(&format!(
            "[{}] {}: {}\n",
            msg.timestamp.format("%Y-%m-%d %H:%M"),
            role_label(msg.role),
            truncate_chars(&content, line_chars)
        ));
    }
    if !pending.is_empty() {
        buf.push_str("\nPending actions awaiting confirmation:\n");
        for action in pending {
            buf.push_str(&format!("- {} ({})\n", action.summary, action.id));
        }
    }
    buf
}

pub fn summary_prompt(transcript: &str, max_chars: usize) -> String {
    let sections = SUMMARY_SECTIONS
        .iter()
        .map(|s| format!("{s}:"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Summarize the earlier part of a conversation between a student and \
         their study assistant. Use exactly these sections, each with short \
         bullet points, and write \"none\" for an empty section:\n\n{sections}\n\n\
         Keep concrete dates, course names and numbers. Omit greetings. \
         Stay under {max_chars} characters.\n\nCONVERSATION:\n{transcript}"
    )
}

/// Extractive summary from the newest user/assistant lines. Always returns
/// a non-empty string.
pub fn heuristic_summary(
    messages: &[ConversationMessage],
    lines: usize,
    line_chars: usize,
    max_chars: usize,
) -> String {
    let picked: Vec<String> = messages
        .iter()
        .rev()
        .filter(|m| !m.content.trim().is_empty())
        .take(lines)
        .map(|m| {
            let content = m.content.split_whitespace().collect::<Vec<_>>().join(" ");
            format!("- {}: {}", role_label(m.role), truncate_chars(&content, line_chars))
        })
        .collect();

    let summary = if picked.is_empty() {
        "Earlier conversation: nothing notable.".to_string()
    } else {
        let mut out = String::from("Earlier conversation (most recent last):");
        for line in picked.iter().rev() {
            out.push('\n');
            out.push_str(line);
        }
        out
    };
    cap(&summary, max_chars)
}

fn cap(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        truncate_chars(text, max_chars.saturating_sub(1))
    }
}

/// Ask `provider` for the structured summary; `None` on any failure or an
/// empty answer.
async fn model_summary(
    provider: &dyn LlmProvider,
    transcript: &str,
    cfg: &ContextCompressionConfig,
) -> Option<String> {
    let req = ChatRequest {
        messages: vec![Message::user(summary_prompt(transcript, cfg.summary_max_chars))],
        tools: vec![],
        temperature: Some(0.1),
        max_tokens: Some(1024),
        model: None,
    };
    match provider.chat(&req).await {
        Ok(resp) if !resp.content.trim().is_empty() => {
            Some(cap(resp.content.trim(), cfg.summary_max_chars))
        }
        Ok(_) => {
            tracing::warn!("summarizer returned empty text; using heuristic summary");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "summarizer call failed; using heuristic summary");
            None
        }
    }
}

/// Compress `history` when it is long enough. Returns `None` when
/// compression is disabled or nothing would be compressed.
///
/// A summary is reused from `cache` while the compressed span ends at the
/// same message.
pub async fn compress(
    provider: &dyn LlmProvider,
    cache: &SessionCache,
    history: &[ConversationMessage],
    pending: &[PendingAction],
    cfg: &ContextCompressionConfig,
) -> Option<CompressedContext> {
    if !cfg.enabled || history.len() < cfg.trigger_messages {
        return None;
    }
    let (older, recent) = split_history(history, cfg.preserve_recent);
    let boundary = older.last()?;

    if let Some(summary) = cache.summary_through(&boundary.id) {
        tracing::debug!(through = %boundary.id, "reusing cached context summary");
        return Some(CompressedContext {
            summary,
            preserved: recent.to_vec(),
            compressed_count: older.len(),
            used_model: true,
        });
    }

    let started = Instant::now();
    let transcript = build_transcript(older, pending, cfg.transcript_line_chars);
    let (summary, used_model) = match model_summary(provider, &transcript, cfg).await {
        Some(summary) => (summary, true),
        None => (
            heuristic_summary(
                older,
                cfg.heuristic_lines,
                cfg.transcript_line_chars,
                cfg.summary_max_chars,
            ),
            false,
        ),
    };
    if used_model {
        cache.store_summary(&boundary.id, &summary);
    }

    tracing::info!(
        compressed = older.len(),
        preserved = recent.len(),
        used_model,
        duration_ms = started.elapsed().as_millis() as u64,
        "history compressed"
    );
    TraceEvent::ContextCompressed {
        compressed_messages: older.len(),
        preserved_messages: recent.len(),
        summary_chars: summary.chars().count(),
        used_model,
    }
    .emit();

    Some(CompressedContext {
        summary,
        preserved: recent.to_vec(),
        compressed_count: older.len(),
        used_model,
    })
}
