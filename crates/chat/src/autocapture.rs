//! Autocapture: notice a recurring "I keep missing X" and offer to track it.
//!
//! The proposal is an ordinary pending action (`habit_create`), so nothing
//! changes until the user confirms it.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use sb_domain::config::AutoCaptureConfig;
use sb_domain::conversation::{ChatRole, ConversationMessage, NewPendingAction, PendingAction};
use sb_domain::error::Result;
use sb_domain::trace::TraceEvent;
use sb_sessions::ConversationStore;

use crate::cache::SessionCache;

pub const HABIT_CREATE: &str = "habit_create";

static INTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bi\s+(?:keep|always|constantly|still)\s+(?:on\s+)?(?:missing|skipping|forgetting|neglecting|putting\s+off|miss|skip|forget)\s+(?:to\s+)?(?:do\s+)?(?:my\s+|the\s+)?([a-z][a-z0-9' -]{1,60})",
    )
    .expect("autocapture intent regex must compile")
});

const QUESTION_WORDS: &[&str] = &[
    "what", "when", "where", "why", "who", "which", "how", "can", "could", "should", "would",
    "will", "do", "does", "did", "is", "are", "am",
];

/// Words that end the captured subject ("my workouts again lately").
const TRAILING: &[&str] = &[
    "again", "lately", "recently", "every", "each", "this", "these", "because", "and", "but",
    "so", "today", "week", "anymore",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    /// Display name of the habit to track.
    pub name: String,
    /// Normalized form used to match repeated mentions.
    pub signature: String,
}

/// Extract a recurring-miss intent from one message.
pub fn extract_intent(text: &str) -> Option<Intent> {
    let caps = INTENT_RE.captures(text)?;
    let raw = caps.get(1)?.as_str();
    let words: Vec<String> = raw
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .take_while(|w| !w.is_empty() && !TRAILING.contains(&w.as_str()))
        .take(4)
        .collect();
    if words.is_empty() {
        return None;
    }
    Some(Intent {
        name: words.join(" "),
        signature: words
            .iter()
            .map(|w| w.trim_end_matches('s'))
            .collect::<Vec<_>>()
            .join(" "),
    })
}

/// Questions and slash/confirm/cancel commands never trigger autocapture.
pub fn looks_like_question_or_command(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.ends_with('?') || trimmed.starts_with('/') {
        return true;
    }
    let first = trimmed
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .unwrap_or_default();
    QUESTION_WORDS.contains(&first.as_str()) || matches!(first.as_str(), "confirm" | "cancel")
}

/// How often `signature` was mentioned: the current input plus matching
/// user messages among the newest `lookback` user messages of `history`.
pub fn count_mentions(signature: &str, history: &[ConversationMessage], lookback: usize) -> usize {
    1 + history
        .iter()
        .rev()
        .filter(|m| m.role == ChatRole::User)
        .take(lookback)
        .filter_map(|m| extract_intent(&m.content))
        .filter(|i| i.signature == signature)
        .count()
}

/// An accepted proposal: the queued action and the reply to show.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub action: PendingAction,
    pub reply: String,
}

/// Queue a `habit_create` action when `input` repeats a recurring miss.
///
/// Callers must only invoke this when no action is pending.
pub fn propose(
    store: &dyn ConversationStore,
    cache: &SessionCache,
    input: &str,
    history: &[ConversationMessage],
    now: DateTime<Utc>,
    cfg: &AutoCaptureConfig,
    ttl: chrono::Duration,
) -> Result<Option<Proposal>> {
    if !cfg.enabled || looks_like_question_or_command(input) {
        return Ok(None);
    }
    let Some(intent) = extract_intent(input) else {
        return Ok(None);
    };
    let mentions = count_mentions(&intent.signature, history, cfg.lookback_user_messages);
    if mentions < cfg.min_mentions {
        tracing::debug!(signature = %intent.signature, mentions, "autocapture below threshold");
        return Ok(None);
    }
    if cache.autocapture_cooling(&intent.signature, now, cfg.cooldown()) {
        tracing::debug!(signature = %intent.signature, "autocapture cooling down");
        return Ok(None);
    }

    let mut payload = Map::new();
    payload.insert("name".into(), Value::String(intent.name.clone()));
    let action = store.create_pending_action(
        NewPendingAction {
            action_type: HABIT_CREATE.into(),
            summary: format!("Start tracking \"{}\" as a habit", intent.name),
            payload,
            ttl,
        },
        now,
    )?;
    cache.mark_autocapture(&intent.signature, now);

    TraceEvent::AutoCaptureProposed {
        action_id: action.id.clone(),
        signature: intent.signature.clone(),
    }
    .emit();

    let reply = format!(
        "You've mentioned missing {} {mentions} times recently. Want me to start \
         tracking it as a habit? Reply `{}` or `{}`.",
        intent.name,
        action.confirm_command(),
        action.cancel_command()
    );
    Ok(Some(Proposal { action, reply }))
}
