//! Action command parsing.
//!
//! Turns free text into a confirm/cancel decision for one pending action.
//! Resolution order:
//! 1. `confirm <id>` / `cancel <id>` where the token looks like an action id
//! 2. bare `confirm` / `cancel` with exactly one action pending
//! 3. an action id anywhere in the text, with a confirm/cancel keyword, or
//!    alone when it names a pending action (treated as confirm). Negations
//!    ("don't confirm", "no, not ...") cancel; mixed signals resolve nothing
//! 4. with exactly one action pending, an affirmative or negative reply
//!
//! Anything else is not an action command and goes to the model.

use std::sync::LazyLock;

use regex::Regex;

use sb_domain::conversation::PendingAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCommandKind {
    Confirm,
    Cancel,
}

impl ActionCommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCommandKind::Confirm => "confirm",
            ActionCommandKind::Cancel => "cancel",
        }
    }
}

/// A resolved command. `action_id` may name an action that no longer
/// exists; the caller reports that instead of guessing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCommand {
    pub kind: ActionCommandKind,
    pub action_id: String,
}

const AFFIRMATIVE: &[&str] = &[
    "yes", "y", "yep", "yeah", "sure", "ok", "okay", "confirm", "confirmed", "do it", "go ahead",
    "sounds good", "please do", "approve", "looks good",
];

const NEGATIVE: &[&str] = &[
    "no", "n", "nope", "cancel", "stop", "don't", "do not", "never mind", "nevermind", "skip",
    "reject",
];

/// Words that may pad a reply without changing its meaning ("yes please").
const FILLER: &[&str] = &[
    "please", "thanks", "thank", "you", "it", "that", "this", "one", "now", "then", "the",
    "action",
];

static ACTION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bact-[0-9a-f]{6,}\b").expect("action id regex must compile"));

/// Lowercase, unify apostrophes, and drop punctuation other than `-` and `'`.
fn normalize(input: &str) -> String {
    input
        .to_lowercase()
        .replace('’', "'")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify a whole reply as affirmative or negative.
///
/// Every word must belong to a known phrase or be filler, and all phrases
/// must agree, so "yes but move it to friday" is not a confirmation.
pub fn implicit_decision(input: &str) -> Option<ActionCommandKind> {
    let normalized = normalize(input);
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    if words.is_empty() {
        return None;
    }

    let mut decision: Option<ActionCommandKind> = None;
    let mut i = 0;
    'words: while i < words.len() {
        // Two-word phrases first so "do not" wins over a lone "do".
        for len in [2, 1] {
            if i + len > words.len() {
                continue;
            }
            let candidate = words[i..i + len].join(" ");
            let kind = if NEGATIVE.contains(&candidate.as_str()) {
                Some(ActionCommandKind::Cancel)
            } else if AFFIRMATIVE.contains(&candidate.as_str()) {
                Some(ActionCommandKind::Confirm)
            } else {
                None
            };
            if let Some(kind) = kind {
                if decision.is_some_and(|d| d != kind) {
                    return None;
                }
                decision = Some(kind);
                i += len;
                continue 'words;
            }
        }
        if FILLER.contains(&words[i]) {
            i += 1;
            continue;
        }
        return None;
    }
    decision
}

/// Whether the text is a confirm/cancel signal that does not name an action.
pub fn is_implicit_signal(input: &str) -> bool {
    implicit_decision(input).is_some()
}

/// Negations flip whatever they precede: "don't confirm" cancels.
const NEGATIONS: &[&str] = &["don't", "dont", "do not", "not", "never"];

/// Decision words found in text that also names an action id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Decided(ActionCommandKind),
    /// No decision words at all.
    Silent,
    /// Both directions, or a negated "cancel". Never guessed.
    Conflicting,
}

fn keyword_in(words: &[&str]) -> Keyword {
    let (mut cancel, mut confirm, mut conflict) = (false, false, false);
    // The previous word was a negation.
    let mut negated = false;
    let mut i = 0;
    'words: while i < words.len() {
        for len in [2, 1] {
            if i + len > words.len() {
                continue;
            }
            let candidate = words[i..i + len].join(" ");
            let candidate = candidate.as_str();
            if NEGATIONS.contains(&candidate) {
                cancel = true;
                negated = true;
            } else if NEGATIVE.contains(&candidate) || candidate == "discard" {
                if negated {
                    conflict = true;
                }
                cancel = true;
                negated = false;
            } else if AFFIRMATIVE.contains(&candidate) || candidate == "apply" {
                if !negated {
                    confirm = true;
                }
                negated = false;
            } else {
                continue;
            }
            i += len;
            continue 'words;
        }
        negated = false;
        i += 1;
    }

    match (cancel, confirm) {
        _ if conflict => Keyword::Conflicting,
        (true, true) => Keyword::Conflicting,
        (true, false) => Keyword::Decided(ActionCommandKind::Cancel),
        (false, true) => Keyword::Decided(ActionCommandKind::Confirm),
        (false, false) => Keyword::Silent,
    }
}

fn bare_verb(words: &[&str]) -> Option<ActionCommandKind> {
    let (first, rest) = words.split_first()?;
    let kind = match *first {
        "confirm" => ActionCommandKind::Confirm,
        "cancel" => ActionCommandKind::Cancel,
        _ => return None,
    };
    rest.iter().all(|w| FILLER.contains(w)).then_some(kind)
}

/// Resolve `input` against the currently pending actions.
pub fn parse_action_command(input: &str, pending: &[PendingAction]) -> Option<ActionCommand> {
    let normalized = normalize(input);
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    if words.is_empty() {
        return None;
    }
    let is_pending = |token: &str| pending.iter().any(|a| a.id == token);
    let single = (pending.len() == 1).then(|| &pending[0]);

    // 1. Explicit `confirm <id>` / `cancel <id>`.
    if words.len() == 2 {
        let token = words[1];
        if ACTION_ID_RE.is_match(token) || is_pending(token) {
            match words[0] {
                "confirm" => return Some(command(ActionCommandKind::Confirm, token)),
                "cancel" => return Some(command(ActionCommandKind::Cancel, token)),
                _ => {}
            }
        }
    }

    // 2. Bare verb with a single pending action.
    if let (Some(kind), Some(only)) = (bare_verb(&words), single) {
        return Some(command(kind, &only.id));
    }

    // 3. An id anywhere in the text.
    // A bare id confirms only when nothing in the text says otherwise.
    let ids: Vec<&str> = ACTION_ID_RE
        .find_iter(&normalized)
        .map(|m| m.as_str())
        .collect();
    let id = ids
        .iter()
        .copied()
        .find(|id| is_pending(id))
        .or_else(|| words.iter().copied().find(|w| is_pending(w)))
        .or(ids.first().copied());
    if let Some(id) = id {
        match keyword_in(&words) {
            Keyword::Decided(kind) => return Some(command(kind, id)),
            Keyword::Conflicting => return None,
            Keyword::Silent if is_pending(id) => {
                return Some(command(ActionCommandKind::Confirm, id))
            }
            Keyword::Silent => {}
        }
    }

    // 4. Natural-language reply to the only pending action.
    let only = single?;
    implicit_decision(input).map(|kind| command(kind, &only.id))
}

fn command(kind: ActionCommandKind, id: &str) -> ActionCommand {
    ActionCommand {
        kind,
        action_id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn action(id: &str) -> PendingAction {
        let now = Utc::now();
        PendingAction {
            id: id.into(),
            action_type: "deadline_update".into(),
            summary: "Mark essay as done".into(),
            payload: Default::default(),
            created_at: now,
            expires_at: now + Duration::hours(1),
        }
    }

    fn parse(input: &str, pending: &[PendingAction]) -> Option<(ActionCommandKind, String)> {
        parse_action_command(input, pending).map(|c| (c.kind, c.action_id))
    }

    #[test]
    fn single_pending_resolves_short_replies() {
        let pending = vec![action("act-1a2b3c4d")];
        let confirm = Some((ActionCommandKind::Confirm, "act-1a2b3c4d".to_string()));
        let cancel = Some((ActionCommandKind::Cancel, "act-1a2b3c4d".to_string()));

        assert_eq!(parse("confirm", &pending), confirm);
        assert_eq!(parse("Yes", &pending), confirm);
        assert_eq!(parse("yes please!", &pending), confirm);
        assert_eq!(parse("sounds good", &pending), confirm);
        assert_eq!(parse("act-1a2b3c4d", &pending), confirm);
        assert_eq!(parse("cancel", &pending), cancel);
        assert_eq!(parse("no", &pending), cancel);
        assert_eq!(parse("nope, never mind", &pending), cancel);
        assert_eq!(parse("don't", &pending), cancel);
    }

    #[test]
    fn explicit_command_wins_even_for_unknown_id() {
        let pending = vec![action("act-1a2b3c4d")];
        assert_eq!(
            parse("Confirm act-deadbeef.", &pending),
            Some((ActionCommandKind::Confirm, "act-deadbeef".to_string()))
        );
        assert_eq!(
            parse("`cancel act-1a2b3c4d`", &[]),
            Some((ActionCommandKind::Cancel, "act-1a2b3c4d".to_string()))
        );
    }

    #[test]
    fn two_pending_never_guess() {
        let pending = vec![action("act-11111111"), action("act-22222222")];
        assert_eq!(parse("yes", &pending), None);
        assert_eq!(parse("confirm", &pending), None);
        assert!(is_implicit_signal("yes"));
        assert_eq!(
            parse("please cancel act-22222222 for me", &pending),
            Some((ActionCommandKind::Cancel, "act-22222222".to_string()))
        );
        assert_eq!(
            parse("act-11111111", &pending),
            Some((ActionCommandKind::Confirm, "act-11111111".to_string()))
        );
    }

    #[test]
    fn ordinary_messages_are_not_commands() {
        let pending = vec![action("act-1a2b3c4d")];
        assert_eq!(parse("what's on my schedule today?", &pending), None);
        assert_eq!(parse("yes but move it to friday", &pending), None);
        assert_eq!(parse("yes no", &pending), None);
        assert_eq!(parse("yes", &[]), None);
        assert_eq!(parse("", &pending), None);
    }

    #[test]
    fn refusals_naming_an_id_cancel() {
        let pending = vec![action("act-1a2b3c4d")];
        let cancel = Some((ActionCommandKind::Cancel, "act-1a2b3c4d".to_string()));

        assert_eq!(parse("no act-1a2b3c4d", &pending), cancel);
        assert_eq!(parse("nope act-1a2b3c4d", &pending), cancel);
        assert_eq!(parse("no, not act-1a2b3c4d", &pending), cancel);
        assert_eq!(parse("don't confirm act-1a2b3c4d", &pending), cancel);
        assert_eq!(parse("Do not apply act-1a2b3c4d!", &pending), cancel);
        assert_eq!(parse("never mind act-1a2b3c4d", &pending), cancel);

        // Same with two pending, where no short reply could resolve it.
        let two = vec![action("act-1a2b3c4d"), action("act-22222222")];
        assert_eq!(parse("nope act-1a2b3c4d", &two), cancel);
    }

    #[test]
    fn mixed_signals_with_an_id_are_not_commands() {
        let pending = vec![action("act-1a2b3c4d")];
        assert_eq!(parse("yes cancel act-1a2b3c4d", &pending), None);
        assert_eq!(parse("don't cancel act-1a2b3c4d", &pending), None);
        assert_eq!(parse("ok no act-1a2b3c4d", &pending), None);
        assert_eq!(
            parse("sure, go ahead with act-1a2b3c4d", &pending),
            Some((ActionCommandKind::Confirm, "act-1a2b3c4d".to_string()))
        );
    }

    #[test]
    fn unknown_id_without_keyword_is_ignored() {
        assert_eq!(parse("what was act-abcdef12 about", &[]), None);
    }
}
