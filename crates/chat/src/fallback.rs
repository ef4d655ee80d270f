//! Deterministic replies built from tool data when the model can't answer.
//!
//! Pending actions always come first: an action awaiting confirmation must
//! never be dropped from the reply. Otherwise each successful tool call
//! renders one section from its raw result, in call order.

use serde_json::Value;

use sb_domain::config::CompactionLimits;
use sb_domain::conversation::PendingAction;
use sb_tools::ShaperRegistry;

/// One executed tool call: the full local result and what the model saw.
#[derive(Debug, Clone)]
pub struct ExecutedFunctionResponse {
    pub name: String,
    pub raw_response: Value,
    pub model_response: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    RoundLimit,
    RateLimit,
    EmptyText,
}

impl FallbackReason {
    fn intro(&self) -> &'static str {
        match self {
            FallbackReason::RoundLimit => {
                "I couldn't finish working through that, but here is what I found so far:"
            }
            FallbackReason::RateLimit => {
                "The assistant service is busy right now, so here is what I found so far:"
            }
            FallbackReason::EmptyText => "Here is what I found:",
        }
    }

    fn apology(&self) -> &'static str {
        match self {
            FallbackReason::RateLimit => {
                "Sorry, the assistant service is receiving too many requests right now. \
                 Please try again in a moment."
            }
            _ => "Sorry, I couldn't put together an answer this time. Please try again.",
        }
    }
}

/// List every pending action with the command that resolves it.
pub fn pending_actions_reply(pending: &[PendingAction]) -> String {
    let mut out = String::from(if pending.len() == 1 {
        "This change is waiting for your confirmation:"
    } else {
        "These changes are waiting for your confirmation:"
    });
    for action in pending {
        out.push_str(&format!(
            "\n- {} (reply `{}` or `{}`)",
            action.summary,
            action.confirm_command(),
            action.cancel_command()
        ));
    }
    out
}

/// Build the fallback reply for `reason`.
pub fn synthesize(
    reason: FallbackReason,
    executed: &[ExecutedFunctionResponse],
    pending: &[PendingAction],
    shapers: &ShaperRegistry,
    limits: &CompactionLimits,
) -> String {
    if !pending.is_empty() {
        return pending_actions_reply(pending);
    }

    let sections: Vec<String> = executed
        .iter()
        .filter_map(|e| {
            shapers
                .get(&e.name)
                .fallback_section(&e.name, &e.raw_response, limits)
        })
        .collect();

    if sections.is_empty() {
        return reason.apology().to_string();
    }
    format!("{}\n\n{}", reason.intro(), sections.join("\n\n"))
}

/// Reply used when nothing else applies.
pub fn apology(reason: FallbackReason) -> String {
    reason.apology().to_string()
}
