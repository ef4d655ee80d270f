//! Conversation data model shared by the turn controller, the persistence
//! collaborator, and the tool layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stream::Usage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Messages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// An inline attachment (currently images) sent with a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub mime_type: String,
    /// Base64-encoded payload.
    pub data: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// A persisted chat message. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ConversationMetadata>,
}

/// Metadata bag attached to an assistant message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    /// Compressed history used as context for this turn; empty when the
    /// turn relied on recent messages and on-demand tool calls only.
    #[serde(default)]
    pub context_window: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_actions: Vec<PendingActionSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_execution: Option<ActionExecution>,
}

/// One page of conversation history. Page 1 holds the newest messages;
/// messages inside a page are ordered oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub messages: Vec<ConversationMessage>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub has_more: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pending actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A proposed mutation awaiting explicit confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: String,
    pub action_type: String,
    pub summary: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn confirm_command(&self) -> String {
        format!("confirm {}", self.id)
    }

    pub fn cancel_command(&self) -> String {
        format!("cancel {}", self.id)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn to_summary(&self) -> PendingActionSummary {
        PendingActionSummary {
            id: self.id.clone(),
            action_type: self.action_type.clone(),
            summary: self.summary.clone(),
            expires_at: self.expires_at,
        }
    }
}

/// What a tool (or autocapture) asks the store to queue.
#[derive(Debug, Clone)]
pub struct NewPendingAction {
    pub action_type: String,
    pub summary: String,
    pub payload: Map<String, Value>,
    pub ttl: chrono::Duration,
}

/// Pending-action reference stored in chat metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingActionSummary {
    pub id: String,
    pub action_type: String,
    pub summary: String,
    pub expires_at: DateTime<Utc>,
}

/// Result reported by the mutation collaborator for a confirmed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExecutionResult {
    pub action_id: String,
    pub action_type: String,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Confirmed,
    Cancelled,
    Failed,
}

/// How an action command was resolved, recorded on the reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExecution {
    pub action_id: String,
    pub action_type: String,
    pub outcome: ActionOutcome,
    pub message: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Citations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationType {
    ScheduleItem,
    Deadline,
    Email,
    SocialPost,
    Habit,
    Goal,
    Document,
}

impl CitationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CitationType::ScheduleItem => "schedule_item",
            CitationType::Deadline => "deadline",
            CitationType::Email => "email",
            CitationType::SocialPost => "social_post",
            CitationType::Habit => "habit",
            CitationType::Goal => "goal",
            CitationType::Document => "document",
        }
    }
}

/// A user-visible source reference. Recomputed every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CitationType,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Citation {
    /// Dedup key: `type:id`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Finish reasons
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Finish-reason tags for replies that did not come straight from the model.
pub mod finish_reason {
    pub const ROUND_LIMIT_FALLBACK: &str = "tool_call_round_limit_fallback";
    pub const RATE_LIMIT_FALLBACK: &str = "rate_limit_fallback";
    pub const EMPTY_TEXT_FALLBACK: &str = "empty_model_text_fallback";
    pub const ACTION_COMMAND: &str = "action_command";
    pub const ACTION_DISAMBIGUATION: &str = "action_disambiguation";
    pub const AUTOCAPTURE: &str = "autocapture";
}
