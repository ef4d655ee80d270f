//! Conversation store.
//!
//! Messages are append-only. Pending actions live until they are deleted
//! (confirmed or cancelled) or until `expires_at` passes; expired actions are
//! invisible to readers and purged on the next write.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use sb_domain::conversation::{
    Attachment, ChatRole, ConversationMessage, ConversationMetadata, HistoryPage,
    NewPendingAction, PendingAction,
};
use sb_domain::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Persistence collaborator used by the turn controller and by tools.
///
/// Implementations only need the guarantees of a single-process request
/// handler: each call observes every write that completed before it.
pub trait ConversationStore: Send + Sync {
    /// Append a message to the conversation.
    fn record_message(
        &self,
        role: ChatRole,
        content: &str,
        attachments: Vec<Attachment>,
        metadata: Option<ConversationMetadata>,
    ) -> Result<ConversationMessage>;

    /// The newest `limit` messages, oldest first.
    fn recent_messages(&self, limit: usize) -> Result<Vec<ConversationMessage>>;

    /// Every unexpired pending action, oldest first.
    fn pending_actions(&self, now: DateTime<Utc>) -> Result<Vec<PendingAction>>;

    /// Look up one unexpired pending action.
    fn pending_action(&self, id: &str, now: DateTime<Utc>) -> Result<Option<PendingAction>>;

    /// Queue a new action awaiting confirmation.
    fn create_pending_action(
        &self,
        action: NewPendingAction,
        now: DateTime<Utc>,
    ) -> Result<PendingAction>;

    /// Remove a pending action. Returns whether it existed.
    fn delete_pending_action(&self, id: &str) -> Result<bool>;

    /// One page of history; page 1 is the newest.
    fn history_page(&self, page: usize, page_size: usize) -> Result<HistoryPage>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    messages: Vec<ConversationMessage>,
    #[serde(default)]
    pending_actions: Vec<PendingAction>,
}

/// In-memory [`ConversationStore`].
///
/// Created with [`MemoryStore::open`], every write is also flushed to
/// `conversation.json` under the given directory. A write whose flush fails
/// is rolled back, so memory never runs ahead of disk.
#[derive(Default)]
pub struct MemoryStore {
    path: Option<PathBuf>,
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load or create a store backed by `dir/conversation.json`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::Io)?;
        let path = dir.join("conversation.json");
        let state: Snapshot = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("parsing {}: {e}", path.display())))?
        } else {
            Snapshot::default()
        };

        tracing::info!(
            messages = state.messages.len(),
            pending_actions = state.pending_actions.len(),
            path = %path.display(),
            "conversation store loaded"
        );

        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    /// Total number of recorded messages.
    pub fn message_count(&self) -> usize {
        self.state.read().messages.len()
    }

    fn flush(&self, state: &Snapshot) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Storage(format!("serializing conversation: {e}")))?;
        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(Error::Io)?;
        std::fs::rename(&tmp, path).map_err(Error::Io)?;
        Ok(())
    }
}

fn action_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("act-{}", &hex[..8])
}

impl ConversationStore for MemoryStore {
    fn record_message(
        &self,
        role: ChatRole,
        content: &str,
        attachments: Vec<Attachment>,
        metadata: Option<ConversationMetadata>,
    ) -> Result<ConversationMessage> {
        let message = ConversationMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
            attachments,
            metadata,
        };

        let mut state = self.state.write();
        state.messages.push(message.clone());
        if let Err(e) = self.flush(&state) {
            state.messages.pop();
            return Err(e);
        }

        tracing::debug!(
            message_id = %message.id,
            role = role.as_str(),
            chars = message.content.len(),
            "message recorded"
        );
        Ok(message)
    }

    fn recent_messages(&self, limit: usize) -> Result<Vec<ConversationMessage>> {
        let state = self.state.read();
        let start = state.messages.len().saturating_sub(limit);
        Ok(state.messages[start..].to_vec())
    }

    fn pending_actions(&self, now: DateTime<Utc>) -> Result<Vec<PendingAction>> {
        Ok(self
            .state
            .read()
            .pending_actions
            .iter()
            .filter(|a| !a.is_expired(now))
            .cloned()
            .collect())
    }

    fn pending_action(&self, id: &str, now: DateTime<Utc>) -> Result<Option<PendingAction>> {
        Ok(self
            .state
            .read()
            .pending_actions
            .iter()
            .find(|a| a.id == id && !a.is_expired(now))
            .cloned())
    }

    fn create_pending_action(
        &self,
        action: NewPendingAction,
        now: DateTime<Utc>,
    ) -> Result<PendingAction> {
        let pending = PendingAction {
            id: action_id(),
            action_type: action.action_type,
            summary: action.summary,
            payload: action.payload,
            created_at: now,
            expires_at: now + action.ttl,
        };

        let mut state = self.state.write();
        let previous = state.pending_actions.clone();
        state.pending_actions.retain(|a| !a.is_expired(now));
        let purged = previous.len() - state.pending_actions.len();
        state.pending_actions.push(pending.clone());
        if let Err(e) = self.flush(&state) {
            state.pending_actions = previous;
            return Err(e);
        }

        tracing::info!(
            action_id = %pending.id,
            action_type = %pending.action_type,
            purged_expired = purged,
            "pending action created"
        );
        Ok(pending)
    }

    fn delete_pending_action(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write();
        let previous = state.pending_actions.clone();
        state.pending_actions.retain(|a| a.id != id);
        let removed = state.pending_actions.len() < previous.len();
        if removed {
            if let Err(e) = self.flush(&state) {
                state.pending_actions = previous;
                return Err(e);
            }
            tracing::info!(action_id = %id, "pending action deleted");
        }
        Ok(removed)
    }

    fn history_page(&self, page: usize, page_size: usize) -> Result<HistoryPage> {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let state = self.state.read();
        let total = state.messages.len();

        let end = total.saturating_sub((page - 1).saturating_mul(page_size));
        let start = end.saturating_sub(page_size);

        Ok(HistoryPage {
            messages: state.messages[start..end].to_vec(),
            page,
            page_size,
            total,
            has_more: start > 0,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::Map;

    fn new_action(summary: &str, ttl: Duration) -> NewPendingAction {
        NewPendingAction {
            action_type: "deadline_update".into(),
            summary: summary.into(),
            payload: Map::new(),
            ttl,
        }
    }

    fn record(store: &MemoryStore, role: ChatRole, content: &str) {
        store
            .record_message(role, content, Vec::new(), None)
            .unwrap();
    }

    #[test]
    fn recent_messages_are_oldest_first() {
        let store = MemoryStore::new();
        for i in 0..5 {
            record(&store, ChatRole::User, &format!("m{i}"));
        }
        let recent = store.recent_messages(3).unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert_eq!(store.recent_messages(50).unwrap().len(), 5);
    }

    #[test]
    fn action_ids_have_stable_shape() {
        let store = MemoryStore::new();
        let a = store
            .create_pending_action(new_action("x", Duration::hours(1)), Utc::now())
            .unwrap();
        assert!(a.id.starts_with("act-"));
        assert_eq!(a.id.len(), 12);
        assert!(a.id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn expired_actions_are_hidden_and_purged() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let short = store
            .create_pending_action(new_action("short", Duration::minutes(5)), now)
            .unwrap();
        let long = store
            .create_pending_action(new_action("long", Duration::hours(5)), now)
            .unwrap();

        let later = now + Duration::minutes(10);
        let visible = store.pending_actions(later).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, long.id);
        assert!(store.pending_action(&short.id, later).unwrap().is_none());

        store
            .create_pending_action(new_action("third", Duration::hours(1)), later)
            .unwrap();
        assert_eq!(store.state.read().pending_actions.len(), 2);
    }

    #[test]
    fn delete_reports_whether_action_existed() {
        let store = MemoryStore::new();
        let a = store
            .create_pending_action(new_action("x", Duration::hours(1)), Utc::now())
            .unwrap();
        assert!(store.delete_pending_action(&a.id).unwrap());
        assert!(!store.delete_pending_action(&a.id).unwrap());
    }

    #[test]
    fn history_pages_walk_backwards() {
        let store = MemoryStore::new();
        for i in 0..7 {
            record(&store, ChatRole::User, &format!("m{i}"));
        }

        let first = store.history_page(1, 3).unwrap();
        let contents: Vec<_> = first.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m4", "m5", "m6"]);
        assert!(first.has_more);
        assert_eq!(first.total, 7);

        let last = store.history_page(3, 3).unwrap();
        assert_eq!(last.messages.len(), 1);
        assert_eq!(last.messages[0].content, "m0");
        assert!(!last.has_more);

        let beyond = store.history_page(9, 3).unwrap();
        assert!(beyond.messages.is_empty());
        assert!(!beyond.has_more);
    }

    #[test]
    fn open_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MemoryStore::open(dir.path()).unwrap();
            record(&store, ChatRole::User, "hello");
            store
                .create_pending_action(new_action("persist me", Duration::hours(1)), Utc::now())
                .unwrap();
        }

        let reopened = MemoryStore::open(dir.path()).unwrap();
        assert_eq!(reopened.message_count(), 1);
        let actions = reopened.pending_actions(Utc::now()).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].summary, "persist me");
        assert!(!dir.path().join("conversation.json.tmp").exists());
    }

    #[test]
    fn failed_flush_leaves_memory_and_disk_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        record(&store, ChatRole::User, "kept");
        let queued = store
            .create_pending_action(new_action("keep me", Duration::hours(1)), Utc::now())
            .unwrap();
        let on_disk = std::fs::read_to_string(dir.path().join("conversation.json")).unwrap();

        // A directory where the temp file should go makes every flush fail.
        let blocker = dir.path().join("conversation.json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        assert!(store
            .record_message(ChatRole::User, "lost", vec![], None)
            .is_err());
        assert!(store
            .create_pending_action(new_action("lost", Duration::hours(1)), Utc::now())
            .is_err());
        assert!(store.delete_pending_action(&queued.id).is_err());

        assert_eq!(store.message_count(), 1);
        let actions = store.pending_actions(Utc::now()).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].id, queued.id);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("conversation.json")).unwrap(),
            on_disk
        );

        std::fs::remove_dir(&blocker).unwrap();
        record(&store, ChatRole::User, "recovered");
        assert_eq!(MemoryStore::open(dir.path()).unwrap().message_count(), 2);
    }
}
