//! Per-conversation scratch state that outlives a single turn.
//!
//! Owned by whoever owns the conversation (the CLI keeps one per session)
//! and passed into every turn. Nothing here is required for correctness of a
//! single turn; clearing it only resets cooldowns and forces a fresh summary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSummary {
    /// Id of the newest message folded into the summary.
    pub through_message_id: String,
    pub text: String,
}

#[derive(Debug, Default)]
struct CacheState {
    /// Autocapture signature → when it was last proposed.
    autocapture: HashMap<String, DateTime<Utc>>,
    summary: Option<CachedSummary>,
}

#[derive(Debug, Default)]
pub struct SessionCache {
    inner: Mutex<CacheState>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `signature` was proposed less than `cooldown` ago.
    pub fn autocapture_cooling(
        &self,
        signature: &str,
        now: DateTime<Utc>,
        cooldown: chrono::Duration,
    ) -> bool {
        self.inner
            .lock()
            .autocapture
            .get(signature)
            .is_some_and(|last| now - *last < cooldown)
    }

    pub fn mark_autocapture(&self, signature: &str, now: DateTime<Utc>) {
        self.inner
            .lock()
            .autocapture
            .insert(signature.to_string(), now);
    }

    /// The cached summary if it covers exactly up to `through_message_id`.
    pub fn summary_through(&self, through_message_id: &str) -> Option<String> {
        self.inner
            .lock()
            .summary
            .as_ref()
            .filter(|s| s.through_message_id == through_message_id)
            .map(|s| s.text.clone())
    }

    pub fn store_summary(&self, through_message_id: &str, text: &str) {
        self.inner.lock().summary = Some(CachedSummary {
            through_message_id: through_message_id.to_string(),
            text: text.to_string(),
        });
    }

    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.autocapture.clear();
        state.summary = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn cooldown_expires() {
        let cache = SessionCache::new();
        let now = Utc::now();
        cache.mark_autocapture("gym", now);
        assert!(cache.autocapture_cooling("gym", now + Duration::hours(1), Duration::hours(24)));
        assert!(!cache.autocapture_cooling("gym", now + Duration::hours(25), Duration::hours(24)));
        assert!(!cache.autocapture_cooling("reading", now, Duration::hours(24)));
    }

    #[test]
    fn summary_is_keyed_by_boundary() {
        let cache = SessionCache::new();
        cache.store_summary("m-10", "earlier stuff");
        assert_eq!(cache.summary_through("m-10").as_deref(), Some("earlier stuff"));
        assert!(cache.summary_through("m-11").is_none());
    }

    #[test]
    fn clear_resets_everything() {
        let cache = SessionCache::new();
        let now = Utc::now();
        cache.mark_autocapture("gym", now);
        cache.store_summary("m-1", "s");
        cache.clear();
        assert!(!cache.autocapture_cooling("gym", now, Duration::hours(24)));
        assert!(cache.summary_through("m-1").is_none());
    }
}
