use sb_domain::conversation::{ActionExecutionResult, PendingAction};
use sb_domain::error::Result;
use sb_sessions::ConversationStore;

/// Applies the side effect described by a confirmed pending action.
///
/// A domain-level refusal (target gone, unknown action type) is reported as
/// `success: false`; `Err` is reserved for storage failures.
#[async_trait::async_trait]
pub trait MutationExecutor: Send + Sync {
    async fn execute(
        &self,
        action: &PendingAction,
        store: &dyn ConversationStore,
    ) -> Result<ActionExecutionResult>;
}
