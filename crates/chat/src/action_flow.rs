//! Resolution of confirm/cancel commands against the store. Never calls the
//! model.

use chrono::{DateTime, Utc};

use sb_domain::conversation::{ActionExecution, ActionOutcome, PendingAction};
use sb_domain::error::Result;
use sb_domain::trace::TraceEvent;
use sb_sessions::ConversationStore;
use sb_tools::MutationExecutor;

use crate::actions::{ActionCommand, ActionCommandKind};

/// Reply text plus the execution record, if an action was found.
#[derive(Debug, Clone)]
pub struct ActionResolution {
    pub reply: String,
    pub execution: Option<ActionExecution>,
}

pub async fn resolve(
    command: &ActionCommand,
    store: &dyn ConversationStore,
    mutations: &dyn MutationExecutor,
    now: DateTime<Utc>,
) -> Result<ActionResolution> {
    let Some(action) = store.pending_action(&command.action_id, now)? else {
        tracing::info!(action_id = %command.action_id, "no pending action for command");
        return Ok(ActionResolution {
            reply: format!(
                "I couldn't find a pending action with id {}. It may have already been \
                 handled or expired.",
                command.action_id
            ),
            execution: None,
        });
    };

    let (outcome, message) = match command.kind {
        ActionCommandKind::Cancel => {
            store.delete_pending_action(&action.id)?;
            (ActionOutcome::Cancelled, format!("Cancelled: {}.", action.summary))
        }
        ActionCommandKind::Confirm => confirm(&action, store, mutations).await?,
    };

    tracing::info!(
        action_id = %action.id,
        action_type = %action.action_type,
        outcome = ?outcome,
        "pending action resolved"
    );
    TraceEvent::ActionResolved {
        action_id: action.id.clone(),
        outcome: format!("{outcome:?}").to_lowercase(),
    }
    .emit();

    Ok(ActionResolution {
        reply: message.clone(),
        execution: Some(ActionExecution {
            action_id: action.id,
            action_type: action.action_type,
            outcome,
            message,
        }),
    })
}

/// Execute, then delete. The action is removed even when the mutation
/// reports failure so a retry has to be queued afresh.
async fn confirm(
    action: &PendingAction,
    store: &dyn ConversationStore,
    mutations: &dyn MutationExecutor,
) -> Result<(ActionOutcome, String)> {
    let result = mutations.execute(action, store).await?;
    store.delete_pending_action(&action.id)?;
    if result.success {
        Ok((ActionOutcome::Confirmed, result.message))
    } else {
        tracing::warn!(action_id = %action.id, message = %result.message, "confirmed action failed");
        Ok((
            ActionOutcome::Failed,
            format!("I couldn't apply that change: {}", result.message),
        ))
    }
}
