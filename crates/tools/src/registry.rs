//! Tool registry and executor.
//!
//! Handlers are registered by name and invoked with the model's parsed
//! arguments. Domain-expected problems (unknown id, empty search) should be
//! returned as an error-shaped payload; an `Err` from a handler is treated as
//! a failed call and never aborts the round.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use sb_domain::error::Result;
use sb_domain::tool::ToolDefinition;
use sb_sessions::ConversationStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a handler may touch during one call.
pub struct ToolContext<'a> {
    pub store: &'a dyn ConversationStore,
    pub now: DateTime<Utc>,
    /// Lifetime given to pending actions queued by the call.
    pub action_ttl: chrono::Duration,
}

#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Declaration exposed to the model.
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<Value>;
}

/// Result of one executed tool call.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub name: String,
    /// Raw handler output, or `{"error": ...}` when the call failed.
    pub response: Value,
    pub is_error: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    /// Registration order, so declarations are stable across turns.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared name, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.definition().name;
        if self.handlers.insert(name.clone(), handler).is_none() {
            self.order.push(name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Declarations for every registered tool, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|h| h.definition())
            .collect()
    }

    /// Run one tool call. Never fails: unknown tools and handler errors
    /// come back as an error outcome.
    pub async fn execute(&self, name: &str, args: &Value, ctx: &ToolContext<'_>) -> ToolOutcome {
        let Some(handler) = self.handlers.get(name) else {
            tracing::warn!(tool = %name, "model requested unknown tool");
            return ToolOutcome::error(name, format!("unknown tool '{name}'"));
        };

        match handler.call(args, ctx).await {
            Ok(response) => ToolOutcome {
                name: name.to_string(),
                response,
                is_error: false,
            },
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool call failed");
                ToolOutcome::error(name, e.to_string())
            }
        }
    }
}

impl ToolOutcome {
    fn error(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            response: json!({ "error": message }),
            is_error: true,
        }
    }
}

/// Id of the pending action a tool result says it queued, if any.
pub fn pending_action_id(raw: &Value) -> Option<&str> {
    raw.get("pending_action")?.get("id")?.as_str()
}
