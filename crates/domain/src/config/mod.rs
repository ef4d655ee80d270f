mod chat;
mod context;
mod llm;
mod observability;

pub use chat::*;
pub use context::*;
pub use llm::*;
pub use observability::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub context: ContextCompressionConfig,
    #[serde(default)]
    pub autocapture: AutoCaptureConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Upper bound for configured lifetimes and cooldowns (ten years). Larger
/// values are clamped so timestamp arithmetic cannot overflow.
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 86_400;

fn bounded_secs(secs: u64) -> chrono::Duration {
    // Fits in i64 after the clamp.
    chrono::Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut error = |field: &str, message: &str| {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: field.into(),
                message: message.into(),
            });
        };

        if self.chat.max_function_rounds == 0 {
            error("chat.max_function_rounds", "must be at least 1");
        }
        if self.chat.max_citations == 0 {
            error("chat.max_citations", "must be at least 1");
        }
        if self.chat.stream_chunk_chars == 0 {
            error("chat.stream_chunk_chars", "must be at least 1");
        }
        if self.chat.history_page_size == 0 {
            error("chat.history_page_size", "must be at least 1");
        }
        if self.chat.compaction.max_items == 0 {
            error("chat.compaction.max_items", "must be at least 1");
        }
        if self.chat.compaction.max_keys == 0 {
            error("chat.compaction.max_keys", "must be at least 1");
        }
        if self.chat.compaction.max_string_chars < 16 {
            error("chat.compaction.max_string_chars", "must be at least 16");
        }
        if self.chat.compaction.max_depth == 0 {
            error("chat.compaction.max_depth", "must be at least 1");
        }
        if self.context.enabled && self.context.preserve_recent >= self.context.trigger_messages {
            error(
                "context.preserve_recent",
                "must be smaller than context.trigger_messages",
            );
        }
        if self.llm.base_url.is_empty() {
            error("llm.base_url", "must not be empty");
        }
        if self.llm.model.is_empty() {
            error("llm.model", "must not be empty");
        }

        let mut warning = |field: &str, message: &str| {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: field.into(),
                message: message.into(),
            });
        };
        if self.actions.ttl_secs < 60 {
            warning("actions.ttl_secs", "pending actions expire in under a minute");
        }
        if self.actions.ttl_secs > MAX_DURATION_SECS {
            warning("actions.ttl_secs", "longer than ten years; clamped");
        }
        if self.autocapture.cooldown_secs > MAX_DURATION_SECS {
            warning("autocapture.cooldown_secs", "longer than ten years; clamped");
        }

        errors
    }
}
