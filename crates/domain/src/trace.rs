use serde::Serialize;

/// Structured trace events emitted across all studybuddy crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        round: usize,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    ToolExecuted {
        tool: String,
        success: bool,
        duration_ms: u64,
        raw_chars: usize,
        compacted_chars: usize,
    },
    FallbackUsed {
        reason: String,
        executed_tools: usize,
        pending_actions: usize,
    },
    ActionResolved {
        action_id: String,
        outcome: String,
    },
    ContextCompressed {
        compressed_messages: usize,
        preserved_messages: usize,
        summary_chars: usize,
        used_model: bool,
    },
    AutoCaptureProposed {
        action_id: String,
        signature: String,
    },
    TurnCompleted {
        rounds: usize,
        finish_reason: Option<String>,
        citations: usize,
        total_tokens: u32,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sb_event");
    }
}
