use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn controller
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Knobs for a single chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Ceiling on tool-execution rounds per turn. If the model still
    /// requests tools after the last round, the turn answers from the tool
    /// data gathered.
    #[serde(default = "d_4")]
    pub max_function_rounds: usize,
    /// Recent messages sent to the model as conversation history.
    #[serde(default = "d_24")]
    pub history_limit: usize,
    /// Page size of the history returned with every turn.
    #[serde(default = "d_50")]
    pub history_page_size: usize,
    /// Maximum citations attached to one assistant message.
    #[serde(default = "d_8")]
    pub max_citations: usize,
    /// Chunk size (chars) used when a reply is delivered without native streaming.
    #[serde(default = "d_24")]
    pub stream_chunk_chars: usize,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_system_prompt")]
    pub system_prompt: String,
    /// Bounds applied to every tool result before it is sent back to the model.
    #[serde(default)]
    pub compaction: CompactionLimits,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_function_rounds: 4,
            history_limit: 24,
            history_page_size: 50,
            max_citations: 8,
            stream_chunk_chars: 24,
            temperature: d_temperature(),
            system_prompt: d_system_prompt(),
            compaction: CompactionLimits::default(),
        }
    }
}

/// Size bounds for compacted tool results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionLimits {
    /// Maximum list entries kept per array.
    #[serde(default = "d_6")]
    pub max_items: usize,
    /// Maximum entries kept per object.
    #[serde(default = "d_24")]
    pub max_keys: usize,
    /// Maximum characters kept per string.
    #[serde(default = "d_280")]
    pub max_string_chars: usize,
    /// Maximum nesting depth of objects/arrays.
    #[serde(default = "d_4")]
    pub max_depth: usize,
}

impl Default for CompactionLimits {
    fn default() -> Self {
        Self {
            max_items: 6,
            max_keys: 24,
            max_string_chars: 280,
            max_depth: 4,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pending actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// Lifetime of a queued action before it silently expires.
    #[serde(default = "d_86400")]
    pub ttl_secs: u64,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self { ttl_secs: 86_400 }
    }
}

impl ActionsConfig {
    pub fn ttl(&self) -> chrono::Duration {
        super::bounded_secs(self.ttl_secs)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_4() -> usize {
    4
}
fn d_6() -> usize {
    6
}
fn d_8() -> usize {
    8
}
fn d_24() -> usize {
    24
}
fn d_50() -> usize {
    50
}
fn d_280() -> usize {
    280
}
fn d_86400() -> u64 {
    86_400
}
fn d_temperature() -> f32 {
    0.3
}
fn d_system_prompt() -> String {
    "You are a study assistant for a university student. Answer from the \
     student's own schedule, deadlines, inbox, course materials, habits and \
     goals by calling the available tools instead of guessing. Changes to \
     the student's data are only ever queued for confirmation; tell the \
     student which command confirms or cancels them. Keep replies short."
        .into()
}
