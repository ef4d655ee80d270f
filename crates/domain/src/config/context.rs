use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context compression
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Condenses older history into a bounded summary so the prompt stays
/// small after many turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextCompressionConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// History length (messages) at which compression kicks in.
    #[serde(default = "d_30")]
    pub trigger_messages: usize,
    /// Most recent messages kept verbatim.
    #[serde(default = "d_12")]
    pub preserve_recent: usize,
    #[serde(default = "d_1800")]
    pub summary_max_chars: usize,
    /// Lines kept by the extractive fallback summary.
    #[serde(default = "d_8")]
    pub heuristic_lines: usize,
    /// Per-message cap inside the transcript handed to the summarizer.
    #[serde(default = "d_600")]
    pub transcript_line_chars: usize,
}

impl Default for ContextCompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_messages: 30,
            preserve_recent: 12,
            summary_max_chars: 1_800,
            heuristic_lines: 8,
            transcript_line_chars: 600,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Autocapture
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Detects a repeatedly stated intent ("I keep missing the gym") and
/// proposes tracking it as a habit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoCaptureConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Mentions of the same intent (current input included) before proposing.
    #[serde(default = "d_2")]
    pub min_mentions: usize,
    /// How many previous user messages are scanned.
    #[serde(default = "d_6")]
    pub lookback_user_messages: usize,
    /// Seconds before the same intent may be proposed again.
    #[serde(default = "d_86400")]
    pub cooldown_secs: u64,
}

impl AutoCaptureConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        super::bounded_secs(self.cooldown_secs)
    }
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_mentions: 2,
            lookback_user_messages: 6,
            cooldown_secs: 86_400,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_2() -> usize {
    2
}
fn d_6() -> usize {
    6
}
fn d_8() -> usize {
    8
}
fn d_12() -> usize {
    12
}
fn d_30() -> usize {
    30
}
fn d_600() -> usize {
    600
}
fn d_1800() -> usize {
    1_800
}
fn d_86400() -> u64 {
    86_400
}
