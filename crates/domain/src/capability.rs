use serde::{Deserialize, Serialize};

/// What a model client can do. The turn controller adapts to these flags
/// instead of branching on provider names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmCapabilities {
    /// Function declarations may be sent; otherwise turns run tool-less.
    pub supports_tools: bool,
    /// `chat_stream` yields tokens as they are generated.
    pub supports_streaming: bool,
    /// Inline image parts are accepted on user messages.
    pub supports_vision: bool,
}

impl LlmCapabilities {
    /// Tools, streaming, and images.
    pub fn full() -> Self {
        Self {
            supports_tools: true,
            supports_streaming: true,
            supports_vision: true,
        }
    }
}
