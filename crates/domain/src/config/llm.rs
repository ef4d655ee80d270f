use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider kind. Only `google` (Gemini) ships today.
    #[serde(default = "d_provider")]
    pub provider: ProviderKind,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "d_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_120")]
    pub timeout_secs: u64,
    /// Optional separate model used by the context compressor.
    #[serde(default)]
    pub summarizer_model: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Google,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Google,
            base_url: d_base_url(),
            model: d_model(),
            api_key_env: d_key_env(),
            timeout_secs: 120,
            summarizer_model: None,
        }
    }
}

fn d_provider() -> ProviderKind {
    ProviderKind::Google
}
fn d_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn d_model() -> String {
    "gemini-2.0-flash".into()
}
fn d_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn d_120() -> u64 {
    120
}
