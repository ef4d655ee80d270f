use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
/// Every adapter converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A message in the model conversation (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        /// Function name; Gemini keys function responses by name, not id.
        name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "image")]
    Image {
        /// Base64 payload (inline data).
        data: String,
        media_type: String,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: MessageContent::Text(text.into()) }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()) }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(text.into()) }
    }

    /// A user message carrying text plus inline image parts.
    pub fn user_with_parts(text: impl Into<String>, images: Vec<ContentPart>) -> Self {
        let mut parts = vec![ContentPart::Text { text: text.into() }];
        parts.extend(images);
        Self { role: Role::User, content: MessageContent::Parts(parts) }
    }

    /// The model's tool-call turn: optional text followed by one `ToolUse`
    /// part per requested call, in request order.
    pub fn assistant_tool_calls(text: &str, tool_calls: &[ToolCall]) -> Self {
        let mut parts = Vec::with_capacity(tool_calls.len() + 1);
        if !text.is_empty() {
            parts.push(ContentPart::Text { text: text.to_string() });
        }
        for tc in tool_calls {
            parts.push(ContentPart::ToolUse {
                id: tc.call_id.clone(),
                name: tc.tool_name.clone(),
                input: tc.arguments.clone(),
            });
        }
        Self { role: Role::Assistant, content: MessageContent::Parts(parts) }
    }

    /// The synthetic tool-result turn answering one round of tool calls.
    pub fn tool_results(parts: Vec<ContentPart>) -> Self {
        Self { role: Role::Tool, content: MessageContent::Parts(parts) }
    }
}

impl MessageContent {
    /// Extract the plain-text content (first text part, or the full text).
    pub fn text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t.as_str()),
            MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            }),
        }
    }

    /// Concatenate every text part, separated by newlines.
    pub fn extract_all_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_tool_calls_preserves_order_and_skips_empty_text() {
        let calls = vec![
            ToolCall {
                call_id: "c1".into(),
                tool_name: "get_schedule".into(),
                arguments: serde_json::json!({}),
            },
            ToolCall {
                call_id: "c2".into(),
                tool_name: "get_deadlines".into(),
                arguments: serde_json::json!({"days": 7}),
            },
        ];
        let msg = Message::assistant_tool_calls("", &calls);
        let MessageContent::Parts(parts) = msg.content else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], ContentPart::ToolUse { name, .. } if name == "get_schedule"));
        assert!(matches!(&parts[1], ContentPart::ToolUse { name, .. } if name == "get_deadlines"));
    }

    #[test]
    fn extract_all_text_joins_parts() {
        let msg = Message::user_with_parts(
            "look at this",
            vec![ContentPart::Image {
                data: "aGk=".into(),
                media_type: "image/png".into(),
            }],
        );
        assert_eq!(msg.content.extract_all_text(), "look at this");
        assert_eq!(msg.content.text(), Some("look at this"));
    }
}
