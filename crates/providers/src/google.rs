//! Google Gemini adapter.
//!
//! Implements the Gemini `generateContent` and `streamGenerateContent` APIs.
//! Auth is via an API key passed as a query parameter (`key={api_key}`).
//! HTTP 429 / `RESOURCE_EXHAUSTED` surfaces as [`Error::RateLimited`].

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{classify_status, from_reqwest, resolve_api_key};
use sb_domain::capability::LlmCapabilities;
use sb_domain::config::LlmConfig;
use sb_domain::error::{Error, Result};
use sb_domain::stream::{BoxStream, StreamEvent, Usage};
use sb_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition};
use serde_json::{json, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for the Google Gemini API.
pub struct GoogleProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    capabilities: LlmCapabilities,
    client: reqwest::Client,
}

impl GoogleProvider {
    /// Create a provider from the `[llm]` config section, reading the API
    /// key from `api_key_env`.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.api_key_env)?;
        Self::new(&cfg.base_url, api_key, &cfg.model, cfg.timeout_secs)
    }

    pub fn new(base_url: &str, api_key: String, model: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "google".into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: model.to_string(),
            capabilities: LlmCapabilities::full(),
            client,
        })
    }

    /// Same credentials, different default model (used for the summarizer).
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            id: self.id.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            default_model: model.to_string(),
            capabilities: self.capabilities.clone(),
            client: self.client.clone(),
        }
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        )
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, model, self.api_key
        )
    }

    fn model_for(&self, req: &ChatRequest) -> String {
        req.model
            .clone()
            .unwrap_or_else(|| self.default_model.clone())
    }

    async fn post(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        tracing::debug!(provider = %self.id, url = %redact_url_key(url), "google request");
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(classify_status(&self.id, status.as_u16(), &err_text));
        }
        Ok(resp)
    }
}

/// Build the `generateContent` request body.
pub(crate) fn build_body(req: &ChatRequest) -> Value {
    let mut contents: Vec<Value> = Vec::new();
    let mut system_texts: Vec<String> = Vec::new();

    for msg in &req.messages {
        match msg.role {
            Role::System => system_texts.push(msg.content.extract_all_text()),
            Role::User => contents.push(json!({
                "role": "user",
                "parts": content_to_gemini_parts(&msg.content),
            })),
            Role::Assistant => contents.push(assistant_to_gemini(msg)),
            Role::Tool => contents.push(tool_results_to_gemini(msg)),
        }
    }

    let mut body = json!({ "contents": contents });

    if !system_texts.is_empty() {
        body["systemInstruction"] = json!({
            "parts": [{ "text": system_texts.join("\n\n") }]
        });
    }

    if !req.tools.is_empty() {
        let function_declarations: Vec<Value> = req.tools.iter().map(tool_to_gemini).collect();
        body["tools"] = json!([{ "functionDeclarations": function_declarations }]);
    }

    let mut gen_config = serde_json::Map::new();
    if let Some(temp) = req.temperature {
        gen_config.insert("temperature".into(), json!(temp));
    }
    if let Some(max) = req.max_tokens {
        gen_config.insert("maxOutputTokens".into(), json!(max));
    }
    if !gen_config.is_empty() {
        body["generationConfig"] = Value::Object(gen_config);
    }

    body
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn assistant_to_gemini(msg: &Message) -> Value {
    let parts: Vec<Value> = match &msg.content {
        MessageContent::Text(t) => vec![json!({ "text": t })],
        MessageContent::Parts(ps) => ps
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(json!({ "text": text })),
                ContentPart::ToolUse { name, input, .. } => Some(json!({
                    "functionCall": { "name": name, "args": input }
                })),
                _ => None,
            })
            .collect(),
    };
    json!({ "role": "model", "parts": parts })
}

/// One `functionResponse` part per tool result. Gemini wants an object as
/// the response; JSON object content is passed through, anything else is
/// wrapped as `{"content": ...}`.
fn tool_results_to_gemini(msg: &Message) -> Value {
    let parts: Vec<Value> = match &msg.content {
        MessageContent::Parts(ps) => ps
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult { name, content, .. } => {
                    let response = match serde_json::from_str::<Value>(content) {
                        Ok(v @ Value::Object(_)) => v,
                        Ok(other) => json!({ "content": other }),
                        Err(_) => json!({ "content": content }),
                    };
                    Some(json!({
                        "functionResponse": { "name": name, "response": response }
                    }))
                }
                _ => None,
            })
            .collect(),
        MessageContent::Text(t) => vec![json!({
            "functionResponse": { "name": "unknown", "response": { "content": t } }
        })],
    };
    json!({ "role": "user", "parts": parts })
}

fn content_to_gemini_parts(content: &MessageContent) -> Vec<Value> {
    match content {
        MessageContent::Text(t) => vec![json!({ "text": t })],
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(json!({ "text": text })),
                ContentPart::Image { data, media_type } => Some(json!({
                    "inlineData": { "mimeType": media_type, "data": data }
                })),
                _ => None,
            })
            .collect(),
    }
}

fn tool_to_gemini(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn first_candidate(body: &Value) -> Option<&Value> {
    body.get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
}

fn candidate_parts(candidate: &Value) -> &[Value] {
    candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn function_call(part: &Value) -> Option<ToolCall> {
    let fc = part.get("functionCall")?;
    Some(ToolCall {
        call_id: format!("call_{}", uuid::Uuid::new_v4()),
        tool_name: fc
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        arguments: fc
            .get("args")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default())),
    })
}

fn normalize_finish_reason(raw: &str) -> String {
    match raw {
        "STOP" => "stop".to_string(),
        "MAX_TOKENS" => "length".to_string(),
        other => other.to_lowercase(),
    }
}

pub(crate) fn parse_gemini_response(body: &Value, model: &str) -> Result<ChatResponse> {
    let candidate = first_candidate(body).ok_or_else(|| Error::Provider {
        provider: "google".into(),
        message: "no candidates in response".into(),
    })?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for part in candidate_parts(candidate) {
        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            content.push_str(text);
        }
        if let Some(tc) = function_call(part) {
            tool_calls.push(tc);
        }
    }

    Ok(ChatResponse {
        content,
        tool_calls,
        usage: body.get("usageMetadata").and_then(parse_gemini_usage),
        model: model.to_string(),
        finish_reason: candidate
            .get("finishReason")
            .and_then(|v| v.as_str())
            .map(normalize_finish_reason),
    })
}

fn parse_gemini_usage(v: &Value) -> Option<Usage> {
    let prompt = v.get("promptTokenCount")?.as_u64()? as u32;
    let completion = v
        .get("candidatesTokenCount")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let total = v
        .get("totalTokenCount")
        .and_then(|v| v.as_u64())
        .unwrap_or((prompt + completion) as u64) as u32;
    Some(Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse a single Gemini streaming SSE data payload.
pub(crate) fn parse_gemini_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    // Quota errors can arrive inside an already-open stream.
    if let Some(err) = v.get("error") {
        let code = err.get("code").and_then(|c| c.as_u64()).unwrap_or(500) as u16;
        return vec![Err(classify_status("google", code, data))];
    }

    let Some(candidate) = first_candidate(&v) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    for part in candidate_parts(candidate) {
        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                events.push(Ok(StreamEvent::Token {
                    text: text.to_string(),
                }));
            }
        }
        if let Some(tc) = function_call(part) {
            events.push(Ok(StreamEvent::ToolCallFinished {
                call_id: tc.call_id,
                tool_name: tc.tool_name,
                arguments: tc.arguments,
            }));
        }
    }

    if let Some(fr) = candidate.get("finishReason").and_then(|v| v.as_str()) {
        events.push(Ok(StreamEvent::Done {
            usage: v.get("usageMetadata").and_then(parse_gemini_usage),
            finish_reason: Some(normalize_finish_reason(fr)),
        }));
    }

    events
}

/// Redact API key from URL for safe logging.
fn redact_url_key(url: &str) -> String {
    if let Some(idx) = url.find("key=") {
        let prefix = &url[..idx + 4];
        let rest = &url[idx + 4..];
        let end = rest.find('&').unwrap_or(rest.len());
        format!("{prefix}[REDACTED]{}", &rest[end..])
    } else {
        url.to_string()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for GoogleProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let model = self.model_for(req);
        let resp = self
            .post(&self.generate_url(&model), &build_body(req))
            .await?;
        let resp_text = resp.text().await.map_err(from_reqwest)?;
        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_gemini_response(&resp_json, &model)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let model = self.model_for(req);
        let resp = self.post(&self.stream_url(&model), &build_body(req)).await?;
        Ok(crate::sse::sse_response_stream(resp, parse_gemini_sse_data))
    }

    fn capabilities(&self) -> &LlmCapabilities {
        &self.capabilities
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_system_instruction_tools_and_function_responses() {
        let call = ToolCall {
            call_id: "call_1".into(),
            tool_name: "get_schedule".into(),
            arguments: json!({"day": "today"}),
        };
        let req = ChatRequest {
            messages: vec![
                Message::system("be brief"),
                Message::user("what's on today?"),
                Message::assistant_tool_calls("", std::slice::from_ref(&call)),
                Message::tool_results(vec![ContentPart::ToolResult {
                    tool_use_id: "call_1".into(),
                    name: "get_schedule".into(),
                    content: r#"{"events":[]}"#.into(),
                    is_error: false,
                }]),
            ],
            tools: vec![ToolDefinition {
                name: "get_schedule".into(),
                description: "schedule".into(),
                parameters: json!({"type": "object"}),
            }],
            temperature: Some(0.3),
            ..Default::default()
        };

        let body = build_body(&req);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(
            body["contents"][1]["parts"][0]["functionCall"]["name"],
            "get_schedule"
        );
        let fr = &body["contents"][2]["parts"][0]["functionResponse"];
        assert_eq!(fr["name"], "get_schedule");
        assert!(fr["response"]["events"].is_array());
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "get_schedule"
        );
        assert!(body["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn images_become_inline_data() {
        let req = ChatRequest {
            messages: vec![Message::user_with_parts(
                "what is this?",
                vec![ContentPart::Image {
                    data: "aGVsbG8=".into(),
                    media_type: "image/jpeg".into(),
                }],
            )],
            ..Default::default()
        };
        let body = build_body(&req);
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
    }

    #[test]
    fn parses_text_function_calls_and_usage() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Checking" },
                    { "functionCall": { "name": "get_deadlines", "args": { "days": 7 } } }
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 12,
                "candidatesTokenCount": 4,
                "totalTokenCount": 16
            }
        });
        let resp = parse_gemini_response(&body, "gemini-2.0-flash").unwrap();
        assert_eq!(resp.content, "Checking");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].tool_name, "get_deadlines");
        assert_eq!(resp.tool_calls[0].arguments["days"], 7);
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.unwrap().total_tokens, 16);
    }

    #[test]
    fn missing_candidates_is_an_error() {
        let err = parse_gemini_response(&json!({}), "m").unwrap_err();
        assert!(!err.is_rate_limit());
    }

    #[test]
    fn sse_payload_yields_tokens_and_done() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hi"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":1}}"#;
        let events = parse_gemini_sse_data(data);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(StreamEvent::Token { text }) if text == "Hi"));
        match &events[1] {
            Ok(StreamEvent::Done { usage, .. }) => {
                assert_eq!(usage.as_ref().map(|u| u.total_tokens), Some(4));
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn sse_error_payload_is_classified() {
        let data = r#"{"error":{"code":429,"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#;
        let events = parse_gemini_sse_data(data);
        assert!(matches!(&events[0], Err(e) if e.is_rate_limit()));
    }

    #[test]
    fn redacts_api_key() {
        let url = "https://x/v1beta/models/m:generateContent?key=secret&alt=sse";
        assert_eq!(
            redact_url_key(url),
            "https://x/v1beta/models/m:generateContent?key=[REDACTED]&alt=sse"
        );
    }
}
