//! Turn controller: one user input through to one persisted assistant reply.
//!
//! Entry point: [`ChatRuntime::send_message`]. In priority order a turn is
//! resolved by an action command, an ambiguous-confirmation guard, an
//! autocapture proposal, or the tool-calling round loop. Rate limits, round
//! exhaustion and empty model text degrade to a synthesized reply tagged
//! with a finish reason; every other error propagates.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::Instrument;

use sb_domain::config::Config;
use sb_domain::conversation::{
    finish_reason, ActionExecution, Attachment, ChatRole, Citation, ConversationMessage,
    ConversationMetadata, HistoryPage, PendingAction,
};
use sb_domain::error::Result;
use sb_domain::stream::Usage;
use sb_domain::tool::{ContentPart, Message, ToolCall};
use sb_domain::trace::TraceEvent;
use sb_providers::{ChatRequest, ChatResponse, LlmProvider};
use sb_sessions::ConversationStore;
use sb_tools::registry::pending_action_id;
use sb_tools::{MutationExecutor, ShaperRegistry, ToolContext, ToolRegistry};

use crate::actions::{is_implicit_signal, parse_action_command};
use crate::cache::SessionCache;
use crate::citations::CitationCollector;
use crate::fallback::{self, ExecutedFunctionResponse, FallbackReason};
use crate::stream::{chunk_reply, collect_stream};
use crate::{action_flow, autocapture, compress};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events emitted during a single turn.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    /// Incremental reply text.
    #[serde(rename = "assistant_delta")]
    AssistantDelta { text: String },

    /// Discard every delta since the turn started or the last `Retract`.
    /// Sent when text already shown turns out not to be part of the reply:
    /// model text from a tool-calling round, or a stream cut short.
    #[serde(rename = "retract")]
    Retract,

    /// The model is invoking a tool.
    #[serde(rename = "tool_call")]
    ToolCall { name: String, arguments: Value },

    #[serde(rename = "tool_result")]
    ToolResult {
        name: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },

    /// The complete reply, identical to the persisted assistant message.
    #[serde(rename = "final")]
    Final {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to a single turn.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Clock override; `None` uses the wall clock.
    pub now: Option<DateTime<Utc>>,
    /// When set, reply text is delivered incrementally on this channel.
    pub events: Option<mpsc::Sender<TurnEvent>>,
}

impl TurnInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<TurnEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub user_message: ConversationMessage,
    pub assistant_message: ConversationMessage,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    pub citations: Vec<Citation>,
    /// Newest page of history, including this turn.
    pub history: HistoryPage,
}

/// What a resolution path hands back before persistence.
#[derive(Debug, Default)]
struct Reply {
    text: String,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    citations: Vec<Citation>,
    pending_actions: Vec<PendingAction>,
    action_execution: Option<ActionExecution>,
    context_window: String,
    /// Text already delivered as deltas.
    streamed: String,
    rounds: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatRuntime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a turn needs that outlives the conversation: model client,
/// tools, shaping rules, mutation executor and config.
#[derive(Clone)]
pub struct ChatRuntime {
    provider: Arc<dyn LlmProvider>,
    summarizer: Option<Arc<dyn LlmProvider>>,
    tools: ToolRegistry,
    shapers: Arc<ShaperRegistry>,
    mutations: Arc<dyn MutationExecutor>,
    config: Arc<Config>,
}

impl ChatRuntime {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
        mutations: Arc<dyn MutationExecutor>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            provider,
            summarizer: None,
            tools,
            shapers: Arc::new(ShaperRegistry::with_builtin()),
            mutations,
            config,
        }
    }

    pub fn with_shapers(mut self, shapers: ShaperRegistry) -> Self {
        self.shapers = Arc::new(shapers);
        self
    }

    /// Model used for context compression; defaults to the main provider.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn LlmProvider>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one turn and persist both messages.
    pub async fn send_message(
        &self,
        store: &dyn ConversationStore,
        cache: &SessionCache,
        input: TurnInput,
    ) -> Result<TurnOutcome> {
        let span = tracing::info_span!(
            "turn",
            rounds = tracing::field::Empty,
            finish_reason = tracing::field::Empty,
        );
        self.run_turn(store, cache, input).instrument(span).await
    }

    async fn run_turn(
        &self,
        store: &dyn ConversationStore,
        cache: &SessionCache,
        input: TurnInput,
    ) -> Result<TurnOutcome> {
        let now = input.now.unwrap_or_else(Utc::now);
        let tx = input.events.as_ref();
        let cfg = &self.config;

        let pending = store.pending_actions(now)?;
        let history = store.recent_messages(cfg.chat.history_limit)?;

        let reply = if let Some(command) = parse_action_command(&input.text, &pending) {
            let resolution =
                action_flow::resolve(&command, store, self.mutations.as_ref(), now).await?;
            Reply {
                text: resolution.reply,
                finish_reason: Some(finish_reason::ACTION_COMMAND.into()),
                action_execution: resolution.execution,
                ..Default::default()
            }
        } else if pending.len() > 1 && is_implicit_signal(&input.text) {
            Reply {
                text: format!(
                    "More than one change is waiting, so I won't guess which one you mean.\n\n{}",
                    fallback::pending_actions_reply(&pending)
                ),
                finish_reason: Some(finish_reason::ACTION_DISAMBIGUATION.into()),
                pending_actions: pending,
                ..Default::default()
            }
        } else {
            let proposal = if pending.is_empty() {
                autocapture::propose(
                    store,
                    cache,
                    &input.text,
                    &history,
                    now,
                    &cfg.autocapture,
                    cfg.actions.ttl(),
                )?
            } else {
                None
            };
            match proposal {
                Some(p) => Reply {
                    text: p.reply,
                    finish_reason: Some(finish_reason::AUTOCAPTURE.into()),
                    pending_actions: vec![p.action],
                    ..Default::default()
                },
                None => {
                    self.model_turn(store, cache, &input, &history, &pending, now, tx)
                        .await?
                }
            }
        };

        if let Some(tx) = tx {
            deliver(tx, &reply, cfg.chat.stream_chunk_chars).await;
        }

        let user_message = store.record_message(
            ChatRole::User,
            &input.text,
            input.attachments.clone(),
            None,
        )?;
        let metadata = ConversationMetadata {
            context_window: reply.context_window.clone(),
            finish_reason: reply.finish_reason.clone(),
            usage: reply.usage,
            pending_actions: reply.pending_actions.iter().map(|a| a.to_summary()).collect(),
            citations: reply.citations.clone(),
            action_execution: reply.action_execution.clone(),
        };
        let assistant_message =
            store.record_message(ChatRole::Assistant, &reply.text, vec![], Some(metadata))?;
        let history = store.history_page(1, cfg.chat.history_page_size)?;

        let span = tracing::Span::current();
        span.record("rounds", reply.rounds);
        if let Some(reason) = &reply.finish_reason {
            span.record("finish_reason", reason.as_str());
        }
        TraceEvent::TurnCompleted {
            rounds: reply.rounds,
            finish_reason: reply.finish_reason.clone(),
            citations: reply.citations.len(),
            total_tokens: reply.usage.map(|u| u.total_tokens).unwrap_or(0),
        }
        .emit();

        Ok(TurnOutcome {
            reply: reply.text,
            user_message,
            assistant_message,
            finish_reason: reply.finish_reason,
            usage: reply.usage,
            citations: reply.citations,
            history,
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Round loop
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    #[allow(clippy::too_many_arguments)]
    async fn model_turn(
        &self,
        store: &dyn ConversationStore,
        cache: &SessionCache,
        input: &TurnInput,
        history: &[ConversationMessage],
        pending: &[PendingAction],
        now: DateTime<Utc>,
        tx: Option<&mpsc::Sender<TurnEvent>>,
    ) -> Result<Reply> {
        let cfg = &self.config;
        let limits = cfg.chat.compaction;

        let (mut messages, context_window) =
            self.build_context(store, cache, input, history, pending, now).await?;
        let caps = self.provider.capabilities();
        let tool_defs = if caps.supports_tools {
            self.tools.definitions()
        } else {
            Vec::new()
        };
        let tool_ctx = ToolContext {
            store,
            now,
            action_ttl: cfg.actions.ttl(),
        };

        let mut executed: Vec<ExecutedFunctionResponse> = Vec::new();
        let mut citations = CitationCollector::new(cfg.chat.max_citations);
        let mut queued: Vec<PendingAction> = Vec::new();
        let mut usage: Option<Usage> = None;
        let mut streamed = String::new();
        let mut tool_rounds = 0;
        let mut model_calls = 0;

        let (text, reason) = loop {
            let req = ChatRequest {
                messages: messages.clone(),
                tools: tool_defs.clone(),
                temperature: Some(cfg.chat.temperature),
                max_tokens: None,
                model: None,
            };
            model_calls += 1;
            let mut shown = String::new();
            let resp = match self.call_model(&req, model_calls, tx, &mut shown).await {
                Ok(resp) => resp,
                Err(e) if e.is_rate_limit() => {
                    tracing::warn!(error = %e, tool_rounds, "model rate limited; answering from tool data");
                    retract(tx, &shown).await;
                    let text = self.degrade(FallbackReason::RateLimit, &executed, &queued);
                    break (text, finish_reason::RATE_LIMIT_FALLBACK.to_string());
                }
                Err(e) => {
                    retract(tx, &shown).await;
                    return Err(e);
                }
            };
            if let Some(u) = &resp.usage {
                usage.get_or_insert_with(Usage::default).accumulate(u);
            }

            if resp.tool_calls.is_empty() {
                streamed = shown;
                break self.clean_exit(store, resp, &executed, &queued, now)?;
            }
            // Text of a tool-calling round is not the answer.
            retract(tx, &shown).await;
            if tool_rounds >= cfg.chat.max_function_rounds {
                tracing::warn!(tool_rounds, "tool round limit reached; answering from tool data");
                let text = self.degrade(FallbackReason::RoundLimit, &executed, &queued);
                break (text, finish_reason::ROUND_LIMIT_FALLBACK.to_string());
            }
            tool_rounds += 1;

            let results = self
                .execute_round(&resp.tool_calls, &tool_ctx, tx)
                .await;

            let mut parts = Vec::with_capacity(results.len());
            for (tc, outcome) in resp.tool_calls.iter().zip(results) {
                let shaper = self.shapers.get(&tc.tool_name);
                let model_response = shaper.compact(&outcome.response, &limits);

                if !outcome.is_error {
                    citations.extend(shaper.citations(&outcome.response));
                    if let Some(id) = pending_action_id(&outcome.response) {
                        if let Some(action) = store.pending_action(id, now)? {
                            if !queued.iter().any(|q| q.id == action.id) {
                                queued.push(action);
                            }
                        }
                    }
                }

                parts.push(ContentPart::ToolResult {
                    tool_use_id: tc.call_id.clone(),
                    name: tc.tool_name.clone(),
                    content: model_response.to_string(),
                    is_error: outcome.is_error,
                });
                if !outcome.is_error {
                    executed.push(ExecutedFunctionResponse {
                        name: tc.tool_name.clone(),
                        raw_response: outcome.response,
                        model_response,
                    });
                }
            }

            messages.push(Message::assistant_tool_calls(&resp.content, &resp.tool_calls));
            messages.push(Message::tool_results(parts));
        };

        let text = if reason == finish_reason::RATE_LIMIT_FALLBACK
            || reason == finish_reason::ROUND_LIMIT_FALLBACK
        {
            text
        } else {
            mention_queued(text, &queued)
        };

        tracing::info!(
            tool_rounds,
            model_calls,
            executed = executed.len(),
            citations = citations.len(),
            finish_reason = %reason,
            "round loop finished"
        );

        Ok(Reply {
            text,
            finish_reason: Some(reason),
            usage,
            citations: citations.finish(),
            pending_actions: queued,
            action_execution: None,
            context_window,
            streamed,
            rounds: model_calls,
        })
    }

    /// Recent (or compressed) history, the system instruction, and the new
    /// user message.
    async fn build_context(
        &self,
        store: &dyn ConversationStore,
        cache: &SessionCache,
        input: &TurnInput,
        history: &[ConversationMessage],
        pending: &[PendingAction],
        now: DateTime<Utc>,
    ) -> Result<(Vec<Message>, String)> {
        let cfg = &self.config;
        let mut compressed = None;
        if cfg.context.enabled {
            let total = store.history_page(1, 1)?.total;
            if total >= cfg.context.trigger_messages {
                let full = store.recent_messages(total)?;
                let summarizer = self.summarizer.as_ref().unwrap_or(&self.provider);
                compressed =
                    compress::compress(summarizer.as_ref(), cache, &full, pending, &cfg.context)
                        .await;
            }
        }

        let (conversation, summary) = match &compressed {
            Some(c) => (c.preserved.as_slice(), c.summary.as_str()),
            None => (history, ""),
        };

        let mut messages = vec![Message::system(self.system_instruction(now, pending))];
        if !summary.is_empty() {
            messages.push(Message::system(format!(
                "Summary of the earlier conversation:\n{summary}"
            )));
        }
        for msg in conversation {
            messages.push(match msg.role {
                ChatRole::User => Message::user(msg.content.clone()),
                ChatRole::Assistant => Message::assistant(msg.content.clone()),
            });
        }

        let vision = self.provider.capabilities().supports_vision;
        let images: Vec<ContentPart> = input
            .attachments
            .iter()
            .filter(|a| a.is_image())
            .filter(|a| {
                if !vision {
                    tracing::debug!(mime = %a.mime_type, "model has no vision support; image kept in history only");
                }
                vision
            })
            .map(|a| ContentPart::Image {
                data: a.data.clone(),
                media_type: a.mime_type.clone(),
            })
            .collect();
        messages.push(if images.is_empty() {
            Message::user(input.text.clone())
        } else {
            Message::user_with_parts(input.text.clone(), images)
        });

        Ok((messages, summary.to_string()))
    }

    fn system_instruction(&self, now: DateTime<Utc>, pending: &[PendingAction]) -> String {
        let mut out = self.config.chat.system_prompt.clone();
        out.push_str(&format!(
            "\n\nCurrent time: {}",
            now.format("%A %Y-%m-%d %H:%M UTC")
        ));
        if !pending.is_empty() {
            out.push_str("\n\nChanges awaiting the student's confirmation:");
            for action in pending {
                out.push_str(&format!(
                    "\n- {} (`{}` / `{}`)",
                    action.summary,
                    action.confirm_command(),
                    action.cancel_command()
                ));
            }
        }
        out
    }

    /// Whether model text reaches the caller natively as it is generated.
    fn streams(&self, tx: Option<&mpsc::Sender<TurnEvent>>) -> bool {
        tx.is_some() && self.provider.capabilities().supports_streaming
    }

    async fn call_model(
        &self,
        req: &ChatRequest,
        round: usize,
        tx: Option<&mpsc::Sender<TurnEvent>>,
        shown: &mut String,
    ) -> Result<ChatResponse> {
        let streaming = self.streams(tx);
        let provider_id = self.provider.provider_id();
        let span = tracing::info_span!(
            "llm.call",
            provider = %provider_id,
            round,
            streaming,
            input_tokens = tracing::field::Empty,
            output_tokens = tracing::field::Empty,
        );
        let started = Instant::now();

        let resp = async {
            match tx.filter(|_| streaming) {
                Some(tx) => match self.provider.chat_stream(req).await {
                    Ok(stream) => collect_stream(provider_id, stream, tx, shown).await,
                    Err(e) => Err(e),
                },
                None => self.provider.chat(req).await,
            }
        }
        .instrument(span.clone())
        .await?;

        if let Some(u) = &resp.usage {
            span.record("input_tokens", u.prompt_tokens);
            span.record("output_tokens", u.completion_tokens);
        }
        TraceEvent::LlmRequest {
            provider: provider_id.to_string(),
            model: if resp.model.is_empty() {
                "default".into()
            } else {
                resp.model.clone()
            },
            round,
            streaming,
            duration_ms: started.elapsed().as_millis() as u64,
            prompt_tokens: resp.usage.map(|u| u.prompt_tokens),
            completion_tokens: resp.usage.map(|u| u.completion_tokens),
        }
        .emit();

        Ok(resp)
    }

    /// Run every call of one round concurrently. Results come back in request
    /// order.
    async fn execute_round(
        &self,
        calls: &[ToolCall],
        ctx: &ToolContext<'_>,
        tx: Option<&mpsc::Sender<TurnEvent>>,
    ) -> Vec<sb_tools::ToolOutcome> {
        if let Some(tx) = tx {
            for tc in calls {
                let _ = tx
                    .send(TurnEvent::ToolCall {
                        name: tc.tool_name.clone(),
                        arguments: tc.arguments.clone(),
                    })
                    .await;
            }
        }

        let limits = self.config.chat.compaction;
        let tool_futures: Vec<_> = calls
            .iter()
            .map(|tc| {
                let tool_span = tracing::info_span!("tool.call", tool_name = %tc.tool_name);
                async move {
                    let started = Instant::now();
                    let outcome = self.tools.execute(&tc.tool_name, &tc.arguments, ctx).await;
                    let compacted_chars = self
                        .shapers
                        .get(&tc.tool_name)
                        .compact(&outcome.response, &limits)
                        .to_string()
                        .len();
                    TraceEvent::ToolExecuted {
                        tool: tc.tool_name.clone(),
                        success: !outcome.is_error,
                        duration_ms: started.elapsed().as_millis() as u64,
                        raw_chars: outcome.response.to_string().len(),
                        compacted_chars,
                    }
                    .emit();
                    outcome
                }
                .instrument(tool_span)
            })
            .collect();
        let outcomes = futures_util::future::join_all(tool_futures).await;

        if let Some(tx) = tx {
            for outcome in &outcomes {
                let _ = tx
                    .send(TurnEvent::ToolResult {
                        name: outcome.name.clone(),
                        is_error: outcome.is_error,
                    })
                    .await;
            }
        }
        outcomes
    }

    /// The model stopped requesting tools.
    fn clean_exit(
        &self,
        store: &dyn ConversationStore,
        resp: ChatResponse,
        executed: &[ExecutedFunctionResponse],
        queued: &[PendingAction],
        now: DateTime<Utc>,
    ) -> Result<(String, String)> {
        let text = resp.content.trim();
        if !text.is_empty() {
            let reason = resp.finish_reason.unwrap_or_else(|| "stop".into());
            return Ok((text.to_string(), reason));
        }

        let reply = if !executed.is_empty() {
            self.degrade(FallbackReason::EmptyText, executed, queued)
        } else {
            let pending = store.pending_actions(now)?;
            if pending.is_empty() {
                fallback::apology(FallbackReason::EmptyText)
            } else {
                fallback::pending_actions_reply(&pending)
            }
        };
        Ok((reply, finish_reason::EMPTY_TEXT_FALLBACK.to_string()))
    }

    fn degrade(
        &self,
        reason: FallbackReason,
        executed: &[ExecutedFunctionResponse],
        queued: &[PendingAction],
    ) -> String {
        TraceEvent::FallbackUsed {
            reason: format!("{reason:?}"),
            executed_tools: executed.len(),
            pending_actions: queued.len(),
        }
        .emit();
        fallback::synthesize(
            reason,
            executed,
            queued,
            &self.shapers,
            &self.config.chat.compaction,
        )
    }
}

/// Append the confirm/cancel line for any queued action the model's text
/// does not mention, so a queued change is never silently dropped.
fn mention_queued(text: String, queued: &[PendingAction]) -> String {
    let missing: Vec<PendingAction> = queued
        .iter()
        .filter(|a| !text.contains(&a.id))
        .cloned()
        .collect();
    if missing.is_empty() {
        text
    } else {
        format!("{text}\n\n{}", fallback::pending_actions_reply(&missing))
    }
}

async fn retract(tx: Option<&mpsc::Sender<TurnEvent>>, shown: &str) {
    if let Some(tx) = tx.filter(|_| !shown.is_empty()) {
        let _ = tx.send(TurnEvent::Retract).await;
    }
}

/// Send whatever part of the reply was not already streamed, then `Final`.
/// If the streamed text is not a prefix of the reply, retract it and send
/// the whole reply.
async fn deliver(tx: &mpsc::Sender<TurnEvent>, reply: &Reply, chunk_chars: usize) {
    let rest = match reply.text.strip_prefix(reply.streamed.as_str()) {
        Some(rest) => rest,
        None => {
            if tx.send(TurnEvent::Retract).await.is_err() {
                return;
            }
            &reply.text
        }
    };
    for chunk in chunk_reply(rest, chunk_chars) {
        if tx.send(TurnEvent::AssistantDelta { text: chunk }).await.is_err() {
            return;
        }
    }
    let _ = tx
        .send(TurnEvent::Final {
            content: reply.text.clone(),
            finish_reason: reply.finish_reason.clone(),
        })
        .await;
}
