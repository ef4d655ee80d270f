//! In-memory study data and the tool handlers that read it.
//!
//! Backs the CLI so the turn loop can be exercised without real calendar,
//! mail, or course integrations. Read tools return `{ "<list>": [...] }`
//! payloads understood by the built-in shapers; the `queue_*` tools never
//! mutate, they queue a pending action that [`DemoMutationExecutor`] applies
//! once confirmed.

use std::sync::Arc;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Map, Value};

use sb_domain::conversation::{ActionExecutionResult, NewPendingAction, PendingAction};
use sb_domain::error::{Error, Result};
use sb_domain::tool::ToolDefinition;
use sb_sessions::ConversationStore;

use crate::mutation::MutationExecutor;
use crate::registry::{ToolContext, ToolHandler, ToolRegistry};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start: String,
    pub end: String,
    pub location: String,
    pub course: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Deadline {
    pub id: String,
    pub title: String,
    pub course: String,
    pub due_at: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Email {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub received_at: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub platform: String,
    pub text: String,
    pub posted_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Habit {
    pub id: String,
    pub name: String,
    pub streak: u32,
    pub target: String,
    pub last_checkin: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Goal {
    pub id: String,
    pub title: String,
    /// 0.0 – 1.0
    pub progress: f64,
    pub target_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub course: String,
    pub excerpt: String,
    pub updated_at: String,
}

#[derive(Debug, Default)]
struct DemoState {
    events: Vec<Event>,
    deadlines: Vec<Deadline>,
    emails: Vec<Email>,
    posts: Vec<Post>,
    habits: Vec<Habit>,
    goals: Vec<Goal>,
    documents: Vec<Document>,
}

/// Shared demo dataset. Handlers read it, the mutation executor writes it.
pub struct DemoData {
    state: RwLock<DemoState>,
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl DemoData {
    /// A week of plausible student data anchored at `now`.
    pub fn seeded(now: DateTime<Utc>) -> Self {
        let at = |hours: i64| ts(now + Duration::hours(hours));
        let event = |id: &str, title: &str, start: i64, len: i64, location: &str, course: Option<&str>| Event {
            id: id.into(),
            title: title.into(),
            start: at(start),
            end: at(start + len),
            location: location.into(),
            course: course.map(str::to_string),
        };
        let deadline = |id: &str, title: &str, course: &str, due: i64| Deadline {
            id: id.into(),
            title: title.into(),
            course: course.into(),
            due_at: at(due),
            status: "open".into(),
        };

        let state = DemoState {
            events: vec![
                event("evt-101", "Calculus II lecture", 2, 1, "Hall B", Some("MATH 201")),
                event("evt-102", "Organic chemistry lab", 5, 3, "Lab 4", Some("CHEM 230")),
                event("evt-103", "Study group", 26, 2, "Library room 3", None),
                event("evt-104", "Office hours with Dr. Patel", 29, 1, "Room 212", Some("MATH 201")),
                event("evt-105", "Linear algebra tutorial", 50, 1, "Hall A", Some("MATH 220")),
                event("evt-106", "Career fair", 74, 4, "Student union", None),
            ],
            deadlines: vec![
                deadline("dl-201", "Problem set 6", "MATH 201", 30),
                deadline("dl-202", "Lab report: esterification", "CHEM 230", 54),
                deadline("dl-203", "History essay draft", "HIST 110", 100),
                deadline("dl-204", "Linear algebra quiz", "MATH 220", 150),
                deadline("dl-205", "Internship application", "Career", 400),
            ],
            emails: vec![
                Email {
                    id: "em-301".into(),
                    from: "Dr. Patel".into(),
                    subject: "Problem set 6 clarification".into(),
                    received_at: at(-3),
                    snippet: "Question 4 only needs the first two parts.".into(),
                },
                Email {
                    id: "em-302".into(),
                    from: "Lab coordinator".into(),
                    subject: "Bring goggles to Thursday's lab".into(),
                    received_at: at(-20),
                    snippet: "Safety goggles are mandatory from this week on.".into(),
                },
                Email {
                    id: "em-303".into(),
                    from: "Careers office".into(),
                    subject: "Career fair employer list".into(),
                    received_at: at(-30),
                    snippet: "Over forty employers confirmed, see the attached list.".into(),
                },
            ],
            posts: vec![
                Post {
                    id: "post-401".into(),
                    author: "MATH 201 study group".into(),
                    platform: "discord".into(),
                    text: "Meeting moved to library room 3 tomorrow.".into(),
                    posted_at: at(-5),
                },
                Post {
                    id: "post-402".into(),
                    author: "Student union".into(),
                    platform: "instagram".into(),
                    text: "Free coffee at the career fair for early arrivals.".into(),
                    posted_at: at(-12),
                },
            ],
            habits: vec![
                Habit {
                    id: "hab-501".into(),
                    name: "Morning review".into(),
                    streak: 4,
                    target: "daily".into(),
                    last_checkin: Some(at(-20)),
                },
                Habit {
                    id: "hab-502".into(),
                    name: "Gym".into(),
                    streak: 0,
                    target: "3x weekly".into(),
                    last_checkin: None,
                },
            ],
            goals: vec![
                Goal {
                    id: "goal-601".into(),
                    title: "Finish MATH 201 with an A".into(),
                    progress: 0.6,
                    target_date: at(24 * 60),
                },
                Goal {
                    id: "goal-602".into(),
                    title: "Land a summer internship".into(),
                    progress: 0.25,
                    target_date: at(24 * 90),
                },
            ],
            documents: vec![
                Document {
                    id: "doc-701".into(),
                    title: "Lecture 12: Series convergence".into(),
                    course: "MATH 201".into(),
                    excerpt: "Ratio and root tests, with worked examples.".into(),
                    updated_at: at(-48),
                },
                Document {
                    id: "doc-702".into(),
                    title: "Esterification lab handout".into(),
                    course: "CHEM 230".into(),
                    excerpt: "Procedure, safety notes, and report template.".into(),
                    updated_at: at(-72),
                },
                Document {
                    id: "doc-703".into(),
                    title: "Essay rubric".into(),
                    course: "HIST 110".into(),
                    excerpt: "Argument 40%, evidence 40%, style 20%.".into(),
                    updated_at: at(-200),
                },
            ],
        };

        Self {
            state: RwLock::new(state),
        }
    }

    pub fn deadline(&self, id: &str) -> Option<Deadline> {
        self.state.read().deadlines.iter().find(|d| d.id == id).cloned()
    }

    pub fn habit(&self, id_or_name: &str) -> Option<Habit> {
        let needle = id_or_name.to_lowercase();
        self.state
            .read()
            .habits
            .iter()
            .find(|h| h.id == id_or_name || h.name.to_lowercase() == needle)
            .cloned()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoToolKind {
    Schedule,
    Deadlines,
    Email,
    SocialDigest,
    Habits,
    Goals,
    Documents,
    QueueDeadlineUpdate,
    QueueHabitCheckin,
}

impl DemoToolKind {
    pub const ALL: [DemoToolKind; 9] = [
        DemoToolKind::Schedule,
        DemoToolKind::Deadlines,
        DemoToolKind::Email,
        DemoToolKind::SocialDigest,
        DemoToolKind::Habits,
        DemoToolKind::Goals,
        DemoToolKind::Documents,
        DemoToolKind::QueueDeadlineUpdate,
        DemoToolKind::QueueHabitCheckin,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DemoToolKind::Schedule => "get_schedule",
            DemoToolKind::Deadlines => "get_deadlines",
            DemoToolKind::Email => "search_email",
            DemoToolKind::SocialDigest => "get_social_digest",
            DemoToolKind::Habits => "get_habits",
            DemoToolKind::Goals => "get_goals",
            DemoToolKind::Documents => "search_documents",
            DemoToolKind::QueueDeadlineUpdate => "queue_deadline_update",
            DemoToolKind::QueueHabitCheckin => "queue_habit_checkin",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            DemoToolKind::Schedule => "List calendar events, optionally for one day (YYYY-MM-DD).",
            DemoToolKind::Deadlines => "List open deadlines due within the next N days.",
            DemoToolKind::Email => "Search the student's inbox by keyword.",
            DemoToolKind::SocialDigest => "Recent posts from class groups and followed accounts.",
            DemoToolKind::Habits => "Tracked habits with current streaks.",
            DemoToolKind::Goals => "Long-term goals with progress.",
            DemoToolKind::Documents => "Search course materials and notes by keyword.",
            DemoToolKind::QueueDeadlineUpdate => {
                "Queue a status change for a deadline. Applied only after the student confirms."
            }
            DemoToolKind::QueueHabitCheckin => {
                "Queue a check-in for a habit. Applied only after the student confirms."
            }
        }
    }

    fn parameters(&self) -> Value {
        match self {
            DemoToolKind::Schedule => json!({
                "type": "object",
                "properties": {
                    "date": { "type": "string", "description": "Day to list (YYYY-MM-DD)" }
                }
            }),
            DemoToolKind::Deadlines => json!({
                "type": "object",
                "properties": {
                    "days": { "type": "integer", "description": "Look-ahead window in days (default 14)" }
                }
            }),
            DemoToolKind::Email | DemoToolKind::Documents => json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Keyword to search for" }
                }
            }),
            DemoToolKind::SocialDigest | DemoToolKind::Habits | DemoToolKind::Goals => json!({
                "type": "object",
                "properties": {}
            }),
            DemoToolKind::QueueDeadlineUpdate => json!({
                "type": "object",
                "properties": {
                    "deadline_id": { "type": "string", "description": "Deadline id from get_deadlines" },
                    "status": {
                        "type": "string",
                        "enum": ["open", "in_progress", "done"],
                        "description": "New status (default done)"
                    }
                },
                "required": ["deadline_id"]
            }),
            DemoToolKind::QueueHabitCheckin => json!({
                "type": "object",
                "properties": {
                    "habit": { "type": "string", "description": "Habit id or name" }
                },
                "required": ["habit"]
            }),
        }
    }
}

/// One demo tool bound to the shared dataset.
pub struct DemoTool {
    kind: DemoToolKind,
    data: Arc<DemoData>,
}

impl DemoTool {
    pub fn new(kind: DemoToolKind, data: Arc<DemoData>) -> Self {
        Self { kind, data }
    }
}

/// Registry with every demo tool.
pub fn demo_registry(data: Arc<DemoData>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for kind in DemoToolKind::ALL {
        registry.register(Arc::new(DemoTool::new(kind, Arc::clone(&data))));
    }
    registry
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn matches_query(query: Option<&str>, fields: &[&str]) -> bool {
    let Some(q) = query else {
        return true;
    };
    let q = q.to_lowercase();
    fields.iter().any(|f| f.to_lowercase().contains(&q))
}

fn to_values<T: Serialize>(items: impl IntoIterator<Item = T>) -> Result<Vec<Value>> {
    items
        .into_iter()
        .map(|i| serde_json::to_value(i).map_err(Error::from))
        .collect()
}

/// Tool-result view of a freshly queued action.
fn queued(action: &PendingAction) -> Value {
    json!({
        "status": "pending_confirmation",
        "pending_action": {
            "id": action.id,
            "action_type": action.action_type,
            "summary": action.summary,
            "expires_at": ts(action.expires_at),
            "confirm_command": action.confirm_command(),
            "cancel_command": action.cancel_command(),
        }
    })
}

#[async_trait::async_trait]
impl ToolHandler for DemoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.kind.name().into(),
            description: self.kind.description().into(),
            parameters: self.kind.parameters(),
        }
    }

    async fn call(&self, args: &Value, ctx: &ToolContext<'_>) -> Result<Value> {
        match self.kind {
            DemoToolKind::Schedule => {
                let date = str_arg(args, "date");
                let state = self.data.state.read();
                let events = state
                    .events
                    .iter()
                    .filter(|e| date.map_or(true, |d| e.start.starts_with(d)));
                Ok(json!({
                    "date": date.unwrap_or("upcoming"),
                    "events": to_values(events)?,
                }))
            }
            DemoToolKind::Deadlines => {
                let days = args.get("days").and_then(|v| v.as_i64()).unwrap_or(14).max(0);
                let horizon = ctx.now + Duration::days(days);
                let state = self.data.state.read();
                let due = state.deadlines.iter().filter(|d| {
                    d.status != "done"
                        && DateTime::parse_from_rfc3339(&d.due_at)
                            .map(|t| t.with_timezone(&Utc) <= horizon)
                            .unwrap_or(true)
                });
                Ok(json!({ "window_days": days, "deadlines": to_values(due)? }))
            }
            DemoToolKind::Email => {
                let query = str_arg(args, "query");
                let state = self.data.state.read();
                let hits = state
                    .emails
                    .iter()
                    .filter(|e| matches_query(query, &[&e.subject, &e.from, &e.snippet]));
                Ok(json!({ "query": query.unwrap_or(""), "emails": to_values(hits)? }))
            }
            DemoToolKind::SocialDigest => {
                let state = self.data.state.read();
                Ok(json!({ "posts": to_values(&state.posts)? }))
            }
            DemoToolKind::Habits => {
                let state = self.data.state.read();
                Ok(json!({ "habits": to_values(&state.habits)? }))
            }
            DemoToolKind::Goals => {
                let state = self.data.state.read();
                Ok(json!({ "goals": to_values(&state.goals)? }))
            }
            DemoToolKind::Documents => {
                let query = str_arg(args, "query");
                let state = self.data.state.read();
                let hits = state
                    .documents
                    .iter()
                    .filter(|d| matches_query(query, &[&d.title, &d.course, &d.excerpt]));
                Ok(json!({ "query": query.unwrap_or(""), "documents": to_values(hits)? }))
            }
            DemoToolKind::QueueDeadlineUpdate => {
                let id = str_arg(args, "deadline_id")
                    .ok_or_else(|| Error::tool(self.kind.name(), "deadline_id is required"))?;
                let status = str_arg(args, "status").unwrap_or("done");
                let Some(deadline) = self.data.deadline(id) else {
                    return Ok(json!({ "error": format!("no deadline with id '{id}'") }));
                };
                let mut payload = Map::new();
                payload.insert("deadline_id".into(), json!(deadline.id));
                payload.insert("status".into(), json!(status));
                let action = ctx.store.create_pending_action(
                    NewPendingAction {
                        action_type: "deadline_update".into(),
                        summary: format!("Mark \"{}\" as {status}", deadline.title),
                        payload,
                        ttl: ctx.action_ttl,
                    },
                    ctx.now,
                )?;
                Ok(queued(&action))
            }
            DemoToolKind::QueueHabitCheckin => {
                let key = str_arg(args, "habit")
                    .ok_or_else(|| Error::tool(self.kind.name(), "habit is required"))?;
                let Some(habit) = self.data.habit(key) else {
                    return Ok(json!({ "error": format!("no habit matching '{key}'") }));
                };
                let mut payload = Map::new();
                payload.insert("habit_id".into(), json!(habit.id));
                let action = ctx.store.create_pending_action(
                    NewPendingAction {
                        action_type: "habit_checkin".into(),
                        summary: format!("Check in \"{}\" for today", habit.name),
                        payload,
                        ttl: ctx.action_ttl,
                    },
                    ctx.now,
                )?;
                Ok(queued(&action))
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mutations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Applies confirmed `deadline_update`, `habit_checkin`, and `habit_create`
/// actions to the demo dataset.
pub struct DemoMutationExecutor {
    data: Arc<DemoData>,
}

impl DemoMutationExecutor {
    pub fn new(data: Arc<DemoData>) -> Self {
        Self { data }
    }

    fn apply(&self, action: &PendingAction) -> std::result::Result<String, String> {
        let field = |key: &str| {
            action
                .payload
                .get(key)
                .and_then(|v| v.as_str())
                .ok_or_else(|| format!("payload is missing '{key}'"))
        };
        let mut state = self.data.state.write();

        match action.action_type.as_str() {
            "deadline_update" => {
                let id = field("deadline_id")?;
                let status = field("status")?;
                let deadline = state
                    .deadlines
                    .iter_mut()
                    .find(|d| d.id == id)
                    .ok_or_else(|| format!("deadline {id} no longer exists"))?;
                deadline.status = status.to_string();
                Ok(format!("Marked \"{}\" as {status}.", deadline.title))
            }
            "habit_checkin" => {
                let id = field("habit_id")?;
                let habit = state
                    .habits
                    .iter_mut()
                    .find(|h| h.id == id)
                    .ok_or_else(|| format!("habit {id} no longer exists"))?;
                habit.streak += 1;
                habit.last_checkin = Some(ts(Utc::now()));
                Ok(format!(
                    "Checked in \"{}\". Streak is now {} days.",
                    habit.name, habit.streak
                ))
            }
            "habit_create" => {
                let name = field("name")?;
                let id = format!("hab-{}", 501 + state.habits.len());
                state.habits.push(Habit {
                    id,
                    name: name.to_string(),
                    streak: 0,
                    target: "daily".into(),
                    last_checkin: None,
                });
                Ok(format!("Now tracking \"{name}\" as a habit."))
            }
            other => Err(format!("unsupported action type '{other}'")),
        }
    }
}

#[async_trait::async_trait]
impl MutationExecutor for DemoMutationExecutor {
    async fn execute(
        &self,
        action: &PendingAction,
        _store: &dyn ConversationStore,
    ) -> Result<ActionExecutionResult> {
        let (success, message) = match self.apply(action) {
            Ok(message) => (true, message),
            Err(message) => (false, message),
        };
        tracing::info!(
            action_id = %action.id,
            action_type = %action.action_type,
            success,
            "demo mutation applied"
        );
        Ok(ActionExecutionResult {
            action_id: action.id.clone(),
            action_type: action.action_type.clone(),
            success,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sb_sessions::MemoryStore;

    fn ctx(store: &MemoryStore, now: DateTime<Utc>) -> ToolContext<'_> {
        ToolContext {
            store,
            now,
            action_ttl: Duration::hours(24),
        }
    }

    #[tokio::test]
    async fn every_tool_is_registered_with_a_schema() {
        let registry = demo_registry(Arc::new(DemoData::seeded(Utc::now())));
        let defs = registry.definitions();
        assert_eq!(defs.len(), DemoToolKind::ALL.len());
        assert!(defs.iter().all(|d| d.parameters["type"] == "object"));
    }

    #[tokio::test]
    async fn deadlines_respect_window() {
        let now = Utc::now();
        let registry = demo_registry(Arc::new(DemoData::seeded(now)));
        let store = MemoryStore::new();
        let out = registry
            .execute("get_deadlines", &json!({"days": 3}), &ctx(&store, now))
            .await;
        let ids: Vec<_> = out.response["deadlines"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["dl-201", "dl-202"]);
    }

    #[tokio::test]
    async fn email_search_is_case_insensitive() {
        let now = Utc::now();
        let registry = demo_registry(Arc::new(DemoData::seeded(now)));
        let store = MemoryStore::new();
        let out = registry
            .execute("search_email", &json!({"query": "GOGGLES"}), &ctx(&store, now))
            .await;
        assert_eq!(out.response["emails"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn queue_then_confirm_applies_mutation() {
        let now = Utc::now();
        let data = Arc::new(DemoData::seeded(now));
        let registry = demo_registry(Arc::clone(&data));
        let store = MemoryStore::new();

        let out = registry
            .execute(
                "queue_deadline_update",
                &json!({"deadline_id": "dl-201"}),
                &ctx(&store, now),
            )
            .await;
        assert_eq!(out.response["status"], "pending_confirmation");
        assert_eq!(data.deadline("dl-201").unwrap().status, "open");

        let pending = store.pending_actions(now).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            crate::registry::pending_action_id(&out.response),
            Some(pending[0].id.as_str())
        );

        let result = DemoMutationExecutor::new(Arc::clone(&data))
            .execute(&pending[0], &store)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(data.deadline("dl-201").unwrap().status, "done");
    }

    #[tokio::test]
    async fn unknown_deadline_is_error_shaped_not_err() {
        let now = Utc::now();
        let registry = demo_registry(Arc::new(DemoData::seeded(now)));
        let store = MemoryStore::new();
        let out = registry
            .execute(
                "queue_deadline_update",
                &json!({"deadline_id": "dl-999"}),
                &ctx(&store, now),
            )
            .await;
        assert!(!out.is_error);
        assert!(out.response["error"].is_string());
        assert!(store.pending_actions(now).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_action_reports_failure() {
        let now = Utc::now();
        let store = MemoryStore::new();
        let action = PendingAction {
            id: "act-00000000".into(),
            action_type: "teleport".into(),
            summary: "?".into(),
            payload: Map::new(),
            created_at: now,
            expires_at: now + Duration::hours(1),
        };
        let result = DemoMutationExecutor::new(Arc::new(DemoData::seeded(now)))
            .execute(&action, &store)
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.message.contains("teleport"));
    }
}
