//! Per-tool result shaping.
//!
//! Every tool gets one [`ToolShaper`] that knows three things about its
//! result: how to compact it for the model, which citations it yields, and
//! how to render it as a plain-text fallback section. Tools without a
//! registered shaper use [`GenericShaper`].

use std::collections::HashMap;

use serde_json::Value;

use sb_domain::config::CompactionLimits;
use sb_domain::conversation::{Citation, CitationType};

use crate::compact::{compact_value, project, truncate_chars};

/// Shaping rules for one tool's raw result.
pub trait ToolShaper: Send + Sync {
    /// Bounded payload sent back to the model.
    fn compact(&self, raw: &Value, limits: &CompactionLimits) -> Value;

    /// User-visible source references found in the raw result.
    fn citations(&self, raw: &Value) -> Vec<Citation>;

    /// Human-readable section for fallback replies. `None` when there is
    /// nothing worth showing.
    fn fallback_section(&self, tool_name: &str, raw: &Value, limits: &CompactionLimits) -> Option<String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ShaperRegistry {
    shapers: HashMap<String, Box<dyn ToolShaper>>,
    generic: GenericShaper,
}

impl Default for ShaperRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl ShaperRegistry {
    /// A registry where every tool uses the generic shaper.
    pub fn empty() -> Self {
        Self {
            shapers: HashMap::new(),
            generic: GenericShaper,
        }
    }

    /// Shapers for the built-in study tools.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        register_builtin(&mut registry);
        registry
    }

    pub fn register(&mut self, tool_name: &str, shaper: Box<dyn ToolShaper>) {
        self.shapers.insert(tool_name.to_string(), shaper);
    }

    /// Shaper for `tool_name`, or the generic one.
    pub fn get(&self, tool_name: &str) -> &dyn ToolShaper {
        self.shapers
            .get(tool_name)
            .map(|s| s.as_ref())
            .unwrap_or(&self.generic)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Generic shaper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Recursive compaction, no citations, scalar-field fallback.
pub struct GenericShaper;

impl ToolShaper for GenericShaper {
    fn compact(&self, raw: &Value, limits: &CompactionLimits) -> Value {
        compact_value(raw, limits)
    }

    fn citations(&self, _raw: &Value) -> Vec<Citation> {
        Vec::new()
    }

    fn fallback_section(&self, tool_name: &str, raw: &Value, limits: &CompactionLimits) -> Option<String> {
        let map = raw.as_object()?;
        if map.contains_key("error") {
            return None;
        }
        let lines: Vec<String> = map
            .iter()
            .filter_map(|(k, v)| scalar_text(v).map(|t| format!("{k}: {t}")))
            .map(|line| truncate_chars(&line, limits.max_string_chars))
            .collect();
        if lines.is_empty() {
            return None;
        }
        Some(render_section(&humanize(tool_name), &lines, limits.max_items))
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `get_social_digest` → `Social digest`.
fn humanize(tool_name: &str) -> String {
    let words = tool_name
        .trim_start_matches("get_")
        .trim_start_matches("search_")
        .replace('_', " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => tool_name.to_string(),
    }
}

/// `Title:` followed by up to `max_items` bullet lines and a `+N more` line.
pub fn render_section(title: &str, lines: &[String], max_items: usize) -> String {
    let mut out = format!("{title}:");
    for line in lines.iter().take(max_items) {
        out.push_str("\n- ");
        out.push_str(line);
    }
    let rest = lines.len().saturating_sub(max_items);
    if rest > 0 {
        out.push_str(&format!("\n+{rest} more"));
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Record-list shaper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shaper for results of the form `{ "<list_key>": [record, ...], ... }`.
pub struct RecordListShaper {
    pub list_key: &'static str,
    pub title: &'static str,
    pub kind: CitationType,
    /// Fields kept per record in the compacted payload.
    pub keep: &'static [&'static str],
    pub timestamp_field: Option<&'static str>,
    pub label: fn(&Value) -> Option<String>,
    pub line: fn(&Value) -> Option<String>,
}

impl RecordListShaper {
    fn records<'a>(&self, raw: &'a Value) -> &'a [Value] {
        raw.get(self.list_key)
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl ToolShaper for RecordListShaper {
    fn compact(&self, raw: &Value, limits: &CompactionLimits) -> Value {
        let mut shaped = raw.clone();
        if let Some(list) = shaped.get_mut(self.list_key).and_then(|v| v.as_array_mut()) {
            for record in list.iter_mut() {
                *record = project(record, self.keep);
            }
        }
        compact_value(&shaped, limits)
    }

    fn citations(&self, raw: &Value) -> Vec<Citation> {
        self.records(raw)
            .iter()
            .filter_map(|record| {
                let id = id_text(record.get("id")?)?;
                let label = (self.label)(record).filter(|l| !l.trim().is_empty())?;
                let timestamp = self
                    .timestamp_field
                    .and_then(|f| record.get(f))
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                Some(Citation {
                    id,
                    kind: self.kind,
                    label,
                    timestamp,
                    metadata: None,
                })
            })
            .collect()
    }

    fn fallback_section(&self, _tool_name: &str, raw: &Value, limits: &CompactionLimits) -> Option<String> {
        if raw.get("error").is_some() || raw.get(self.list_key).is_none() {
            return None;
        }
        let lines: Vec<String> = self
            .records(raw)
            .iter()
            .filter_map(self.line)
            .map(|l| truncate_chars(&l, limits.max_string_chars))
            .collect();
        if lines.is_empty() {
            return Some(format!("{}: nothing found.", self.title));
        }
        Some(render_section(self.title, &lines, limits.max_items))
    }
}

fn id_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn str_field<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    record.get(field).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Queue shaper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shaper for tools that queue a pending action instead of mutating.
pub struct QueueShaper;

impl ToolShaper for QueueShaper {
    fn compact(&self, raw: &Value, limits: &CompactionLimits) -> Value {
        compact_value(raw, limits)
    }

    fn citations(&self, _raw: &Value) -> Vec<Citation> {
        Vec::new()
    }

    fn fallback_section(&self, _tool_name: &str, raw: &Value, _limits: &CompactionLimits) -> Option<String> {
        let action = raw.get("pending_action")?;
        let summary = str_field(action, "summary")?;
        let id = str_field(action, "id")?;
        Some(format!(
            "Queued for confirmation: {summary}. Reply `confirm {id}` or `cancel {id}`."
        ))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in shapers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn register_builtin(registry: &mut ShaperRegistry) {
    registry.register(
        "get_schedule",
        Box::new(RecordListShaper {
            list_key: "events",
            title: "Schedule",
            kind: CitationType::ScheduleItem,
            keep: &["id", "title", "start", "end", "location", "course"],
            timestamp_field: Some("start"),
            label: |r| str_field(r, "title").map(str::to_string),
            line: |r| {
                let title = str_field(r, "title")?;
                let mut line = match str_field(r, "start") {
                    Some(start) => format!("{} {title}", short_time(start)),
                    None => title.to_string(),
                };
                if let Some(loc) = str_field(r, "location") {
                    line.push_str(&format!(" ({loc})"));
                }
                Some(line)
            },
        }),
    );
    registry.register(
        "get_deadlines",
        Box::new(RecordListShaper {
            list_key: "deadlines",
            title: "Deadlines",
            kind: CitationType::Deadline,
            keep: &["id", "title", "course", "due_at", "status"],
            timestamp_field: Some("due_at"),
            label: |r| str_field(r, "title").map(str::to_string),
            line: |r| {
                let title = str_field(r, "title")?;
                let mut line = title.to_string();
                if let Some(course) = str_field(r, "course") {
                    line.push_str(&format!(" ({course})"));
                }
                if let Some(due) = str_field(r, "due_at") {
                    line.push_str(&format!(" due {}", short_time(due)));
                }
                if let Some(status) = str_field(r, "status") {
                    line.push_str(&format!(" [{status}]"));
                }
                Some(line)
            },
        }),
    );
    registry.register(
        "search_email",
        Box::new(RecordListShaper {
            list_key: "emails",
            title: "Emails",
            kind: CitationType::Email,
            keep: &["id", "from", "subject", "received_at", "snippet"],
            timestamp_field: Some("received_at"),
            label: |r| str_field(r, "subject").map(str::to_string),
            line: |r| {
                let subject = str_field(r, "subject")?;
                Some(match str_field(r, "from") {
                    Some(from) => format!("{subject} from {from}"),
                    None => subject.to_string(),
                })
            },
        }),
    );
    registry.register(
        "get_social_digest",
        Box::new(RecordListShaper {
            list_key: "posts",
            title: "Social updates",
            kind: CitationType::SocialPost,
            keep: &["id", "author", "platform", "text", "posted_at"],
            timestamp_field: Some("posted_at"),
            label: |r| {
                let author = str_field(r, "author")?;
                let text = str_field(r, "text").unwrap_or("");
                Some(format!("{author}: {}", truncate_chars(text, 60)))
            },
            line: |r| {
                let author = str_field(r, "author")?;
                let text = str_field(r, "text")?;
                Some(format!("{author}: {text}"))
            },
        }),
    );
    registry.register(
        "get_habits",
        Box::new(RecordListShaper {
            list_key: "habits",
            title: "Habits",
            kind: CitationType::Habit,
            keep: &["id", "name", "streak", "target", "last_checkin"],
            timestamp_field: Some("last_checkin"),
            label: |r| str_field(r, "name").map(str::to_string),
            line: |r| {
                let name = str_field(r, "name")?;
                let streak = r.get("streak").and_then(|v| v.as_u64()).unwrap_or(0);
                Some(format!("{name}: {streak} day streak"))
            },
        }),
    );
    registry.register(
        "get_goals",
        Box::new(RecordListShaper {
            list_key: "goals",
            title: "Goals",
            kind: CitationType::Goal,
            keep: &["id", "title", "progress", "target_date"],
            timestamp_field: Some("target_date"),
            label: |r| str_field(r, "title").map(str::to_string),
            line: |r| {
                let title = str_field(r, "title")?;
                Some(match r.get("progress").and_then(|v| v.as_f64()) {
                    Some(p) => format!("{title} ({:.0}% done)", p * 100.0),
                    None => title.to_string(),
                })
            },
        }),
    );
    registry.register(
        "search_documents",
        Box::new(RecordListShaper {
            list_key: "documents",
            title: "Documents",
            kind: CitationType::Document,
            keep: &["id", "title", "course", "excerpt", "updated_at"],
            timestamp_field: Some("updated_at"),
            label: |r| str_field(r, "title").map(str::to_string),
            line: |r| {
                let title = str_field(r, "title")?;
                Some(match str_field(r, "course") {
                    Some(course) => format!("{title} ({course})"),
                    None => title.to_string(),
                })
            },
        }),
    );
    registry.register("queue_deadline_update", Box::new(QueueShaper));
    registry.register("queue_habit_checkin", Box::new(QueueShaper));
}

/// `2026-03-02T09:00:00Z` → `2026-03-02 09:00`; anything else unchanged.
fn short_time(ts: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schedule(n: usize) -> Value {
        json!({
            "date": "2026-03-02",
            "events": (0..n).map(|i| json!({
                "id": format!("evt-{i}"),
                "title": format!("Lecture {i}"),
                "start": "2026-03-02T09:00:00Z",
                "location": "Room 101",
                "notes": "x".repeat(1_000),
            })).collect::<Vec<_>>()
        })
    }

    #[test]
    fn schedule_of_twenty_compacts_and_renders_more_line() {
        let registry = ShaperRegistry::with_builtin();
        let limits = CompactionLimits::default();
        let shaper = registry.get("get_schedule");
        let raw = schedule(20);

        let compact = shaper.compact(&raw, &limits);
        let events = compact["events"].as_array().unwrap();
        assert_eq!(events.len(), limits.max_items + 1);
        assert_eq!(compact["truncated"], true);
        assert!(events[0].get("notes").is_none());

        let section = shaper.fallback_section("get_schedule", &raw, &limits).unwrap();
        assert!(section.starts_with("Schedule:"));
        assert!(section.contains("2026-03-02 09:00 Lecture 0 (Room 101)"));
        assert!(section.ends_with(&format!("+{} more", 20 - limits.max_items)));
    }

    #[test]
    fn citations_drop_records_without_id_or_label() {
        let raw = json!({ "deadlines": [
            {"id": "d1", "title": "Essay", "due_at": "2026-03-05T23:59:00Z"},
            {"title": "No id"},
            {"id": "d3", "title": ""},
            {"id": 4, "title": "Numeric id"},
        ]});
        let cites = ShaperRegistry::with_builtin().get("get_deadlines").citations(&raw);
        assert_eq!(cites.len(), 2);
        assert_eq!(cites[0].key(), "deadline:d1");
        assert_eq!(cites[0].timestamp.as_deref(), Some("2026-03-05T23:59:00Z"));
        assert_eq!(cites[1].id, "4");
    }

    #[test]
    fn unknown_tool_uses_generic_shaper() {
        let registry = ShaperRegistry::with_builtin();
        let shaper = registry.get("weather_lookup");
        let raw = json!({"city": "Leeds", "temp_c": 9, "hourly": [1, 2, 3]});
        assert!(shaper.citations(&raw).is_empty());
        let section = shaper
            .fallback_section("weather_lookup", &raw, &CompactionLimits::default())
            .unwrap();
        assert!(section.starts_with("Weather lookup:"));
        assert!(section.contains("city: Leeds"));
    }

    #[test]
    fn error_payloads_render_nothing() {
        let registry = ShaperRegistry::with_builtin();
        let raw = json!({"error": "unknown deadline"});
        let limits = CompactionLimits::default();
        assert!(registry.get("get_deadlines").fallback_section("get_deadlines", &raw, &limits).is_none());
        assert!(registry.get("other").fallback_section("other", &raw, &limits).is_none());
    }

    #[test]
    fn empty_list_renders_nothing_found() {
        let section = ShaperRegistry::with_builtin()
            .get("search_email")
            .fallback_section("search_email", &json!({"emails": []}), &CompactionLimits::default())
            .unwrap();
        assert_eq!(section, "Emails: nothing found.");
    }

    #[test]
    fn queue_section_names_commands() {
        let raw = json!({"pending_action": {"id": "act-0a1b2c3d", "summary": "Mark Essay as done"}});
        let section = ShaperRegistry::with_builtin()
            .get("queue_deadline_update")
            .fallback_section("queue_deadline_update", &raw, &CompactionLimits::default())
            .unwrap();
        assert!(section.contains("confirm act-0a1b2c3d"));
    }
}
