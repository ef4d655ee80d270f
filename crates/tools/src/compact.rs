//! Generic tool-result compaction.
//!
//! Bounds applied recursively:
//! - arrays keep `max_items` entries followed by `"[N more items omitted]"`,
//!   and the object holding such an array gets `"truncated": true`
//! - objects keep `max_keys` entries; a wider object gets `"truncated": true`
//!   and an `"omitted"` entry with the same marker. Keys are cut like strings
//! - strings keep `max_string_chars` chars followed by `…`
//! - objects and arrays nested `max_depth` levels deep become
//!   `"[truncated object]"`

use serde_json::{Map, Value};

use sb_domain::config::CompactionLimits;

pub const TRUNCATED_OBJECT: &str = "[truncated object]";

/// Compact any JSON value within `limits`.
pub fn compact_value(value: &Value, limits: &CompactionLimits) -> Value {
    compact_at(value, limits, 0).0
}

/// Returns the compacted value and whether an array directly inside it was cut.
fn compact_at(value: &Value, limits: &CompactionLimits, depth: usize) -> (Value, bool) {
    match value {
        Value::String(s) => (Value::String(truncate_chars(s, limits.max_string_chars)), false),
        Value::Array(items) => {
            if depth >= limits.max_depth {
                return (Value::String(TRUNCATED_OBJECT.into()), false);
            }
            compact_array(items, limits, depth)
        }
        Value::Object(map) => {
            if depth >= limits.max_depth {
                return (Value::String(TRUNCATED_OBJECT.into()), false);
            }
            (Value::Object(compact_object(map, limits, depth)), false)
        }
        other => (other.clone(), false),
    }
}

fn compact_array(items: &[Value], limits: &CompactionLimits, depth: usize) -> (Value, bool) {
    let mut out: Vec<Value> = items
        .iter()
        .take(limits.max_items)
        .map(|item| compact_at(item, limits, depth + 1).0)
        .collect();
    let omitted = items.len().saturating_sub(limits.max_items);
    if omitted > 0 {
        out.push(Value::String(omitted_marker(omitted)));
    }
    (Value::Array(out), omitted > 0)
}

fn compact_object(map: &Map<String, Value>, limits: &CompactionLimits, depth: usize) -> Map<String, Value> {
    let kept = map.len().min(limits.max_keys);
    let mut out = Map::with_capacity(kept + 2);
    let mut cut = false;
    for (key, value) in map.iter().take(kept) {
        let (compacted, was_cut) = compact_at(value, limits, depth + 1);
        cut |= was_cut;
        out.insert(truncate_chars(key, limits.max_string_chars), compacted);
    }
    let omitted = map.len() - kept;
    if omitted > 0 {
        out.insert("omitted".into(), Value::String(omitted_marker(omitted)));
    }
    if cut || omitted > 0 {
        out.insert("truncated".into(), Value::Bool(true));
    }
    out
}

pub fn omitted_marker(omitted: usize) -> String {
    format!("[{omitted} more items omitted]")
}

/// Cut `s` to at most `max_chars` characters, appending `…` when cut.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((idx, _)) => {
            let mut out = s[..idx].to_string();
            out.push('…');
            out
        }
    }
}

/// Keep only `fields` of a record (in the given order); non-objects pass through.
pub fn project(record: &Value, fields: &[&str]) -> Value {
    let Some(map) = record.as_object() else {
        return record.clone();
    };
    let mut out = Map::new();
    for field in fields {
        if let Some(v) = map.get(*field) {
            out.insert((*field).to_string(), v.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits() -> CompactionLimits {
        CompactionLimits {
            max_items: 3,
            max_keys: 4,
            max_string_chars: 20,
            max_depth: 3,
        }
    }

    /// Depth, array and object width, and string and key length of the
    /// compacted tree.
    fn check_bounds(v: &Value, l: &CompactionLimits, depth: usize) {
        match v {
            Value::String(s) => assert!(s.chars().count() <= l.max_string_chars + 1, "{s}"),
            Value::Array(items) => {
                assert!(depth < l.max_depth);
                assert!(items.len() <= l.max_items + 1);
                for i in items {
                    check_bounds(i, l, depth + 1);
                }
            }
            Value::Object(map) => {
                assert!(depth < l.max_depth);
                // Kept entries plus the "omitted" and "truncated" markers.
                assert!(map.len() <= l.max_keys + 2, "{} keys", map.len());
                for (k, v) in map {
                    assert!(k.chars().count() <= l.max_string_chars + 1, "{k}");
                    check_bounds(v, l, depth + 1);
                }
            }
            _ => {}
        }
    }

    #[test]
    fn long_lists_are_cut_and_flagged() {
        let raw = json!({ "events": (0..20).map(|i| json!({"id": i})).collect::<Vec<_>>() });
        let out = compact_value(&raw, &limits());
        let events = out["events"].as_array().unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[3], "[17 more items omitted]");
        assert_eq!(out["truncated"], true);
    }

    #[test]
    fn short_lists_are_untouched() {
        let raw = json!({ "events": [1, 2] });
        let out = compact_value(&raw, &limits());
        assert_eq!(out, raw);
    }

    #[test]
    fn strings_are_cut_on_char_boundaries() {
        let s = "é".repeat(50);
        let out = truncate_chars(&s, 20);
        assert_eq!(out.chars().count(), 21);
        assert!(out.ends_with('…'));
        assert_eq!(truncate_chars("short", 20), "short");
    }

    #[test]
    fn deep_nesting_is_replaced() {
        let raw = json!({"a": {"b": {"c": {"d": 1}}}});
        let out = compact_value(&raw, &limits());
        assert_eq!(out["a"]["b"]["c"], TRUNCATED_OBJECT);
    }

    #[test]
    fn arbitrary_input_stays_within_bounds() {
        let big_text = "x".repeat(5_000);
        let nested: Vec<Value> = (0..50)
            .map(|i| {
                json!({
                    "id": i,
                    "text": big_text,
                    "tags": (0..40).map(|t| format!("tag-{t}-{big_text}")).collect::<Vec<_>>(),
                    "deep": {"l1": {"l2": {"l3": {"l4": [1, 2, 3]}}}},
                })
            })
            .collect();
        let wide: Map<String, Value> = (0..5_000)
            .map(|i| (format!("field-{i}-{}", "k".repeat(60)), json!(i)))
            .collect();
        let raw = json!({ "items": nested, "note": big_text, "rows": [[[[[1]]]]] });
        let l = limits();
        check_bounds(&compact_value(&raw, &l), &l, 0);
        check_bounds(&compact_value(&Value::Object(wide.clone()), &l), &l, 0);
        check_bounds(&compact_value(&json!({ "wide": wide }), &l), &l, 0);
    }

    #[test]
    fn wide_objects_are_cut_and_flagged() {
        let raw: Map<String, Value> = (0..10).map(|i| (format!("k{i}"), json!(i))).collect();
        let out = compact_value(&Value::Object(raw), &limits());
        let out = out.as_object().unwrap();
        assert_eq!(out.len(), 4 + 2);
        assert_eq!(out["omitted"], "[6 more items omitted]");
        assert_eq!(out["truncated"], true);

        let narrow = json!({"id": 1, "title": "Essay"});
        assert_eq!(compact_value(&narrow, &limits()), narrow);
    }

    #[test]
    fn project_keeps_listed_fields() {
        let rec = json!({"id": 1, "title": "t", "noise": "n"});
        assert_eq!(project(&rec, &["id", "title"]), json!({"id": 1, "title": "t"}));
    }
}
