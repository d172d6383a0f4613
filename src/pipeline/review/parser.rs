use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use crate::models::enums::ClassificationLabel;
use crate::models::Classification;
use crate::pipeline::llm::{lenient_array_objects, parse_json_object};

pub const MAX_RATIONALE_CHARS: usize = 160;

/// Which rung of the parsing ladder produced the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMethod {
    Json,
    Lenient,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResults {
    pub method: ParseMethod,
    pub objects: Vec<Value>,
}

/// Parse a reply into raw result objects.
///
/// JSON object (directly or via its outermost braces) with a `results`
/// array first, then the lenient array scan. `None` when nothing usable.
pub fn parse_review_reply(reply: &str) -> Option<ParsedResults> {
    if let Some(obj) = parse_json_object(reply) {
        if let Some(results) = obj.get("results").and_then(Value::as_array) {
            return Some(ParsedResults {
                method: ParseMethod::Json,
                objects: results.clone(),
            });
        }
    }

    let objects = lenient_array_objects(reply, "results");
    (!objects.is_empty()).then_some(ParsedResults {
        method: ParseMethod::Lenient,
        objects,
    })
}

fn index_of(value: &Value) -> Option<usize> {
    match value.get("index")? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .map(|n| n as usize),
        _ => None,
    }
}

/// Accepts `"ALLOWED"`, `"allowed"`, `"Needs Review"`, `"receipt-required"`.
pub fn parse_label(raw: &str) -> Option<ClassificationLabel> {
    let normalized: String = raw
        .trim()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_uppercase() })
        .collect();
    normalized.parse().ok()
}

/// `"FAR 31.205-51"` → `"31.205-51"`; anything not under Part 31 → `""`.
pub fn clean_far_section(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("FAR")
        .or_else(|| trimmed.strip_prefix("far"))
        .map(|s| s.trim_start_matches([' ', '-', '§']))
        .unwrap_or(trimmed)
        .trim_start_matches('§')
        .trim();
    if stripped.starts_with("31.") {
        stripped.to_string()
    } else {
        String::new()
    }
}

pub fn truncate_rationale(raw: &str) -> String {
    raw.trim().chars().take(MAX_RATIONALE_CHARS).collect()
}

/// Turn a raw result object into a classification for a requested row.
/// `requested` maps row index → row id. Unrequested indices and unknown
/// labels are rejected; the id always comes from the row, not the reply.
pub fn classification_from_value(
    value: &Value,
    requested: &BTreeMap<usize, Option<Uuid>>,
) -> Option<Classification> {
    let index = index_of(value)?;
    let id = *requested.get(&index)?;
    let label = value
        .get("classification")
        .and_then(Value::as_str)
        .and_then(parse_label)?;
    let rationale = value
        .get("rationale")
        .and_then(Value::as_str)
        .map(truncate_rationale)
        .unwrap_or_default();
    let far_section = value
        .get("farSection")
        .and_then(Value::as_str)
        .map(clean_far_section)
        .unwrap_or_default();

    Some(Classification {
        index,
        id,
        classification: label,
        rationale,
        far_section,
    })
}
