//! Reply interpretation: recover a JSON object from a model reply and project
//! it onto the fixed field set.
//!
//! Models are told to answer with a bare JSON object, but small local models
//! regularly wrap it in ```json fences or surround it with prose. Candidates
//! are tried in this order, and the first one that parses as a JSON *object*
//! wins:
//!
//! 1. the whole reply
//! 2. each fenced code block
//! 3. each balanced `{…}` substring (string literals respected)
//!
//! Projection never fails: missing keys become `NOT FOUND`, extra keys are
//! dropped, and non-string scalars are rendered as strings.

use crate::error::DocumentError;
use crate::record::{ExtractionRecord, FieldValue, InvoiceField};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// The validated outcome of one model reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    Valid(ExtractionRecord),
    /// No JSON object could be recovered; carries a short reason.
    Malformed(String),
}

impl ModelReply {
    pub fn into_result(self) -> Result<ExtractionRecord, DocumentError> {
        match self {
            ModelReply::Valid(record) => Ok(record),
            ModelReply::Malformed(detail) => Err(DocumentError::ExtractionParse { detail }),
        }
    }
}

/// Interpret a raw completion.
pub fn interpret_reply(reply: &str) -> ModelReply {
    let reply = strip_invisible(reply);
    let reply = reply.trim();

    if reply.is_empty() {
        return ModelReply::Malformed("model returned an empty reply".into());
    }

    match recover_object(reply) {
        Some(object) => ModelReply::Valid(project(&object)),
        None => {
            let preview: String = reply.chars().take(120).collect();
            ModelReply::Malformed(format!("no JSON object in reply: {preview:?}"))
        }
    }
}

/// Map a JSON object onto an [`ExtractionRecord`].
///
/// Keys are matched exactly first, then after normalising case and
/// separators (`"Invoice Number"` → `invoice_number`).
pub fn project(object: &Map<String, Value>) -> ExtractionRecord {
    let mut record = ExtractionRecord::not_found();
    for field in InvoiceField::ALL {
        let value = object.get(field.as_str()).or_else(|| {
            object
                .iter()
                .find(|(k, _)| normalize_key(k) == field.as_str())
                .map(|(_, v)| v)
        });
        if let Some(value) = value {
            record.set(field, field_value(value));
        }
    }
    record
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

fn field_value(value: &Value) -> FieldValue {
    match value {
        Value::String(s) => FieldValue::from_raw(s),
        Value::Number(n) => FieldValue::from_raw(&n.to_string()),
        Value::Bool(b) => FieldValue::from_raw(&b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => FieldValue::NotFound,
    }
}

// ── Candidate recovery ───────────────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:json)?\s*(.+?)\s*```").unwrap());

fn recover_object(reply: &str) -> Option<Map<String, Value>> {
    if let Some(object) = parse_object(reply) {
        return Some(object);
    }

    for caps in RE_FENCE.captures_iter(reply) {
        if let Some(object) = parse_object(&caps[1]) {
            return Some(object);
        }
    }

    brace_blocks(reply).find_map(parse_object)
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Every balanced `{…}` substring, outermost first, in order of opening brace.
fn brace_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(move |(start, _)| balanced_end(&text[start..]).map(|end| &text[start..start + end]))
}

/// Byte length of the balanced block at the start of `s`, if it closes.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_invisible(input: &str) -> String {
    input
        .chars()
        .filter(|&c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}'))
        .collect()
}
