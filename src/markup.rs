//! Attribute-level syntax shared by the bindings.

use serde_json::{Number, Value};

use crate::error::{BindingError, Result};

/// `two-way` → `twoWay`, `on-item-click` → `onItemClick`.
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('-', Some(next)) if next.is_alphanumeric() || *next == '_' => {
                out.extend(next.to_uppercase());
                chars.next();
            }
            _ => out.push(c),
        }
    }
    out
}

/// Whether `text` contains a `{{ ... }}` interpolation.
pub fn has_interpolation(text: &str) -> bool {
    text.find("{{")
        .is_some_and(|open| text[open + 2..].contains("}}"))
}

/// The inner expression of a text made of exactly one bare interpolation.
///
/// `"{{ user.name }}"` yields `Some("user.name")`; surrounding text or a
/// second interpolation yields `None`.
pub fn single_interpolation(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.is_empty() || inner.contains('{') {
        return None;
    }
    let inner = inner.trim();
    (!inner.is_empty()).then_some(inner)
}

/// Value of an attribute without interpolation: a boolean literal, else a
/// number when the whole text is numeric, else the text itself.
pub fn parse_static(text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    let trimmed = text.trim();
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::Number(integer.into());
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

/// Split `click: onClick(); hover: track($event)` into `(event, expression)` pairs.
///
/// Line breaks count as spaces and empty segments are skipped.
pub fn parse_event_statements(text: &str) -> Result<Vec<(String, String)>> {
    text.replace(['\r', '\n'], " ")
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(parse_event_statement)
        .collect()
}

fn parse_event_statement(statement: &str) -> Result<(String, String)> {
    let invalid = || BindingError::InvalidEventStatement {
        statement: statement.to_string(),
    };

    let (name, expression) = statement.split_once(':').ok_or_else(invalid)?;
    let name = name.trim();
    let expression = expression.trim();

    let is_word = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !is_word || expression.is_empty() {
        return Err(invalid());
    }
    Ok((name.to_string(), expression.to_string()))
}

/// Whitespace separated action descriptors.
pub fn split_descriptors(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}
