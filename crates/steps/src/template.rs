//! `{{path}}` placeholder substitution.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::condition::Lookup;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("placeholder pattern is valid"));

/// Replace each `{{path}}` in `template` with the value found at `path`.
///
/// Strings are inserted verbatim, other values as compact JSON. Placeholders
/// whose path does not resolve are left untouched.
pub fn render<L: Lookup + ?Sized>(template: &str, data: &L) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| match data.lookup(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render every string inside `value`, recursing through objects and arrays.
pub fn render_value<L: Lookup + ?Sized>(value: &Value, data: &L) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, data)),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, data)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, data)).collect()),
        other => other.clone(),
    }
}
