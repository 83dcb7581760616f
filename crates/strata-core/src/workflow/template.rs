//! Instruction template rendering.
//!
//! Instructions reference context values with `{{ key }}` placeholders.
//! Dotted paths (`{{ fetch.url }}`) walk into JSON objects. Rendering is
//! strict: a placeholder that does not resolve is an error rather than an
//! empty substitution.

use serde_json::Value;
use strata_types::workflow::Context;

/// Errors from rendering an instruction template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// A placeholder references a key absent from the context.
    #[error("template references missing context key '{0}'")]
    MissingKey(String),

    /// A `{{` with no closing `}}`, at the given byte offset.
    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),
}

/// Flat merge of the running context and step results.
///
/// Step results win when a key exists in both.
pub fn merge_context(context: &Context, step_results: &Context) -> Context {
    let mut merged = context.clone();
    for (key, value) in step_results {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Substitute every `{{ key }}` placeholder in `template` from `context`.
pub fn render_instruction(template: &str, context: &Context) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);

        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(RenderError::Unterminated(offset + start));
        };

        let path = after_open[..end].trim();
        let value = lookup(context, path).ok_or_else(|| RenderError::MissingKey(path.to_string()))?;
        out.push_str(&value_to_string(value));

        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Resolve a dotted path against the context.
///
/// The full path is tried as a literal key first, so keys that contain dots
/// still resolve.
fn lookup<'a>(context: &'a Context, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    if let Some(value) = context.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Convert a JSON value to its display string.
///
/// Strings are returned without quotes; other types use their compact JSON
/// representation.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
