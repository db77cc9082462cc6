//! Plain-text extraction from Jira field values
//!
//! Jira fields arrive as plain strings, rendered HTML, or structured objects (users,
//! statuses, priorities). Everything here reduces them to trimmed text.

use chrono::{DateTime, Utc};
use scraper::Html;
use serde_json::Value;

/// Reduces a field value to plain text
///
/// # Rules
///
/// - `null` → empty string
/// - strings are trimmed
/// - objects: `rendered` HTML converted to text, else `name`, `displayName`, `value`,
///   else all string members joined by spaces
/// - other scalars use their JSON representation
pub fn extract_text(field: &Value) -> String {
    match field {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => {
            if let Some(rendered) = map.get("rendered").and_then(Value::as_str) {
                return html_to_text(rendered);
            }

            for key in ["name", "displayName", "value"] {
                if let Some(value) = map.get(key) {
                    return scalar_to_string(value);
                }
            }

            map.values()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string()
        }
        other => other.to_string().trim().to_string(),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Converts an HTML fragment to text with whitespace collapsed
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&text)
}

/// Replaces every run of whitespace with a single space and trims the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Formats a Jira timestamp as `YYYY-MM-DD HH:MM:SS UTC`
///
/// Accepts RFC 3339 and Jira's `2024-01-15T10:30:00.000+0000` form. Anything else is
/// returned unchanged; empty input yields `None`.
pub fn format_timestamp(timestamp: Option<&str>) -> Option<String> {
    let timestamp = timestamp?.trim();
    if timestamp.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(timestamp)
        .or_else(|_| DateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f%z"));

    match parsed {
        Ok(dt) => Some(
            dt.with_timezone(&Utc)
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string(),
        ),
        Err(_) => Some(timestamp.to_string()),
    }
}

/// Returns at most the first `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
