//! Agent-side checks applied before a call reaches the executor.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Value, json};

use crate::protocol::Action;

/// URL schemes never opened by the agent.
pub const BLOCKED_SCHEMES: &[&str] = &["javascript", "file", "data", "vbscript"];

/// Returns the refused scheme if any URL parameter of `action` uses one.
///
/// Only `navigate`, `newTab` and `openUrlsInGroup` open URLs.
#[must_use]
pub fn blocked_scheme(action: Action, params: &Value) -> Option<String> {
    match action {
        Action::Navigate | Action::NewTab => params
            .get("url")
            .and_then(Value::as_str)
            .and_then(scheme_if_blocked),
        Action::OpenUrlsInGroup => params
            .get("urls")
            .and_then(Value::as_array)?
            .iter()
            .filter_map(Value::as_str)
            .find_map(scheme_if_blocked),
        _ => None,
    }
}

fn scheme_if_blocked(url: &str) -> Option<String> {
    let scheme = url.split(':').next()?.trim().to_ascii_lowercase();
    BLOCKED_SCHEMES.contains(&scheme.as_str()).then_some(scheme)
}

/// Failure message for a refused URL.
#[must_use]
pub fn blocked_message(scheme: &str) -> String {
    format!("Blocked URL scheme: {scheme}. Only http/https URLs are allowed.")
}

/// Result of the locally answered `ping` action.
#[must_use]
pub fn pong() -> Value {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    json!({ "pong": true, "timestamp": timestamp })
}
