//! Client-facing protocol adapters.
//!
//! Both adapters translate their own requests into
//! [`Registry::submit`](crate::transport::Registry::submit) calls and never
//! talk to the agent socket directly.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `stdio` | MCP over newline-delimited JSON-RPC 2.0 |
//! | `http` | REST routes on the relay port |

// ============================================================================
// Submodules
// ============================================================================

/// REST adapter.
pub mod http;

/// MCP stdio adapter.
pub mod stdio;

// ============================================================================
// Re-exports
// ============================================================================

pub use stdio::{LineBuffer, StdioAdapter};

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

// ============================================================================
// Local Delay
// ============================================================================

/// Delay used when no usable `time` is given.
pub const DEFAULT_WAIT_SECS: f64 = 1.0;

/// Resolves a requested delay in seconds, clamped to `[0, max]`.
///
/// Accepts numbers and numeric strings. Anything else yields the default.
#[must_use]
pub fn wait_seconds(time: Option<&Value>, max: Duration) -> f64 {
    let requested = match time {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|secs| secs.is_finite())
    .unwrap_or(DEFAULT_WAIT_SECS);

    requested.clamp(0.0, max.as_secs_f64())
}

/// Sleeps for the requested delay and returns `{waited: seconds}`.
pub async fn local_wait(time: Option<&Value>, max: Duration) -> Value {
    let secs = wait_seconds(time, max);
    debug!(secs, "Local wait");
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    json!({ "waited": number(secs) })
}

/// Renders whole seconds as an integer.
fn number(secs: f64) -> Value {
    if secs.fract() == 0.0 {
        json!(secs as u64)
    } else {
        json!(secs)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: Duration = Duration::from_secs(300);

    #[test]
    fn test_wait_clamps() {
        assert_eq!(wait_seconds(Some(&json!(5)), MAX), 5.0);
        assert_eq!(wait_seconds(Some(&json!(1_000)), MAX), 300.0);
        assert_eq!(wait_seconds(Some(&json!(-3)), MAX), 0.0);
        assert_eq!(wait_seconds(Some(&json!("2.5")), MAX), 2.5);
    }

    #[test]
    fn test_wait_defaults() {
        assert_eq!(wait_seconds(None, MAX), DEFAULT_WAIT_SECS);
        assert_eq!(wait_seconds(Some(&json!("soon")), MAX), DEFAULT_WAIT_SECS);
        assert_eq!(wait_seconds(Some(&json!(null)), MAX), DEFAULT_WAIT_SECS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_wait_sleeps() {
        let start = tokio::time::Instant::now();
        let result = local_wait(Some(&json!(2)), MAX).await;

        assert_eq!(result, json!({ "waited": 2 }));
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
