use serde::Serialize;

use crate::types::LiveEvent;

/// RFC 3339 timestamp for event lines.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Emit a live event as a single JSON line to stdout.
pub fn report_event(event: &LiveEvent) {
    if let Ok(json) = serde_json::to_string(event) {
        println!("{json}");
    }
}

/// Emit a one-shot command result as pretty-printed JSON to stdout.
pub fn report_value<T: Serialize>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{json}");
    }
}
