//! Formatting helpers for CLI output.

use std::time::Duration;

use crate::agent::FetchOutcome;

/// Formats a byte count as a human-readable string (B, KB, MB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats an elapsed time with millisecond precision below a second.
#[must_use]
pub fn format_elapsed(d: Duration) -> String {
    if d.as_secs() >= 1 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// One-line summary of a fetch: status, reason, source, and body size.
#[must_use]
pub fn describe_outcome(outcome: &FetchOutcome) -> String {
    let response = &outcome.response;
    let reason = if response.status_text.is_empty() {
        String::new()
    } else {
        format!(" {}", response.status_text)
    };
    format!(
        "{}{reason} from {} ({})",
        response.status,
        outcome.source,
        format_bytes(response.body.len() as u64)
    )
}

/// One-line summary of a store for listings; the current store is starred.
#[must_use]
pub fn describe_store(name: &str, entries: usize, current: bool) -> String {
    let marker = if current { '*' } else { ' ' };
    let noun = if entries == 1 { "entry" } else { "entries" };
    format!("{marker} {name} ({entries} {noun})")
}
