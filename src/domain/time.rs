//! Relative and wall-clock time formatting for status displays.

use chrono::{DateTime, Local, Utc};

/// Renders the age of `then` relative to `now`.
///
/// Uses whole units and drops a zero remainder: `just now`, `5m ago`,
/// `2h ago`, `2h 10m ago`, `3d ago`, `3d 4h ago`. Future timestamps render
/// as `just now`.
#[must_use]
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes().max(0);
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        let rem = hours % 24;
        return if rem > 0 {
            format!("{days}d {rem}h ago")
        } else {
            format!("{days}d ago")
        };
    }
    if hours > 0 {
        let rem = minutes % 60;
        return if rem > 0 {
            format!("{hours}h {rem}m ago")
        } else {
            format!("{hours}h ago")
        };
    }
    if minutes > 0 {
        return format!("{minutes}m ago");
    }
    "just now".to_string()
}

/// Renders `ts` as `HH:MM` in the local timezone.
#[must_use]
pub fn clock_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M").to_string()
}
