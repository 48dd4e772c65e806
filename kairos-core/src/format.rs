use chrono::{DateTime, Utc};

/// Coarse "time ago" text, e.g. `12 sec ago`, `3 min ago`, `2 d ago`
pub fn relative_time(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    let hours = secs / 3600;
    if secs < 60 {
        format!("{} sec ago", secs)
    } else if secs < 3600 {
        format!("{} min ago", secs / 60)
    } else if hours < 24 {
        format!("{} h ago", hours)
    } else if hours < 24 * 30 {
        format!("{} d ago", hours / 24)
    } else if hours < 24 * 30 * 12 {
        format!("{} mon ago", hours / (24 * 30))
    } else {
        format!("{} years ago", hours / (24 * 30 * 12))
    }
}

/// Compact counter text: `999`, `1.2K`, `1.5M`
pub fn format_count(n: u64) -> String {
    if n > 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n > 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}
