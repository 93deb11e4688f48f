//! Retry counter shown in the progress header.

use regex::Regex;
use std::sync::LazyLock;

static RETRY_COUNTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(retrying to get status #(\d+)\)$").unwrap());

/// Append a retry counter to `header`, or increment the one already there.
pub fn add_retry_counter(header: &str) -> String {
    let (base, count) = match RETRY_COUNTER.captures(header) {
        Some(caps) => {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(header.len());
            let count: u64 = caps[1].parse().unwrap_or(0);
            (&header[..start], count.saturating_add(1))
        }
        None => (header, 1),
    };

    if base.is_empty() {
        format!("(retrying to get status #{})", count)
    } else {
        format!("{} (retrying to get status #{})", base, count)
    }
}

/// Remove the retry counter from `header`.
pub fn clear_retry_counter(header: &str) -> String {
    RETRY_COUNTER.replace(header, "").into_owned()
}

/// Whether `header` currently shows a retry counter.
pub fn has_retry_counter(header: &str) -> bool {
    RETRY_COUNTER.is_match(header)
}
