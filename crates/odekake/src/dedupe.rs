use std::collections::HashSet;

use crate::schema::Event;

/// Keeps the first event seen for each `source_url`, in first-seen order.
///
/// Events without a `source_url` are dropped.
pub fn dedupe_events_by_source_url(events: Vec<Event>) -> Vec<Event> {
    let total = events.len();
    let mut seen = HashSet::new();
    let kept: Vec<Event> = events
        .into_iter()
        .filter(|event| match &event.source_url {
            Some(url) => seen.insert(url.clone()),
            None => false,
        })
        .collect();

    if kept.len() < total {
        log::debug!("Deduplicated {} event(s) down to {}", total, kept.len());
    }
    kept
}
