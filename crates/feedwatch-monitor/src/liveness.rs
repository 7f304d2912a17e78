//! Per-source last-seen timestamps.
//!
//! Any number of producers write concurrently; the checker reads. Each entry
//! only ever moves forward: an event carrying an older timestamp than the one
//! already stored is ignored, so out-of-order delivery cannot make a source
//! look staler than it is.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Concurrent map of source id to the newest event timestamp seen for it.
#[derive(Debug, Default)]
pub struct LivenessTable {
    entries: DashMap<String, DateTime<Utc>>,
}

impl LivenessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event for `source` at `timestamp`.
    ///
    /// Returns true when the stored timestamp advanced (or the source is new).
    pub fn record(&self, source: &str, timestamp: DateTime<Utc>) -> bool {
        if let Some(mut last) = self.entries.get_mut(source) {
            return advance(&mut last, timestamp);
        }

        match self.entries.entry(source.to_owned()) {
            Entry::Occupied(mut entry) => advance(entry.get_mut(), timestamp),
            Entry::Vacant(entry) => {
                entry.insert(timestamp);
                true
            }
        }
    }

    /// Whether at least one source reported within `timeout` of `now`.
    ///
    /// An empty table has no live source.
    pub fn has_live_source(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let timeout = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
        self.entries
            .iter()
            .any(|entry| now.signed_duration_since(*entry.value()) < timeout)
    }

    /// Last timestamp recorded for `source`.
    pub fn last_seen(&self, source: &str) -> Option<DateTime<Utc>> {
        self.entries.get(source).map(|entry| *entry.value())
    }

    /// Newest timestamp across all sources.
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.entries.iter().map(|entry| *entry.value()).max()
    }

    /// Number of sources ever seen.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn advance(slot: &mut DateTime<Utc>, timestamp: DateTime<Utc>) -> bool {
    if timestamp > *slot {
        *slot = timestamp;
        true
    } else {
        false
    }
}
