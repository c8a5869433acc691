//! Track entries and the per-guild lists that hold them.
//!
//! - [`Entry`]: immutable track reference as submitted by a caller
//! - [`QueueEntry`]: an entry tagged with its session-unique [`Aid`]
//! - [`Queue`]: ordered upcoming entries
//! - [`History`]: bounded, most-recent-first list of played entries

mod history;
mod queue;

pub use history::History;
pub use queue::{Queue, QueueMove, Whence};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::now_millis;

/// Opaque track reference understood by the audio engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Eid(pub String);

impl Eid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Eid {
    fn from(eid: &str) -> Self {
        Self(eid.to_string())
    }
}

/// Application entry id.
///
/// Generated at enqueue time from a per-session counter and never reused
/// within the lifetime of that session, even after the entry leaves the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aid(pub u64);

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A playable track reference as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub eid: Eid,
    /// Unix timestamp in milliseconds.
    pub added_at: u64,
}

impl Entry {
    /// Creates an entry stamped with the current time.
    pub fn new(eid: Eid) -> Self {
        Self {
            eid,
            added_at: now_millis(),
        }
    }
}

/// An [`Entry`] bound to its application entry id.
///
/// The same eid may appear several times in a queue, each time under its own aid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub aid: Aid,
    #[serde(flatten)]
    pub entry: Entry,
}

impl QueueEntry {
    pub fn eid(&self) -> &Eid {
        &self.entry.eid
    }
}

impl fmt::Display for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EID({}) #{}", self.entry.eid, self.aid)
    }
}

/// Returns one 0-based page of entries.
///
/// Out-of-range pages and a zero page size yield an empty page.
pub(crate) fn page_of<'a, I>(entries: I, page: usize, entries_per_page: usize) -> Vec<QueueEntry>
where
    I: Iterator<Item = &'a QueueEntry>,
{
    if entries_per_page == 0 {
        return Vec::new();
    }
    let Some(start) = page.checked_mul(entries_per_page) else {
        return Vec::new();
    };
    entries.skip(start).take(entries_per_page).cloned().collect()
}
