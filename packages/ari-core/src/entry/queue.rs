//! Ordered queue of upcoming entries.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::{page_of, Aid, Entry, QueueEntry};

/// How the index passed to [`Queue::move_entry`] is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Whence {
    /// Absolute position counted from the queue head.
    #[default]
    #[serde(alias = "absolute")]
    Start,
    /// Relative to the now-playing entry, which occupies slot 0.
    /// `1` is the slot immediately after it, i.e. the queue head.
    #[serde(alias = "relative")]
    Current,
    /// Counted back from the tail; `0` is the last position.
    End,
}

/// Outcome of a successful move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMove {
    pub entry: QueueEntry,
    pub from: usize,
    pub to: usize,
}

/// Per-guild queue of [`QueueEntry`] values in play order.
///
/// Owns the aid counter for its session: aids are handed out monotonically
/// starting at 1 and never reused.
#[derive(Debug)]
pub struct Queue {
    entries: VecDeque<QueueEntry>,
    next_aid: u64,
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl Queue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            next_aid: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn front(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// The aid the next call to [`Queue::enqueue`] will assign.
    pub fn peek_next_aid(&self) -> Aid {
        Aid(self.next_aid)
    }

    /// Appends an entry under a freshly generated aid.
    ///
    /// Returns the new queue entry and the index it landed at.
    pub fn enqueue(&mut self, entry: Entry) -> (QueueEntry, usize) {
        let queued = QueueEntry {
            aid: Aid(self.next_aid),
            entry,
        };
        self.next_aid += 1;
        self.entries.push_back(queued.clone());
        (queued, self.entries.len() - 1)
    }

    /// Puts an already-identified entry back at the head.
    pub fn push_front(&mut self, entry: QueueEntry) {
        self.entries.push_front(entry);
    }

    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub fn position_of(&self, aid: Aid) -> Option<usize> {
        self.entries.iter().position(|e| e.aid == aid)
    }

    /// Removes the entry with the given aid, returning it with its former index.
    pub fn dequeue(&mut self, aid: Aid) -> Option<(usize, QueueEntry)> {
        let index = self.position_of(aid)?;
        self.entries.remove(index).map(|entry| (index, entry))
    }

    /// Resolves a caller index to an absolute, clamped queue position.
    ///
    /// Returns `None` when the queue is empty.
    pub fn resolve_index(&self, index: i64, whence: Whence) -> Option<usize> {
        let last = self.entries.len().checked_sub(1)? as i64;
        let absolute = match whence {
            Whence::Start => index,
            Whence::Current => index.saturating_sub(1),
            Whence::End => last.saturating_sub(index),
        };
        Some(absolute.clamp(0, last) as usize)
    }

    /// Relocates the addressed entry.
    ///
    /// Returns `None` if the queue is empty or the aid is unknown.
    pub fn move_entry(&mut self, aid: Aid, index: i64, whence: Whence) -> Option<QueueMove> {
        let to = self.resolve_index(index, whence)?;
        let from = self.position_of(aid)?;
        if from != to {
            let entry = self.entries.remove(from)?;
            self.entries.insert(to, entry);
        }
        Some(QueueMove {
            entry: self.entries[to].clone(),
            from,
            to,
        })
    }

    /// Removes every entry, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn shuffle(&mut self) {
        self.entries
            .make_contiguous()
            .shuffle(&mut rand::thread_rng());
    }

    /// Returns one 0-based page of the queue.
    pub fn page(&self, page: usize, entries_per_page: usize) -> Vec<QueueEntry> {
        page_of(self.entries.iter(), page, entries_per_page)
    }
}
