//! Bounded list of previously played entries.

use std::collections::VecDeque;

use super::{page_of, Aid, QueueEntry};

/// Most-recent-first list of played entries, capped at `max_size`.
///
/// Entries keep the aid they were queued under so that stepping back
/// restores the same queue identity. Overflow evicts silently from the back.
#[derive(Debug)]
pub struct History {
    entries: VecDeque<QueueEntry>,
    max_size: usize,
}

impl History {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn front(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// Adds an entry at the front, returning the evicted tail entries.
    pub fn add(&mut self, entry: QueueEntry) -> Vec<QueueEntry> {
        self.entries.push_front(entry);
        let mut evicted = Vec::new();
        while self.entries.len() > self.max_size {
            if let Some(oldest) = self.entries.pop_back() {
                evicted.push(oldest);
            }
        }
        evicted
    }

    /// Removes and returns the most recent entry.
    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Removes the entry at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<QueueEntry> {
        self.entries.remove(index)
    }

    /// Removes the entry with the given aid, returning it with its former index.
    pub fn remove(&mut self, aid: Aid) -> Option<(usize, QueueEntry)> {
        let index = self.entries.iter().position(|e| e.aid == aid)?;
        self.entries.remove(index).map(|entry| (index, entry))
    }

    /// Returns one 0-based page, most recent first.
    pub fn page(&self, page: usize, entries_per_page: usize) -> Vec<QueueEntry> {
        page_of(self.entries.iter(), page, entries_per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Eid, Entry};

    fn queued(aid: u64) -> QueueEntry {
        QueueEntry {
            aid: Aid(aid),
            entry: Entry::new(Eid(format!("track-{aid}"))),
        }
    }

    #[test]
    fn add_puts_most_recent_first() {
        let mut history = History::new(10);
        history.add(queued(1));
        history.add(queued(2));
        assert_eq!(history.front().map(|e| e.aid), Some(Aid(2)));
        assert_eq!(history.page(0, 10)[1].aid, Aid(1));
    }

    #[test]
    fn never_exceeds_max_size() {
        let mut history = History::new(3);
        for i in 1..=10 {
            history.add(queued(i));
            assert!(history.len() <= 3);
        }
        let aids: Vec<_> = history.iter().map(|e| e.aid.0).collect();
        assert_eq!(aids, vec![10, 9, 8]);
    }

    #[test]
    fn add_reports_evicted_tail() {
        let mut history = History::new(1);
        assert!(history.add(queued(1)).is_empty());
        let evicted = history.add(queued(2));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].aid, Aid(1));
    }

    #[test]
    fn remove_by_aid_and_index() {
        let mut history = History::new(5);
        history.add(queued(1));
        history.add(queued(2));
        history.add(queued(3));

        assert_eq!(history.remove(Aid(2)).map(|(i, _)| i), Some(1));
        assert!(history.remove(Aid(2)).is_none());
        assert_eq!(history.remove_at(0).map(|e| e.aid), Some(Aid(3)));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn pop_front_returns_most_recent() {
        let mut history = History::new(5);
        assert!(history.pop_front().is_none());
        history.add(queued(1));
        history.add(queued(2));
        assert_eq!(history.pop_front().map(|e| e.aid), Some(Aid(2)));
    }
}
