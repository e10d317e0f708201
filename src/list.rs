use crate::cache::ColumnCache;
use crate::entry::{AlignmentEntry, EntryStatus};
use crate::error::{PileupError, Result};
use std::collections::VecDeque;

/// Waiting and active alignment entries plus the statistics gathered while
/// filling them.
#[derive(Debug, Default)]
pub(crate) struct AlignmentList {
    /// Sorted by entry ordering; not yet reached by the cursor.
    pub waiting: VecDeque<AlignmentEntry>,
    /// Entries covering the cursor position, in promotion order.
    pub active: Vec<AlignmentEntry>,
    /// Alignments read from the store so far.
    pub observed: u64,
    /// Longest projection seen so far.
    pub max_ref_len: i64,
}

impl AlignmentList {
    pub fn depth(&self) -> usize {
        self.active.len()
    }

    pub fn avail(&self) -> usize {
        self.waiting.len()
    }

    pub fn observe(&mut self, ref_len: i64) {
        self.observed += 1;
        if ref_len > self.max_ref_len {
            self.max_ref_len = ref_len;
        }
    }

    pub fn push_waiting(&mut self, entry: AlignmentEntry) -> Result<()> {
        self.waiting
            .try_reserve(1)
            .map_err(|_| PileupError::OutOfMemory("alignment entries"))?;
        self.waiting.push_back(entry);
        Ok(())
    }

    pub fn take_waiting(&mut self) -> VecDeque<AlignmentEntry> {
        std::mem::take(&mut self.waiting)
    }

    /// Put `tail` after the current waiting entries.
    pub fn append_waiting(&mut self, mut tail: VecDeque<AlignmentEntry>) {
        if self.waiting.is_empty() {
            self.waiting = tail;
        } else {
            self.waiting.append(&mut tail);
        }
    }

    /// Put `head` before the current waiting entries.
    pub fn prepend_waiting(&mut self, mut head: VecDeque<AlignmentEntry>) {
        head.append(&mut self.waiting);
        self.waiting = head;
    }

    pub fn sort_waiting(&mut self) {
        self.waiting.make_contiguous().sort();
    }

    /// Stable two-pointer merge of `primary` with the current waiting list,
    /// both already sorted; the result replaces `waiting`.
    pub fn merge_waiting(&mut self, primary: VecDeque<AlignmentEntry>) -> Result<()> {
        let secondary = self.take_waiting();
        if primary.is_empty() {
            self.waiting = secondary;
            return Ok(());
        }
        if secondary.is_empty() {
            self.waiting = primary;
            return Ok(());
        }

        let mut merged = VecDeque::new();
        merged
            .try_reserve(primary.len() + secondary.len())
            .map_err(|_| PileupError::OutOfMemory("alignment entries"))?;
        let mut primary = primary.into_iter().peekable();
        let mut secondary = secondary.into_iter().peekable();
        loop {
            let take_primary = match (primary.peek(), secondary.peek()) {
                (Some(p), Some(s)) => p < s,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_primary { primary.next() } else { secondary.next() };
            merged.extend(next);
        }
        self.waiting = merged;
        Ok(())
    }

    /// Promote the prefix of `waiting` that starts at or before `pos`.
    pub fn activate(&mut self, pos: i64) -> usize {
        let count = self.waiting.iter().take_while(|e| e.zstart <= pos).count();
        for entry in self.waiting.drain(..count) {
            tracing::trace!(
                row_id = entry.row_id,
                zstart = entry.zstart,
                xend = entry.xend,
                "activate"
            );
            self.active.push(entry);
        }
        count
    }

    /// Flush ephemeral cells, then evict entries ending at `pos` or fully
    /// decoded, returning their pinned bytes to the cache.
    pub fn retire(&mut self, pos: i64, cache: &mut ColumnCache) {
        self.active.retain_mut(|entry| {
            if entry.temporary {
                entry.drop_ephemeral();
                entry.temporary = false;
            }
            if entry.xend == pos || entry.status == EntryStatus::Done {
                tracing::trace!(row_id = entry.row_id, xend = entry.xend, "retire");
                cache.release(entry);
                return false;
            }
            true
        });
    }

    /// Release every entry in both lists.
    pub fn clear(&mut self, cache: &mut ColumnCache) {
        for entry in self.active.iter_mut().chain(self.waiting.iter_mut()) {
            cache.release(entry);
        }
        self.active.clear();
        self.waiting.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(row_id: i64, secondary: bool, zstart: i64, len: u32) -> AlignmentEntry {
        AlignmentEntry::new(row_id, secondary, zstart, len)
    }

    fn keys(list: &AlignmentList) -> Vec<(i64, bool)> {
        list.waiting.iter().map(|e| (e.row_id, e.secondary)).collect()
    }

    #[test]
    fn merge_interleaves_categories() {
        let mut list = AlignmentList::default();
        list.push_waiting(entry(1, true, 5, 10)).unwrap();
        list.push_waiting(entry(2, true, 20, 10)).unwrap();
        let primary: VecDeque<_> = [entry(7, false, 5, 10), entry(8, false, 10, 3)].into();
        list.merge_waiting(primary).unwrap();
        assert_eq!(keys(&list), vec![(7, false), (1, true), (8, false), (2, true)]);
    }

    #[test]
    fn ordering_prefers_longer_projection() {
        let mut list = AlignmentList::default();
        list.push_waiting(entry(1, false, 5, 3)).unwrap();
        list.push_waiting(entry(2, false, 5, 9)).unwrap();
        list.push_waiting(entry(3, false, 1, 2)).unwrap();
        list.sort_waiting();
        assert_eq!(keys(&list), vec![(3, false), (2, false), (1, false)]);
    }

    #[test]
    fn activate_takes_prefix_only() {
        let mut list = AlignmentList::default();
        for (row, start) in [(1, 0), (2, 3), (3, 3), (4, 7)] {
            list.push_waiting(entry(row, false, start, 5)).unwrap();
        }
        assert_eq!(list.activate(3), 3);
        assert_eq!(list.depth(), 3);
        assert_eq!(list.avail(), 1);

        let mut cache = ColumnCache::new(1024);
        list.retire(5, &mut cache);
        assert_eq!(list.depth(), 2);
    }
}
