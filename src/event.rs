use crate::entry::{AlignmentEntry, EntryStatus};
use crate::error::{PileupError, Result};
use crate::pileup::Pileup;
use crate::store::{AlignmentStore, Blob, Category, Column, ReferenceSource};
use crate::types::RowId;
use std::fmt;
use std::sync::Arc;

const QUALITY_OFFSET: u8 = 33;

/// Position of the event iteration within the active entries.
#[derive(Debug, Default)]
pub(crate) struct EventCursor {
    index: usize,
    seen_first: bool,
}

impl EventCursor {
    pub fn restart(&mut self) {
        self.index = 0;
        self.seen_first = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Match,
    Mismatch,
    Deletion,
}

/// Classification of one alignment at the current reference position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventType {
    pub kind: EventKind,
    /// An insertion precedes this base.
    pub insertion: bool,
    pub minus_strand: bool,
    /// First base of the projection.
    pub start: bool,
    /// Last base of the projection.
    pub stop: bool,
}

impl EventType {
    pub const MATCH: u32 = 0;
    pub const MISMATCH: u32 = 1;
    pub const DELETION: u32 = 2;
    pub const INSERTION: u32 = 0x08;
    pub const MINUS_STRAND: u32 = 0x20;
    pub const STOP: u32 = 0x40;
    pub const START: u32 = 0x80;

    /// Combined bit value, as exchanged with NGS-style consumers.
    pub fn bits(&self) -> u32 {
        let mut bits = match self.kind {
            EventKind::Match => Self::MATCH,
            EventKind::Mismatch => Self::MISMATCH,
            EventKind::Deletion => Self::DELETION,
        };
        if self.insertion {
            bits |= Self::INSERTION;
        }
        if self.minus_strand {
            bits |= Self::MINUS_STRAND;
        }
        if self.stop {
            bits |= Self::STOP;
        }
        if self.start {
            bits |= Self::START;
        }
        bits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndelType {
    Normal = 0,
    IntronPlus = 1,
    IntronMinus = 2,
    IntronUnknown = 3,
    ReadOverlap = 4,
    ReadGap = 5,
}

/// Category plus row id; displays as `PA.17` / `SA.3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignmentId {
    pub category: Category,
    pub row_id: RowId,
}

impl fmt::Display for AlignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category.label(), self.row_id)
    }
}

fn byte_cell(blob: &Option<Arc<Blob>>, row: RowId) -> &[u8] {
    blob.as_deref().and_then(|b| b.bytes(row)).unwrap_or_default()
}

fn int_cell(blob: &Option<Arc<Blob>>, row: RowId) -> &[i32] {
    blob.as_deref().and_then(|b| b.ints(row)).unwrap_or_default()
}

fn flag(cell: &[u8], i: u32) -> bool {
    cell.get(i as usize).is_some_and(|&b| b != 0)
}

fn count_flags(cell: &[u8], from: u32, to: u32) -> u32 {
    let (from, to) = (from as usize, (to as usize).min(cell.len()));
    if from >= to {
        return 0;
    }
    cell[from..to].iter().filter(|&&b| b != 0).count() as u32
}

/// Skip edit offsets ahead of the first aligned base: leading soft clips
/// (and insertions) are consumed, a leading deletion is armed.
fn init_entry(entry: &mut AlignmentEntry) {
    let (hm, hro, ro) = (
        entry.blob(Column::HasMismatch),
        entry.blob(Column::HasRefOffset),
        entry.blob(Column::RefOffset),
    );
    let row = entry.row_id;
    let (hm, hro, ro) = (byte_cell(&hm, row), byte_cell(&hro, row), int_cell(&ro, row));
    if ro.is_empty() {
        return;
    }
    let len = hro.len() as u32;
    let projection_len = entry.projection_len().max(0) as u32;
    let next = &mut entry.next;

    while flag(hro, next.seq_idx) {
        match ro.get(next.ref_offset_idx as usize) {
            Some(&offset) if offset < 0 => {
                let end = (next.seq_idx + offset.unsigned_abs()).min(len);
                next.mismatch_idx += count_flags(hm, next.seq_idx, end);
                next.seq_idx = end;
                next.ref_offset_idx += 1;
            }
            _ => break,
        }
    }
    if flag(hro, next.seq_idx)
        && let Some(&offset) = ro.get(next.ref_offset_idx as usize)
        && offset > 0
    {
        next.del_count = (offset as u32).min(projection_len);
        next.ref_offset_idx += 1;
    }
}

/// Bring `entry.current` to reference position `ref_zpos`.
fn focus(entry: &mut AlignmentEntry, ref_zpos: i64) {
    let (hm, hro, ro) = (
        entry.blob(Column::HasMismatch),
        entry.blob(Column::HasRefOffset),
        entry.blob(Column::RefOffset),
    );
    let row = entry.row_id;
    let (hm, hro, ro) = (byte_cell(&hm, row), byte_cell(&hro, row), int_cell(&ro, row));
    let len = hro.len() as u32;
    let target = (ref_zpos - entry.zstart).max(0) as u32;

    loop {
        let plus = if entry.status == EntryStatus::Initial { 0 } else { 1 };
        entry.next.mismatch = 0;

        while target + plus > entry.next.zstart_adjust {
            entry.current = entry.next;
            let mut ins = 0;
            let next = &mut entry.next;

            if next.del_count != 0 {
                next.del_count -= 1;
            } else {
                let prior = next.seq_idx;
                next.seq_idx += 1;
                next.mismatch_idx += flag(hm, prior) as u32;
                if next.seq_idx >= len {
                    next.ins_count = 0;
                    entry.status = EntryStatus::Done;
                    return;
                }
                // adjacent insertion runs collapse into one
                while flag(hro, next.seq_idx) {
                    let Some(&offset) = ro.get(next.ref_offset_idx as usize) else {
                        break;
                    };
                    next.ref_offset_idx += 1;
                    if offset < 0 {
                        let n = offset.unsigned_abs().min(len - next.seq_idx);
                        ins += n;
                        next.mismatch_idx += count_flags(hm, next.seq_idx, next.seq_idx + n);
                        next.seq_idx += n;
                        if next.seq_idx >= len {
                            next.ins_count = ins;
                            entry.status = EntryStatus::Done;
                            return;
                        }
                    } else {
                        let remaining = entry.xend - (entry.zstart + next.zstart_adjust as i64);
                        next.del_count =
                            (next.del_count + offset as u32).min(remaining.max(0) as u32);
                        break;
                    }
                }
            }
            next.zstart_adjust += 1;
            next.ins_count = ins;
        }

        if entry.status != EntryStatus::Initial {
            return;
        }
        entry.status = EntryStatus::Valid;
    }
}

impl<R: ReferenceSource, S: AlignmentStore> Pileup<R, S> {
    /// Move to the next alignment covering the current position.
    ///
    /// Returns `Ok(false)` once every active alignment was visited.
    pub fn next_event(&mut self) -> Result<bool> {
        self.check_state()?;
        if !self.events.seen_first {
            self.events.seen_first = true;
            self.events.index = 0;
        } else if self.events.index < self.list.depth() {
            self.events.index += 1;
        }
        let index = self.events.index;
        if index >= self.list.depth() {
            return Ok(false);
        }
        let result = self.prepare_entry(index);
        self.fail_on_fatal(result)?;
        Ok(true)
    }

    /// Restart event iteration at the current position, decoding every
    /// active alignment from its beginning again.
    pub fn reset_events(&mut self) -> Result<()> {
        self.check_state()?;
        for entry in self.list.active.iter_mut() {
            entry.reset_decode();
        }
        self.events.restart();
        Ok(())
    }

    pub fn event_type(&mut self) -> Result<EventType> {
        let index = self.event_index()?;
        let result = self.classify(index);
        self.fail_on_fatal(result)
    }

    /// Read base at the current position, `-` inside a deletion.
    pub fn alignment_base(&mut self) -> Result<u8> {
        let index = self.event_index()?;
        let result = self.base_of(index);
        self.fail_on_fatal(result)
    }

    /// Phred+33 quality of the current base, `!` inside a deletion.
    pub fn alignment_quality(&mut self) -> Result<u8> {
        let index = self.event_index()?;
        let result = self.quality_of(index);
        self.fail_on_fatal(result)
    }

    /// Bases inserted immediately before the current base; empty if none.
    pub fn insertion_bases(&mut self) -> Result<Vec<u8>> {
        let index = self.event_index()?;
        let result = self.inserted_bases(index);
        self.fail_on_fatal(result)
    }

    pub fn insertion_qualities(&mut self) -> Result<Vec<u8>> {
        let index = self.event_index()?;
        let result = self.inserted_qualities(index);
        self.fail_on_fatal(result)
    }

    /// Deletion length inside a deletion; otherwise the run of following
    /// bases sharing the current match/mismatch class with no edit between.
    pub fn repeat_count(&self) -> Result<u32> {
        let index = self.event_index()?;
        let entry = &self.list.active[index];
        let current = entry.current;
        if current.del_count != 0 {
            return Ok(current.del_count);
        }
        let (hm, hro) = (entry.blob(Column::HasMismatch), entry.blob(Column::HasRefOffset));
        let (hm, hro) = (byte_cell(&hm, entry.row_id), byte_cell(&hro, entry.row_id));

        let limit = entry.xend - (entry.zstart + current.zstart_adjust as i64);
        let seq = current.seq_idx as usize;
        let class = hm.get(seq).copied().unwrap_or(0) != 0;
        let mut count = 1;
        while (count as i64) < limit {
            let i = seq + count as usize;
            match (hro.get(i), hm.get(i)) {
                (Some(&0), Some(&m)) if (m != 0) == class => count += 1,
                _ => break,
            }
        }
        Ok(count)
    }

    pub fn indel_type(&mut self) -> Result<IndelType> {
        let index = self.event_index()?;
        let result = self.classify_indel(index);
        self.fail_on_fatal(result)
    }

    pub fn mapping_quality(&mut self) -> Result<i32> {
        let index = self.event_index()?;
        let result = self.map_qual_of(index);
        self.fail_on_fatal(result)
    }

    pub fn alignment_id(&self) -> Result<AlignmentId> {
        let index = self.event_index()?;
        let entry = &self.list.active[index];
        Ok(AlignmentId {
            category: Category::from_secondary(entry.secondary),
            row_id: entry.row_id,
        })
    }

    /// Offset of the current base within the read.
    pub fn alignment_position(&self) -> Result<u32> {
        let index = self.event_index()?;
        Ok(self.list.active[index].current.seq_idx)
    }

    /// First reference position of the projection; negative for alignments
    /// wrapping the origin of a circular reference.
    pub fn first_alignment_position(&self) -> Result<i64> {
        let index = self.event_index()?;
        Ok(self.list.active[index].zstart)
    }

    pub fn last_alignment_position(&self) -> Result<i64> {
        let index = self.event_index()?;
        Ok(self.list.active[index].xend - 1)
    }

    fn event_index(&self) -> Result<usize> {
        self.check_state()?;
        if !self.events.seen_first {
            return Err(PileupError::InvalidState("event accessed before next_event()"));
        }
        if self.events.index >= self.list.depth() {
            return Err(PileupError::Exhausted("events"));
        }
        Ok(self.events.index)
    }

    fn load_cell(&mut self, index: usize, column: Column) -> Result<bool> {
        let entry = &mut self.list.active[index];
        let Some(cursor) = self.gatherer.cursor_mut(entry.secondary) else {
            return Err(PileupError::InvalidState("alignment category is closed"));
        };
        self.cache.load(entry, cursor, &self.store, column)
    }

    fn load_required(&mut self, index: usize, column: Column) -> Result<()> {
        let entry = &mut self.list.active[index];
        let Some(cursor) = self.gatherer.cursor_mut(entry.secondary) else {
            return Err(PileupError::InvalidState("alignment category is closed"));
        };
        self.cache.load_required(entry, cursor, &self.store, column)
    }

    fn prepare_entry(&mut self, index: usize) -> Result<()> {
        for column in [Column::HasMismatch, Column::RefOffset, Column::HasRefOffset] {
            self.load_required(index, column)?;
        }
        let ref_zpos = self.ref_zpos;
        let entry = &mut self.list.active[index];
        if !entry.seen {
            init_entry(entry);
            entry.seen = true;
        }
        focus(entry, ref_zpos);
        Ok(())
    }

    fn classify(&mut self, index: usize) -> Result<EventType> {
        self.load_required(index, Column::RefOrientation)?;
        let ref_zpos = self.ref_zpos;
        let entry = &self.list.active[index];
        let current = entry.current;

        let kind = if current.del_count != 0 {
            EventKind::Deletion
        } else if flag(entry.bytes(Column::HasMismatch).unwrap_or_default(), current.seq_idx) {
            EventKind::Mismatch
        } else {
            EventKind::Match
        };
        let minus_strand = entry
            .bytes(Column::RefOrientation)
            .and_then(|cell| cell.first())
            .is_some_and(|&b| b != 0);

        Ok(EventType {
            kind,
            insertion: current.ins_count != 0,
            minus_strand,
            start: ref_zpos == entry.zstart,
            stop: ref_zpos + 1 == entry.xend || entry.status == EntryStatus::Done,
        })
    }

    fn base_of(&mut self, index: usize) -> Result<u8> {
        let entry = &self.list.active[index];
        let current = entry.current;
        if current.del_count != 0 {
            return Ok(b'-');
        }
        if !flag(entry.bytes(Column::HasMismatch).unwrap_or_default(), current.seq_idx) {
            return self.current_reference_base();
        }
        if current.mismatch != 0 {
            return Ok(current.mismatch);
        }

        self.load_required(index, Column::Mismatch)?;
        let entry = &mut self.list.active[index];
        let base = entry
            .bytes(Column::Mismatch)
            .and_then(|cell| cell.get(current.mismatch_idx as usize))
            .copied()
            .ok_or_else(|| {
                PileupError::storage(format!(
                    "mismatch cell of row {} has no base {}",
                    entry.row_id, current.mismatch_idx
                ))
            })?;
        entry.current.mismatch = base;
        Ok(base)
    }

    fn quality_of(&mut self, index: usize) -> Result<u8> {
        if self.list.active[index].current.del_count != 0 {
            return Ok(b'!');
        }
        self.load_required(index, Column::Quality)?;
        let entry = &self.list.active[index];
        let seq = entry.current.seq_idx as usize;
        entry
            .bytes(Column::Quality)
            .and_then(|cell| cell.get(seq))
            .map(|&q| q.saturating_add(QUALITY_OFFSET))
            .ok_or_else(|| {
                PileupError::storage(format!(
                    "quality cell of row {} has no base {}",
                    entry.row_id, seq
                ))
            })
    }

    fn inserted_bases(&mut self, index: usize) -> Result<Vec<u8>> {
        let current = self.list.active[index].current;
        let ins = current.ins_count as usize;
        if ins == 0 {
            return Ok(Vec::new());
        }
        self.load_required(index, Column::Mismatch)?;

        let entry = &self.list.active[index];
        let row_id = entry.row_id;
        let hm = entry.bytes(Column::HasMismatch).unwrap_or_default();
        let mm = entry.bytes(Column::Mismatch).unwrap_or_default();
        let seq = current.seq_idx as usize;
        let ins_start = seq.checked_sub(ins).ok_or_else(|| {
            PileupError::storage(format!("insertion of row {row_id} starts before the read"))
        })?;

        let mut bases = vec![0u8; ins];
        let mut mismatch_idx = current.mismatch_idx as usize;
        let mut ref_first = seq;
        for i in (ins_start..seq).rev() {
            if hm.get(i).is_some_and(|&b| b != 0) {
                let missing = || {
                    PileupError::storage(format!(
                        "mismatch cell of row {row_id} has no base for inserted read base {i}"
                    ))
                };
                mismatch_idx = mismatch_idx.checked_sub(1).ok_or_else(missing)?;
                bases[i - ins_start] = mm.get(mismatch_idx).copied().ok_or_else(missing)?;
            } else {
                ref_first = i;
            }
        }

        let ref_len = seq - ref_first;
        if ref_len != 0 {
            let mut zstart = self.ref_zpos - ref_len as i64;
            if zstart < 0 && self.reference.is_circular() {
                zstart += self.reference.length() as i64;
            }
            let reference = self.reference_span(zstart, ref_len)?;
            for (slot, &base) in bases[ins - ref_len..].iter_mut().zip(reference.iter()) {
                if *slot == 0 {
                    *slot = base;
                }
            }
        }
        Ok(bases)
    }

    fn inserted_qualities(&mut self, index: usize) -> Result<Vec<u8>> {
        let current = self.list.active[index].current;
        let ins = current.ins_count as usize;
        if ins == 0 {
            return Ok(Vec::new());
        }
        self.load_required(index, Column::Quality)?;
        let entry = &self.list.active[index];
        let seq = current.seq_idx as usize;
        entry
            .bytes(Column::Quality)
            .and_then(|cell| cell.get(seq.checked_sub(ins)?..seq))
            .map(|q| q.iter().map(|&q| q.saturating_add(QUALITY_OFFSET)).collect())
            .ok_or_else(|| {
                PileupError::storage(format!(
                    "quality cell of row {} is shorter than the read",
                    entry.row_id
                ))
            })
    }

    fn classify_indel(&mut self, index: usize) -> Result<IndelType> {
        let entry = &self.list.active[index];
        let current = entry.current;
        if current.del_count == 0 && current.ins_count == 0 {
            return Ok(IndelType::Normal);
        }
        let secondary = entry.secondary;
        if self
            .gatherer
            .cursor_mut(secondary)
            .is_none_or(|c| c.missing_ref_offset_type)
        {
            return Ok(IndelType::Normal);
        }

        let loaded = self
            .load_cell(index, Column::RefOffsetType)
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "edit offset types unreadable");
                false
            });
        if !loaded {
            if let Some(cursor) = self.gatherer.cursor_mut(secondary) {
                tracing::warn!(
                    category = %cursor.category,
                    "no edit offset type column, reporting normal indels"
                );
                cursor.missing_ref_offset_type = true;
            }
            return Ok(IndelType::Normal);
        }

        let entry = &self.list.active[index];
        let kind = current
            .ref_offset_idx
            .checked_sub(1)
            .and_then(|i| entry.bytes(Column::RefOffsetType)?.get(i as usize).copied());
        Ok(match kind {
            Some(2) => IndelType::IntronPlus,
            Some(3) => IndelType::IntronMinus,
            Some(4) => IndelType::IntronUnknown,
            Some(5) if current.ins_count != 0 => IndelType::ReadOverlap,
            Some(5) => IndelType::ReadGap,
            _ => IndelType::Normal,
        })
    }

    fn map_qual_of(&mut self, index: usize) -> Result<i32> {
        self.load_required(index, Column::MapQual)?;
        let entry = &self.list.active[index];
        entry
            .ints(Column::MapQual)
            .and_then(|cell| cell.first().copied())
            .ok_or_else(|| {
                PileupError::storage(format!("row {} has no mapping quality", entry.row_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_bits_combine() {
        let event = EventType {
            kind: EventKind::Mismatch,
            insertion: true,
            minus_strand: true,
            start: true,
            stop: false,
        };
        assert_eq!(event.bits(), 0x01 | 0x08 | 0x20 | 0x80);
    }

    #[test]
    fn alignment_id_display() {
        let id = AlignmentId { category: Category::Secondary, row_id: 42 };
        assert_eq!(id.to_string(), "SA.42");
    }
}
