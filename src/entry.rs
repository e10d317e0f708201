use crate::store::{Blob, Column};
use crate::types::RowId;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryStatus {
    Initial,
    Valid,
    Done,
}

/// Decode cursor into an alignment's edit columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DecodeState {
    pub ins_count: u32,
    pub del_count: u32,
    pub ref_offset_idx: u32,
    pub mismatch_idx: u32,
    pub seq_idx: u32,
    pub zstart_adjust: u32,
    /// Mismatch base at `mismatch_idx`, zero until fetched.
    pub mismatch: u8,
}

#[derive(Debug, Clone, Default)]
pub(crate) enum CellSlot {
    #[default]
    Absent,
    /// Blob retained and charged against the cache budget.
    Pinned(Arc<Blob>),
    /// Blob held only until the next cursor motion.
    Ephemeral(Arc<Blob>),
}

impl CellSlot {
    pub fn blob(&self) -> Option<&Arc<Blob>> {
        match self {
            CellSlot::Absent => None,
            CellSlot::Pinned(blob) | CellSlot::Ephemeral(blob) => Some(blob),
        }
    }
}

/// One alignment's projection onto the reference plus its decode state.
#[derive(Debug)]
pub(crate) struct AlignmentEntry {
    pub row_id: RowId,
    pub secondary: bool,
    pub zstart: i64,
    pub xend: i64,
    pub status: EntryStatus,
    pub temporary: bool,
    /// Set once the event decoder has initialised this entry.
    pub seen: bool,
    /// Bytes of pinned blobs charged to the cache on this entry's behalf.
    pub blob_total: usize,
    pub cells: [CellSlot; Column::COUNT],
    pub current: DecodeState,
    pub next: DecodeState,
}

impl AlignmentEntry {
    pub fn new(row_id: RowId, secondary: bool, zstart: i64, ref_len: u32) -> Self {
        Self {
            row_id,
            secondary,
            zstart,
            xend: zstart + ref_len as i64,
            status: EntryStatus::Initial,
            temporary: false,
            seen: false,
            blob_total: 0,
            cells: Default::default(),
            current: DecodeState::default(),
            next: DecodeState::default(),
        }
    }

    pub fn slot(&self, column: Column) -> &CellSlot {
        &self.cells[column.index()]
    }

    pub fn has_cell(&self, column: Column) -> bool {
        !matches!(self.cells[column.index()], CellSlot::Absent)
    }

    pub fn blob(&self, column: Column) -> Option<Arc<Blob>> {
        self.slot(column).blob().cloned()
    }

    pub fn bytes(&self, column: Column) -> Option<&[u8]> {
        self.slot(column).blob()?.bytes(self.row_id)
    }

    pub fn ints(&self, column: Column) -> Option<&[i32]> {
        self.slot(column).blob()?.ints(self.row_id)
    }

    /// Drop ephemeral cells so they are fetched again on next access.
    pub fn drop_ephemeral(&mut self) {
        for slot in self.cells.iter_mut() {
            if matches!(slot, CellSlot::Ephemeral(_)) {
                *slot = CellSlot::Absent;
            }
        }
    }

    /// Forget decode progress; the entry is initialised again on next focus.
    pub fn reset_decode(&mut self) {
        self.current = DecodeState::default();
        self.next = DecodeState::default();
        self.status = EntryStatus::Initial;
        self.seen = false;
    }

    pub fn projection_len(&self) -> i64 {
        self.xend - self.zstart
    }
}

/// Start ascending, longer projections first, primary before secondary, then row id.
impl Ord for AlignmentEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.zstart
            .cmp(&other.zstart)
            .then_with(|| other.xend.cmp(&self.xend))
            .then_with(|| self.secondary.cmp(&other.secondary))
            .then_with(|| self.row_id.cmp(&other.row_id))
    }
}

impl PartialOrd for AlignmentEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AlignmentEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AlignmentEntry {}
