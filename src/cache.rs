use crate::entry::{AlignmentEntry, CellSlot};
use crate::error::{PileupError, Result};
use crate::store::{AlignmentStore, Blob, Category, Column};
use crate::types::RowId;
use std::sync::Arc;

/// Read cursor over one alignment category that remembers the most recent
/// blob per column, so neighbouring rows are served without a store call.
#[derive(Debug)]
pub(crate) struct CategoryCursor {
    pub category: Category,
    recent: [Option<Arc<Blob>>; Column::COUNT],
    /// The edit-offset-type column turned out to be unavailable.
    pub missing_ref_offset_type: bool,
}

impl CategoryCursor {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            recent: Default::default(),
            missing_ref_offset_type: false,
        }
    }

    pub fn blob<S: AlignmentStore>(
        &mut self,
        store: &S,
        column: Column,
        row: RowId,
    ) -> Result<Option<Arc<Blob>>> {
        let slot = &mut self.recent[column.index()];
        if let Some(blob) = slot
            && blob.contains(row)
        {
            return Ok(Some(Arc::clone(blob)));
        }
        let blob = store.blob(self.category, column, row)?;
        if let Some(b) = &blob
            && !b.contains(row)
        {
            return Err(PileupError::storage(format!(
                "{} blob for {}.{} does not cover the row",
                column, self.category, row
            )));
        }
        *slot = blob.clone();
        Ok(blob)
    }

    fn required<S: AlignmentStore>(
        &mut self,
        store: &S,
        column: Column,
        row: RowId,
    ) -> Result<Arc<Blob>> {
        self.blob(store, column, row)?.ok_or_else(|| {
            PileupError::storage(format!("{} table has no {} column", self.category, column))
        })
    }

    /// First element of an integer cell, `None` if the cell is empty.
    pub fn int<S: AlignmentStore>(
        &mut self,
        store: &S,
        column: Column,
        row: RowId,
    ) -> Result<Option<i32>> {
        let blob = self.required(store, column, row)?;
        Ok(blob.ints(row).and_then(|cell| cell.first().copied()))
    }

    /// First element of a byte cell, `None` if the cell is empty.
    pub fn byte<S: AlignmentStore>(
        &mut self,
        store: &S,
        column: Column,
        row: RowId,
    ) -> Result<Option<u8>> {
        let blob = self.required(store, column, row)?;
        Ok(blob.bytes(row).and_then(|cell| cell.first().copied()))
    }

    pub fn release(&mut self) {
        self.recent = Default::default();
    }
}

/// Byte budget for blobs pinned by alignment entries.
#[derive(Debug)]
pub(crate) struct ColumnCache {
    limit: usize,
    total: usize,
    degraded: bool,
}

impl ColumnCache {
    pub fn new(limit: usize) -> Self {
        Self { limit, total: 0, degraded: false }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Attach the cell of `column` to `entry`, pinning its blob while the budget
    /// allows and holding it ephemerally otherwise. Returns `false` when the
    /// store has no such column.
    pub fn load<S: AlignmentStore>(
        &mut self,
        entry: &mut AlignmentEntry,
        cursor: &mut CategoryCursor,
        store: &S,
        column: Column,
    ) -> Result<bool> {
        if entry.has_cell(column) {
            return Ok(true);
        }
        let Some(blob) = cursor.blob(store, column, entry.row_id)? else {
            return Ok(false);
        };

        if !entry.temporary {
            let size = blob.size_bytes();
            if self.total + size <= self.limit {
                self.total += size;
                entry.blob_total += size;
                entry.cells[column.index()] = CellSlot::Pinned(blob);
                return Ok(true);
            }
            if !self.degraded {
                tracing::warn!(
                    limit = self.limit,
                    total = self.total,
                    "column cache budget exhausted, falling back to ephemeral cells"
                );
                self.degraded = true;
            }
            entry.temporary = true;
        }
        entry.cells[column.index()] = CellSlot::Ephemeral(blob);
        Ok(true)
    }

    /// Like [`load`](Self::load) but a missing column is a storage failure.
    pub fn load_required<S: AlignmentStore>(
        &mut self,
        entry: &mut AlignmentEntry,
        cursor: &mut CategoryCursor,
        store: &S,
        column: Column,
    ) -> Result<()> {
        if self.load(entry, cursor, store, column)? {
            Ok(())
        } else {
            Err(PileupError::storage(format!(
                "{} table has no {} column",
                cursor.category, column
            )))
        }
    }

    /// Return an entry's pinned bytes to the budget and drop all its cells.
    pub fn release(&mut self, entry: &mut AlignmentEntry) {
        self.total = self.total.saturating_sub(entry.blob_total);
        entry.blob_total = 0;
        entry.cells = Default::default();
    }
}
