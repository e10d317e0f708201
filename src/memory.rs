//! In-memory reference and alignment store, used by the command-line tool
//! and by tests.

use crate::encode::AlignmentRecord;
use crate::error::{PileupError, Result};
use crate::store::{
    AlignmentStore, Blob, Category, CategoryHint, Column, OverlapHints, ReferenceSource,
};
use crate::types::{ChunkId, HashMap, HashMapExt, RowId};
use std::ops::RangeInclusive;
use std::sync::Arc;

/// A reference held as pre-split chunks.
#[derive(Debug, Clone)]
pub struct MemoryReference {
    name: String,
    length: u64,
    circular: bool,
    chunk_size: u32,
    first_chunk: ChunkId,
    chunks: Vec<Arc<[u8]>>,
    hints: Option<Vec<OverlapHints>>,
}

impl MemoryReference {
    pub fn new(name: impl Into<String>, bases: &[u8], chunk_size: u32) -> Self {
        let chunks: Vec<Arc<[u8]>> = if chunk_size == 0 {
            Vec::new()
        } else {
            bases
                .chunks(chunk_size as usize)
                .map(|c| Arc::from(c.to_ascii_uppercase()))
                .collect()
        };
        Self {
            name: name.into(),
            length: bases.len() as u64,
            circular: false,
            chunk_size,
            first_chunk: 1,
            chunks,
            hints: None,
        }
    }

    pub fn circular(mut self, circular: bool) -> Self {
        self.circular = circular;
        self
    }

    /// Row id of the first chunk (1 unless set).
    pub fn first_chunk(mut self, first_chunk: ChunkId) -> Self {
        self.first_chunk = first_chunk;
        self
    }

    /// Attach one set of hints per chunk, in chunk order.
    pub fn with_overlap_hints(mut self, hints: Vec<OverlapHints>) -> Self {
        self.hints = Some(hints);
        self
    }

    fn chunk_index(&self, chunk: ChunkId) -> Option<usize> {
        let index = usize::try_from(chunk - self.first_chunk).ok()?;
        (index < self.chunks.len()).then_some(index)
    }
}

impl ReferenceSource for MemoryReference {
    fn name(&self) -> &str {
        &self.name
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn is_circular(&self) -> bool {
        self.circular
    }

    fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    fn chunk_ids(&self) -> RangeInclusive<ChunkId> {
        self.first_chunk..=self.first_chunk + self.chunks.len() as ChunkId - 1
    }

    fn chunk_bases(&self, chunk: ChunkId) -> Result<Arc<[u8]>> {
        self.chunk_index(chunk)
            .map(|i| Arc::clone(&self.chunks[i]))
            .ok_or_else(|| PileupError::storage(format!("{} has no chunk {}", self.name, chunk)))
    }

    fn overlap_hints(&self, chunk: ChunkId) -> Result<Option<OverlapHints>> {
        let Some(hints) = &self.hints else {
            return Ok(None);
        };
        Ok(self.chunk_index(chunk).and_then(|i| hints.get(i).copied()))
    }
}

#[derive(Debug, Default)]
struct CategoryTable {
    records: Vec<AlignmentRecord>,
    index: HashMap<ChunkId, Vec<RowId>>,
    /// Per column, blobs of `rows_per_blob` consecutive rows.
    blobs: Vec<Vec<Arc<Blob>>>,
}

/// Alignment tables built from [`AlignmentRecord`]s, indexed by the chunk
/// holding each alignment's start.
#[derive(Debug)]
pub struct MemoryAlignmentStore {
    chunk_size: u32,
    rows_per_blob: usize,
    tables: [CategoryTable; 2],
    missing: Vec<Column>,
    failing: Option<(Category, Column)>,
}

pub struct MemoryStoreBuilder {
    chunk_size: u32,
    first_chunk: ChunkId,
    rows_per_blob: usize,
    records: [Vec<AlignmentRecord>; 2],
    missing: Vec<Column>,
    failing: Option<(Category, Column)>,
    emptied: Vec<(Category, Column, RowId)>,
}

impl MemoryAlignmentStore {
    /// Builder for a store matching a reference split into `chunk_size` chunks.
    pub fn builder(chunk_size: u32) -> MemoryStoreBuilder {
        MemoryStoreBuilder {
            chunk_size,
            first_chunk: 1,
            rows_per_blob: 256,
            records: Default::default(),
            missing: Vec::new(),
            failing: None,
            emptied: Vec::new(),
        }
    }

    pub fn len(&self, category: Category) -> usize {
        self.tables[category.index()].records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(|t| t.records.is_empty())
    }

    pub fn record(&self, category: Category, row: RowId) -> Option<&AlignmentRecord> {
        let index = usize::try_from(row - 1).ok()?;
        self.tables[category.index()].records.get(index)
    }

    /// Look-behind hints for a reference of `ref_len` bases: for each chunk,
    /// how far alignments starting before it reach in, and where the earliest
    /// of them starts.
    pub fn overlap_hints(&self, ref_len: u64) -> Vec<OverlapHints> {
        if self.chunk_size == 0 {
            return Vec::new();
        }
        let chunk_size = self.chunk_size as u64;
        let chunk_count = ref_len.div_ceil(chunk_size);
        (0..chunk_count)
            .map(|i| {
                let chunk_start = i * chunk_size;
                let mut hints = OverlapHints::default();
                for category in Category::ALL {
                    let mut hint = CategoryHint::default();
                    for record in &self.tables[category.index()].records {
                        let end = record.ref_end();
                        if record.ref_start < chunk_start && end > chunk_start {
                            hint.max_reach = hint.max_reach.max((end - chunk_start) as u32);
                            let start = record.ref_start;
                            hint.earliest_start =
                                Some(hint.earliest_start.map_or(start, |s| s.min(start)));
                        }
                    }
                    hints.categories[category.index()] = hint;
                }
                hints
            })
            .collect()
    }

    fn table_blob(&self, category: Category, column: Column, row: RowId) -> Result<Arc<Blob>> {
        let table = &self.tables[category.index()];
        let out_of_range = || {
            PileupError::storage(format!("{category}.{row} is not a row of the {category} table"))
        };
        let index = usize::try_from(row - 1).map_err(|_| out_of_range())?;
        if index >= table.records.len() {
            return Err(out_of_range());
        }
        table.blobs[column.index()]
            .get(index / self.rows_per_blob)
            .cloned()
            .ok_or_else(out_of_range)
    }
}

impl AlignmentStore for MemoryAlignmentStore {
    fn has_category(&self, category: Category) -> bool {
        !self.tables[category.index()].records.is_empty()
    }

    fn alignment_ids(&self, chunk: ChunkId, category: Category) -> Result<Vec<RowId>> {
        Ok(self.tables[category.index()]
            .index
            .get(&chunk)
            .cloned()
            .unwrap_or_default())
    }

    fn blob(&self, category: Category, column: Column, row: RowId) -> Result<Option<Arc<Blob>>> {
        if self.failing == Some((category, column)) {
            return Err(PileupError::storage(format!(
                "{category} {column} blob for row {row} is unreadable"
            )));
        }
        if self.missing.contains(&column) {
            return Ok(None);
        }
        self.table_blob(category, column, row).map(Some)
    }
}

impl MemoryStoreBuilder {
    /// Row id of the reference's first chunk.
    pub fn first_chunk(mut self, first_chunk: ChunkId) -> Self {
        self.first_chunk = first_chunk;
        self
    }

    pub fn rows_per_blob(mut self, rows: usize) -> Self {
        self.rows_per_blob = rows.max(1);
        self
    }

    /// Leave `column` out of both tables.
    pub fn without_column(mut self, column: Column) -> Self {
        self.missing.push(column);
        self
    }

    /// Make every read of `column` in `category` fail.
    pub fn failing_column(mut self, category: Category, column: Column) -> Self {
        self.failing = Some((category, column));
        self
    }

    /// Store an empty cell for `row` in `column`, leaving the rest of the table intact.
    pub fn empty_cell(mut self, category: Category, column: Column, row: RowId) -> Self {
        self.emptied.push((category, column, row));
        self
    }

    /// Add an alignment, returning its row id (1-based, in push order).
    pub fn push(&mut self, category: Category, record: AlignmentRecord) -> RowId {
        let records = &mut self.records[category.index()];
        records.push(record);
        records.len() as RowId
    }

    pub fn build(self) -> MemoryAlignmentStore {
        let MemoryStoreBuilder {
            chunk_size,
            first_chunk,
            rows_per_blob,
            mut records,
            missing,
            failing,
            emptied,
        } = self;
        let tables = Category::ALL.map(|category| {
            let records = std::mem::take(&mut records[category.index()]);
            let mut index: HashMap<ChunkId, Vec<RowId>> = HashMap::new();
            if chunk_size != 0 {
                for (i, record) in records.iter().enumerate() {
                    let chunk = (record.ref_start / chunk_size as u64) as ChunkId + first_chunk;
                    index.entry(chunk).or_default().push(i as RowId + 1);
                }
            }
            let blobs = Column::ALL
                .iter()
                .map(|&column| {
                    records
                        .chunks(rows_per_blob)
                        .enumerate()
                        .map(|(group, rows)| {
                            let first_row = (group * rows_per_blob) as RowId + 1;
                            let blank = |row: RowId| emptied.contains(&(category, column, row));
                            Arc::new(column_blob(column, first_row, rows, blank))
                        })
                        .collect()
                })
                .collect();
            CategoryTable { records, index, blobs }
        });
        MemoryAlignmentStore {
            chunk_size,
            rows_per_blob,
            tables,
            missing,
            failing,
        }
    }
}

fn column_blob(
    column: Column,
    first_row: RowId,
    rows: &[AlignmentRecord],
    blank: impl Fn(RowId) -> bool,
) -> Blob {
    let rows = rows.iter().enumerate().map(|(i, r)| (blank(first_row + i as RowId), r));
    if column.holds_ints() {
        return Blob::from_int_cells(
            first_row,
            rows.map(|(blank, r)| match column {
                _ if blank => Vec::new(),
                Column::MapQual => vec![r.map_qual],
                Column::RefOffset => r.ref_offset.clone(),
                Column::RefPos => vec![r.ref_start as i32],
                Column::RefLen => vec![r.ref_len as i32],
                _ => Vec::new(),
            }),
        );
    }
    Blob::from_byte_cells(
        first_row,
        rows.map(|(blank, r)| match column {
            _ if blank => Vec::new(),
            Column::HasRefOffset => r.has_ref_offset.clone(),
            Column::Mismatch => r.mismatch.clone(),
            Column::HasMismatch => r.has_mismatch.clone(),
            Column::RefOrientation => vec![r.reverse as u8],
            Column::Quality => r.quality.clone(),
            Column::RefOffsetType => r.ref_offset_type.clone(),
            Column::ReadFilter => vec![r.read_filter as u8],
            _ => Vec::new(),
        }),
    )
}
