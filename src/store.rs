//! Interfaces to the two external collaborators of the engine: the reference
//! metadata/base service and the chunk-indexed, columnar alignment store.

use crate::error::Result;
use crate::types::{ChunkId, RowId};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// The two alignment tables a pileup can draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Primary,
    Secondary,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Primary, Category::Secondary];

    pub fn index(self) -> usize {
        match self {
            Category::Primary => 0,
            Category::Secondary => 1,
        }
    }

    pub fn is_secondary(self) -> bool {
        self == Category::Secondary
    }

    pub fn from_secondary(secondary: bool) -> Self {
        if secondary {
            Category::Secondary
        } else {
            Category::Primary
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Primary => "PA",
            Category::Secondary => "SA",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Columns read by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    MapQual,
    RefOffset,
    HasRefOffset,
    Mismatch,
    HasMismatch,
    RefOrientation,
    Quality,
    RefOffsetType,
    RefPos,
    RefLen,
    ReadFilter,
}

impl Column {
    pub const COUNT: usize = 11;

    pub const ALL: [Column; Column::COUNT] = [
        Column::MapQual,
        Column::RefOffset,
        Column::HasRefOffset,
        Column::Mismatch,
        Column::HasMismatch,
        Column::RefOrientation,
        Column::Quality,
        Column::RefOffsetType,
        Column::RefPos,
        Column::RefLen,
        Column::ReadFilter,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Columns holding `i32` elements; everything else holds bytes.
    pub fn holds_ints(self) -> bool {
        matches!(
            self,
            Column::MapQual | Column::RefOffset | Column::RefPos | Column::RefLen
        )
    }

    /// Columns a store may legitimately lack.
    pub fn is_optional(self) -> bool {
        matches!(self, Column::RefOffsetType)
    }

    pub fn name(self) -> &'static str {
        match self {
            Column::MapQual => "MAPQ",
            Column::RefOffset => "REF_OFFSET",
            Column::HasRefOffset => "HAS_REF_OFFSET",
            Column::Mismatch => "MISMATCH",
            Column::HasMismatch => "HAS_MISMATCH",
            Column::RefOrientation => "REF_ORIENTATION",
            Column::Quality => "QUALITY",
            Column::RefOffsetType => "REF_OFFSET_TYPE",
            Column::RefPos => "REF_POS",
            Column::RefLen => "REF_LEN",
            Column::ReadFilter => "READ_FILTER",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-read filter classification stored with every alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadFilter {
    #[default]
    Pass = 0,
    Reject = 1,
    Criteria = 2,
    Redacted = 3,
}

impl ReadFilter {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ReadFilter::Pass),
            1 => Some(ReadFilter::Reject),
            2 => Some(ReadFilter::Criteria),
            3 => Some(ReadFilter::Redacted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlobData {
    Bytes(Vec<u8>),
    Ints(Vec<i32>),
}

/// A retainable buffer holding the cells of one column for a contiguous run of rows.
///
/// Blobs are shared through `Arc`; an entry that pins a blob keeps a clone and the
/// cells stay valid for as long as the clone lives.
#[derive(Debug)]
pub struct Blob {
    first_row: RowId,
    offsets: Vec<usize>,
    data: BlobData,
}

impl Blob {
    pub fn from_byte_cells<I, C>(first_row: RowId, cells: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let mut offsets = vec![0];
        let mut data = Vec::new();
        for cell in cells {
            data.extend_from_slice(cell.as_ref());
            offsets.push(data.len());
        }
        Self { first_row, offsets, data: BlobData::Bytes(data) }
    }

    pub fn from_int_cells<I, C>(first_row: RowId, cells: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[i32]>,
    {
        let mut offsets = vec![0];
        let mut data = Vec::new();
        for cell in cells {
            data.extend_from_slice(cell.as_ref());
            offsets.push(data.len());
        }
        Self { first_row, offsets, data: BlobData::Ints(data) }
    }

    pub fn first_row(&self) -> RowId {
        self.first_row
    }

    pub fn row_count(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn contains(&self, row: RowId) -> bool {
        row >= self.first_row && row - self.first_row < self.row_count() as RowId
    }

    /// Bytes this blob charges against a cache budget.
    pub fn size_bytes(&self) -> usize {
        let data = match &self.data {
            BlobData::Bytes(v) => v.len(),
            BlobData::Ints(v) => v.len() * std::mem::size_of::<i32>(),
        };
        data + self.offsets.len() * std::mem::size_of::<usize>()
    }

    fn cell_range(&self, row: RowId) -> Option<std::ops::Range<usize>> {
        if !self.contains(row) {
            return None;
        }
        let i = (row - self.first_row) as usize;
        Some(self.offsets[i]..self.offsets[i + 1])
    }

    pub fn bytes(&self, row: RowId) -> Option<&[u8]> {
        let range = self.cell_range(row)?;
        match &self.data {
            BlobData::Bytes(v) => v.get(range),
            BlobData::Ints(_) => None,
        }
    }

    pub fn ints(&self, row: RowId) -> Option<&[i32]> {
        let range = self.cell_range(row)?;
        match &self.data {
            BlobData::Ints(v) => v.get(range),
            BlobData::Bytes(_) => None,
        }
    }
}

/// Per-category look-behind hints recorded for one reference chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryHint {
    /// How far, in bases, alignments starting in earlier chunks reach into this chunk.
    pub max_reach: u32,
    /// Zero-based start of the earliest alignment overlapping the start of this chunk.
    pub earliest_start: Option<u64>,
}

/// Optional overlap hints for a reference chunk, indexed by [`Category::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlapHints {
    pub categories: [CategoryHint; 2],
}

impl OverlapHints {
    pub fn get(&self, category: Category) -> CategoryHint {
        self.categories[category.index()]
    }
}

/// Reference metadata and chunked base delivery.
pub trait ReferenceSource {
    /// Canonical reference name.
    fn name(&self) -> &str;

    fn length(&self) -> u64;

    fn is_circular(&self) -> bool;

    /// Bases per chunk (every chunk but the last is full).
    fn chunk_size(&self) -> u32;

    /// Chunk row ids covering the whole reference.
    fn chunk_ids(&self) -> RangeInclusive<ChunkId>;

    fn chunk_bases(&self, chunk: ChunkId) -> Result<Arc<[u8]>>;

    /// Look-behind hints for a chunk; `None` when the reference records none.
    fn overlap_hints(&self, _chunk: ChunkId) -> Result<Option<OverlapHints>> {
        Ok(None)
    }
}

/// Chunk-indexed alignment tables with column cells delivered in blobs.
pub trait AlignmentStore {
    /// Whether the store carries a table for `category` at all.
    fn has_category(&self, _category: Category) -> bool {
        true
    }

    /// Row ids of alignments of `category` indexed under a reference chunk.
    fn alignment_ids(&self, chunk: ChunkId, category: Category) -> Result<Vec<RowId>>;

    /// The blob holding the cell of `column` for `row`, or `None` when the
    /// table has no such column.
    fn blob(&self, category: Category, column: Column, row: RowId) -> Result<Option<Arc<Blob>>>;
}

impl<T: ReferenceSource + ?Sized> ReferenceSource for &T {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn length(&self) -> u64 {
        (**self).length()
    }
    fn is_circular(&self) -> bool {
        (**self).is_circular()
    }
    fn chunk_size(&self) -> u32 {
        (**self).chunk_size()
    }
    fn chunk_ids(&self) -> RangeInclusive<ChunkId> {
        (**self).chunk_ids()
    }
    fn chunk_bases(&self, chunk: ChunkId) -> Result<Arc<[u8]>> {
        (**self).chunk_bases(chunk)
    }
    fn overlap_hints(&self, chunk: ChunkId) -> Result<Option<OverlapHints>> {
        (**self).overlap_hints(chunk)
    }
}

impl<T: AlignmentStore + ?Sized> AlignmentStore for &T {
    fn has_category(&self, category: Category) -> bool {
        (**self).has_category(category)
    }
    fn alignment_ids(&self, chunk: ChunkId, category: Category) -> Result<Vec<RowId>> {
        (**self).alignment_ids(chunk, category)
    }
    fn blob(&self, category: Category, column: Column, row: RowId) -> Result<Option<Arc<Blob>>> {
        (**self).blob(category, column, row)
    }
}
