use crate::cache::CategoryCursor;
use crate::config::{MapQualBound, PileupConfig};
use crate::entry::AlignmentEntry;
use crate::error::{PileupError, Result};
use crate::list::AlignmentList;
use crate::store::{AlignmentStore, Category, Column, ReadFilter};
use crate::types::{ChunkId, RowId};
use std::collections::BTreeSet;

/// Reference interval and coordinate shift applied while gathering.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GatherWindow {
    pub slice_zstart: i64,
    pub slice_xend: i64,
    pub slice_end_id: ChunkId,
    /// Added to raw alignment starts; negative while linearising a circular
    /// reference behind its origin.
    pub effective_ref_zstart: i64,
    /// Only alignments starting inside the window are kept.
    pub start_within_window: bool,
}

impl GatherWindow {
    fn overlaps(&self, zstart: i64, xend: i64) -> bool {
        if self.start_within_window && zstart < self.slice_zstart {
            return false;
        }
        zstart < self.slice_xend && xend > self.slice_zstart
    }
}

#[derive(Debug, Clone, Copy)]
struct FilterPolicy {
    pass_bad: bool,
    pass_duplicates: bool,
    map_qual: Option<MapQualBound>,
}

/// Pulls alignment ids chunk by chunk from the store and turns the survivors
/// into waiting entries.
#[derive(Debug)]
pub(crate) struct AlignmentGatherer {
    policy: FilterPolicy,
    pub primary: Option<CategoryCursor>,
    pub secondary: Option<CategoryCursor>,
    /// Next chunk whose ids have not been gathered.
    pub idx_chunk_id: ChunkId,
}

impl AlignmentGatherer {
    pub fn new<S: AlignmentStore>(store: &S, config: &PileupConfig, first_chunk: ChunkId) -> Self {
        let open = |wanted: bool, category: Category| {
            (wanted && store.has_category(category)).then(|| CategoryCursor::new(category))
        };
        Self {
            policy: FilterPolicy {
                pass_bad: config.pass_bad,
                pass_duplicates: config.pass_duplicates,
                map_qual: config.map_qual,
            },
            primary: open(config.wants_primary, Category::Primary),
            secondary: open(config.wants_secondary, Category::Secondary),
            idx_chunk_id: first_chunk,
        }
    }

    pub fn cursor_mut(&mut self, secondary: bool) -> Option<&mut CategoryCursor> {
        if secondary {
            self.secondary.as_mut()
        } else {
            self.primary.as_mut()
        }
    }

    pub fn release(&mut self) {
        for cursor in self.primary.iter_mut().chain(self.secondary.iter_mut()) {
            cursor.release();
        }
    }

    /// Gather ids from `start` on until `id_limit` ids were seen or the window
    /// end chunk was passed (at least one chunk is always read), then append
    /// the surviving alignments of both categories to `list.waiting` in order.
    pub fn populate<S: AlignmentStore>(
        &mut self,
        store: &S,
        list: &mut AlignmentList,
        window: &GatherWindow,
        start: ChunkId,
        id_limit: usize,
    ) -> Result<()> {
        let (primary_ids, secondary_ids) = self.gather_ids(store, window, start, id_limit)?;
        tracing::debug!(
            start,
            next = self.idx_chunk_id,
            primary = primary_ids.len(),
            secondary = secondary_ids.len(),
            "gathered alignment ids"
        );

        if let Some(cursor) = self.primary.as_mut()
            && !self.policy.read_category(store, cursor, list, window, &primary_ids)?
        {
            list.sort_waiting();
        }

        if let Some(cursor) = self.secondary.as_mut() {
            let primary_waiting = list.take_waiting();
            match self.policy.read_category(store, cursor, list, window, &secondary_ids) {
                Ok(ordered) => {
                    if !ordered {
                        list.sort_waiting();
                    }
                    list.merge_waiting(primary_waiting)?;
                }
                Err(e) => {
                    list.prepend_waiting(primary_waiting);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn gather_ids<S: AlignmentStore>(
        &mut self,
        store: &S,
        window: &GatherWindow,
        start: ChunkId,
        id_limit: usize,
    ) -> Result<(BTreeSet<RowId>, BTreeSet<RowId>)> {
        let mut primary = BTreeSet::new();
        let mut secondary = BTreeSet::new();
        let mut total = 0usize;

        self.idx_chunk_id = start;
        loop {
            if self.primary.is_some() {
                let ids = store.alignment_ids(self.idx_chunk_id, Category::Primary)?;
                total += ids.len();
                primary.extend(ids);
            }
            if self.secondary.is_some() {
                let ids = store.alignment_ids(self.idx_chunk_id, Category::Secondary)?;
                total += ids.len();
                secondary.extend(ids);
            }
            self.idx_chunk_id += 1;
            if total >= id_limit || self.idx_chunk_id > window.slice_end_id {
                break;
            }
        }
        Ok((primary, secondary))
    }
}

impl FilterPolicy {
    fn accepts(
        &self,
        filter: ReadFilter,
        mapq: impl FnOnce() -> Result<Option<i32>>,
    ) -> Result<bool> {
        Ok(match filter {
            ReadFilter::Pass => match self.map_qual {
                None => true,
                Some(bound) => mapq()?.is_some_and(|q| bound.accepts(q)),
            },
            ReadFilter::Reject => self.pass_bad,
            ReadFilter::Criteria => self.pass_duplicates,
            ReadFilter::Redacted => false,
        })
    }

    /// Read one category's ids into `list.waiting`; returns whether they
    /// arrived in entry order.
    fn read_category<S: AlignmentStore>(
        &self,
        store: &S,
        cursor: &mut CategoryCursor,
        list: &mut AlignmentList,
        window: &GatherWindow,
        ids: &BTreeSet<RowId>,
    ) -> Result<bool> {
        let secondary = cursor.category.is_secondary();
        let mut ordered = true;
        let mut last: Option<(i64, i64, RowId)> = None;

        for &row_id in ids {
            let category = cursor.category;
            let filter = cursor
                .byte(store, Column::ReadFilter, row_id)?
                .and_then(ReadFilter::from_u8)
                .ok_or_else(|| {
                    PileupError::storage(format!("{category}.{row_id} has no valid read filter"))
                })?;
            let ref_pos = cursor.int(store, Column::RefPos, row_id)?.ok_or_else(|| {
                PileupError::storage(format!("{category}.{row_id} has no reference position"))
            })?;
            let ref_len = cursor.int(store, Column::RefLen, row_id)?.ok_or_else(|| {
                PileupError::storage(format!("{category}.{row_id} has no reference length"))
            })?;
            let ref_len = ref_len.max(0) as u32;
            list.observe(ref_len as i64);

            if !self.accepts(filter, || cursor.int(store, Column::MapQual, row_id))? {
                continue;
            }

            let zstart = ref_pos as u32 as i64 + window.effective_ref_zstart;
            let xend = zstart + ref_len as i64;
            if ref_len == 0 || !window.overlaps(zstart, xend) {
                continue;
            }

            let entry = AlignmentEntry::new(row_id, secondary, zstart, ref_len);
            if ordered {
                if let Some((lz, lx, lr)) = last
                    && (zstart, -xend, row_id) < (lz, -lx, lr)
                {
                    ordered = false;
                }
                last = Some((zstart, xend, row_id));
            }
            list.push_waiting(entry)?;
        }
        Ok(ordered)
    }
}
