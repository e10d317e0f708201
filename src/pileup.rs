use crate::cache::ColumnCache;
use crate::config::PileupConfig;
use crate::error::{PileupError, Result};
use crate::event::EventCursor;
use crate::gather::{AlignmentGatherer, GatherWindow};
use crate::list::AlignmentList;
use crate::store::{AlignmentStore, Category, ReferenceSource};
use crate::types::ChunkId;
use std::ops::RangeInclusive;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Initial,
    InitialPopulate,
    InitialChunk,
    InitialPosition,
    Position,
    Chunk,
    Populate,
    Finished,
    Error,
    Destroyed,
}

/// Walks a reference one base at a time, keeping the set of alignments whose
/// projection covers the current position.
///
/// Call [`advance`](Pileup::advance) before using any accessor; each
/// successful call moves to the next position of the window and rewinds the
/// per-alignment event iteration (see [`next_event`](Pileup::next_event)).
pub struct Pileup<R, S> {
    pub(crate) reference: R,
    pub(crate) store: S,
    pub(crate) config: PileupConfig,
    pub(crate) state: State,
    pub(crate) list: AlignmentList,
    pub(crate) cache: ColumnCache,
    pub(crate) gatherer: AlignmentGatherer,
    pub(crate) events: EventCursor,

    circular: bool,
    /// Circular handling applies to look-behind.
    wrap: bool,
    ref_len: i64,
    pub(crate) chunk_size: i64,
    pub(crate) reference_start_id: ChunkId,
    reference_last_id: ChunkId,

    slice_zstart: i64,
    slice_xend: i64,
    slice_start_id: ChunkId,
    slice_end_id: ChunkId,

    pub(crate) ref_zpos: i64,
    pub(crate) ref_chunk_id: ChunkId,
    ref_chunk_xend: i64,
    effective_ref_zstart: i64,
    pub(crate) ref_chunk_bases: Option<Arc<[u8]>>,
    pub(crate) ref_base: Option<u8>,
}

impl<R: ReferenceSource, S: AlignmentStore> Pileup<R, S> {
    /// Pileup over the whole reference.
    pub fn new(reference: R, store: S, config: PileupConfig) -> Result<Self> {
        let rows = reference.chunk_ids();
        Self::with_rows(reference, store, rows, config)
    }

    /// Pileup over the whole reference, stored in chunk rows `rows`.
    pub fn with_rows(
        reference: R,
        store: S,
        rows: RangeInclusive<ChunkId>,
        config: PileupConfig,
    ) -> Result<Self> {
        let chunk_size = reference.chunk_size() as i64;
        if chunk_size == 0 {
            return Err(PileupError::storage(format!(
                "reference {} reports a zero chunk size",
                reference.name()
            )));
        }
        let ref_len = reference.length() as i64;
        let circular = reference.is_circular();
        let (first, last) = rows.into_inner();

        let gatherer = AlignmentGatherer::new(&store, &config, first);
        let cache = ColumnCache::new(config.cached_blob_limit);
        Ok(Self {
            reference,
            store,
            wrap: circular && !config.no_wraparound,
            config,
            state: State::Initial,
            list: AlignmentList::default(),
            cache,
            gatherer,
            events: EventCursor::default(),
            circular,
            ref_len,
            chunk_size,
            reference_start_id: first,
            reference_last_id: last,
            slice_zstart: 0,
            slice_xend: ref_len,
            slice_start_id: first,
            slice_end_id: last,
            ref_zpos: 0,
            ref_chunk_id: first,
            ref_chunk_xend: 0,
            effective_ref_zstart: 0,
            ref_chunk_bases: None,
            ref_base: None,
        })
    }

    /// Pileup over `length` bases starting at zero-based `offset`.
    ///
    /// The window is clipped to the end of the reference.
    pub fn slice(
        reference: R,
        store: S,
        config: PileupConfig,
        offset: u64,
        length: u64,
    ) -> Result<Self> {
        let ref_len = reference.length();
        if offset >= ref_len {
            return Err(PileupError::OutOfRange { start: offset, length: ref_len });
        }
        let mut pileup = Self::new(reference, store, config)?;

        let mut length = length;
        if pileup.circular && length > ref_len {
            length = ref_len;
        }
        // positions past the end are not iterated, even on circular references
        length = length.min(ref_len - offset);

        pileup.ref_zpos = offset as i64;
        pileup.slice_zstart = offset as i64;
        pileup.slice_xend = (offset + length) as i64;
        pileup.slice_start_id = pileup.chunk_of(pileup.slice_zstart);
        pileup.slice_end_id = pileup.chunk_of((pileup.slice_xend - 1).max(pileup.slice_zstart));
        Ok(pileup)
    }

    /// Move to the next reference position of the window.
    ///
    /// Returns `Ok(false)` once the window is consumed, and keeps doing so.
    pub fn advance(&mut self) -> Result<bool> {
        match self.state {
            State::Error => return Err(PileupError::InvalidState("pileup failed earlier")),
            State::Destroyed => return Err(PileupError::InvalidState("pileup is closed")),
            State::Finished => return Ok(false),
            _ => {}
        }
        match self.step() {
            Ok(valid) => {
                self.events.restart();
                Ok(valid)
            }
            Err(e) => {
                tracing::debug!(error = %e, position = self.ref_zpos, "pileup failed");
                self.state = State::Error;
                Err(e)
            }
        }
    }

    pub fn reference_name(&self) -> Result<&str> {
        self.check_state()?;
        Ok(self.reference.name())
    }

    /// Zero-based position of the cursor.
    pub fn reference_position(&self) -> Result<u64> {
        self.check_state()?;
        Ok(self.ref_zpos as u64)
    }

    pub fn reference_base(&mut self) -> Result<u8> {
        self.check_state()?;
        let result = self.current_reference_base();
        self.fail_on_fatal(result)
    }

    /// Number of alignments covering the current position.
    pub fn depth(&self) -> Result<usize> {
        self.check_state()?;
        Ok(self.list.depth())
    }

    /// Bytes of column blobs currently pinned by alignment entries.
    pub fn cached_bytes(&self) -> usize {
        self.cache.total()
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    pub fn reference(&self) -> &R {
        &self.reference
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Release all entries and cached data. Every later call fails.
    pub fn close(&mut self) {
        self.list.clear(&mut self.cache);
        self.gatherer.release();
        self.ref_chunk_bases = None;
        self.ref_base = None;
        self.state = State::Destroyed;
    }

    pub(crate) fn check_state(&self) -> Result<()> {
        match self.state {
            State::Position | State::Chunk | State::Populate => Ok(()),
            State::Initial
            | State::InitialPopulate
            | State::InitialChunk
            | State::InitialPosition => {
                Err(PileupError::InvalidState("pileup accessed before advance()"))
            }
            State::Finished => Err(PileupError::Exhausted("pileup")),
            State::Error => Err(PileupError::InvalidState("pileup failed earlier")),
            State::Destroyed => Err(PileupError::InvalidState("pileup is closed")),
        }
    }

    /// Storage and allocation failures are not recoverable.
    pub(crate) fn fail_on_fatal<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.is_fatal()
        {
            self.state = State::Error;
        }
        result
    }

    pub(crate) fn chunk_of(&self, pos: i64) -> ChunkId {
        pos / self.chunk_size + self.reference_start_id
    }

    fn chunk_zstart(&self, chunk: ChunkId) -> i64 {
        (chunk - self.reference_start_id) * self.chunk_size
    }

    fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL.into_iter().filter(|c| match c {
            Category::Primary => self.gatherer.primary.is_some(),
            Category::Secondary => self.gatherer.secondary.is_some(),
        })
    }

    fn step(&mut self) -> Result<bool> {
        loop {
            match self.state {
                State::Position => {
                    if self.advance_position() {
                        return Ok(true);
                    }
                }
                State::Chunk => self.enter_chunk(),
                State::Populate => {
                    self.populate(self.ref_chunk_id, self.config.read_ahead_limit)?;
                    self.state = State::Position;
                }
                State::Initial => self.prime()?,
                State::InitialPopulate => {
                    self.populate(self.ref_chunk_id, self.config.read_ahead_limit)?;
                    self.state = State::InitialChunk;
                }
                State::InitialChunk => {
                    self.enter_chunk();
                    self.state = State::InitialPosition;
                }
                State::InitialPosition => {
                    if self.activate() {
                        self.state = State::Position;
                        return Ok(true);
                    }
                    self.state = State::Finished;
                }
                State::Finished => return Ok(false),
                State::Error | State::Destroyed => {
                    return Err(PileupError::InvalidState("pileup cannot advance"));
                }
            }
        }
    }

    fn window(&self) -> GatherWindow {
        GatherWindow {
            slice_zstart: self.slice_zstart,
            slice_xend: self.slice_xend,
            slice_end_id: self.slice_end_id,
            effective_ref_zstart: self.effective_ref_zstart,
            start_within_window: self.config.start_within_window,
        }
    }

    fn populate(&mut self, start: ChunkId, id_limit: usize) -> Result<()> {
        let window = self.window();
        self.gatherer
            .populate(&self.store, &mut self.list, &window, start, id_limit)
    }

    fn enter_chunk(&mut self) {
        self.ref_chunk_bases = None;
        self.ref_base = None;
        self.ref_chunk_xend = self.chunk_zstart(self.ref_chunk_id + 1);
        self.state = if self.ref_chunk_id >= self.gatherer.idx_chunk_id {
            State::Populate
        } else {
            State::Position
        };
    }

    /// Promote alignments starting at the cursor; false once past the window.
    fn activate(&mut self) -> bool {
        self.list.activate(self.ref_zpos);
        self.ref_base = None;
        self.ref_zpos < self.slice_xend
    }

    /// One base forward. Returns false when a chunk boundary or the window
    /// end was reached instead; `state` says which.
    fn advance_position(&mut self) -> bool {
        self.ref_zpos += 1;
        if self.ref_zpos >= self.slice_xend {
            self.state = State::Finished;
            return false;
        }
        if self.ref_zpos == self.ref_chunk_xend {
            self.ref_zpos -= 1;
            self.ref_chunk_id += 1;
            self.state = State::Chunk;
            return false;
        }
        self.list.retire(self.ref_zpos, &mut self.cache);
        self.activate()
    }

    pub(crate) fn current_reference_base(&mut self) -> Result<u8> {
        if let Some(base) = self.ref_base {
            return Ok(base);
        }
        let bases = self.chunk_bases(self.ref_chunk_id)?;
        let offset = (self.ref_zpos % self.chunk_size) as usize;
        let base = *bases.get(offset).ok_or_else(|| {
            PileupError::storage(format!(
                "reference chunk {} has no base at offset {}",
                self.ref_chunk_id, offset
            ))
        })?;
        self.ref_base = Some(base);
        Ok(base)
    }

    pub(crate) fn chunk_bases(&mut self, chunk: ChunkId) -> Result<Arc<[u8]>> {
        if chunk != self.ref_chunk_id {
            return self.reference.chunk_bases(chunk);
        }
        if let Some(bases) = &self.ref_chunk_bases {
            return Ok(Arc::clone(bases));
        }
        let bases = self.reference.chunk_bases(chunk)?;
        self.ref_chunk_bases = Some(Arc::clone(&bases));
        Ok(bases)
    }

    /// `len` reference bases from `zstart`, fetched chunk by chunk.
    pub(crate) fn reference_span(&mut self, zstart: i64, len: usize) -> Result<Vec<u8>> {
        if zstart < 0 {
            return Err(PileupError::storage(format!(
                "reference accessed at negative position {zstart}"
            )));
        }
        let mut out = Vec::with_capacity(len);
        let mut pos = zstart;
        while out.len() < len {
            let chunk = self.chunk_of(pos);
            let bases = self.chunk_bases(chunk)?;
            let offset = (pos % self.chunk_size) as usize;
            let take = (len - out.len()).min(bases.len().saturating_sub(offset));
            if take == 0 {
                return Err(PileupError::storage(format!(
                    "reference chunk {chunk} ends before offset {offset}"
                )));
            }
            out.extend_from_slice(&bases[offset..offset + take]);
            pos += take as i64;
        }
        Ok(out)
    }

    /// Gather everything overlapping the left edge of the window, including
    /// alignments that start in earlier chunks (or, on a circular reference,
    /// behind the origin).
    fn prime(&mut self) -> Result<()> {
        self.ref_chunk_id = self.slice_start_id;
        self.state = State::InitialPopulate;

        if self.config.start_within_window || !self.overlap_possible() {
            tracing::debug!(slice_zstart = self.slice_zstart, "look-behind skipped");
            return Ok(());
        }

        self.populate(self.ref_chunk_id, self.config.read_ahead_limit)?;
        let idx_chunk_id = self.gatherer.idx_chunk_id;
        let forward = self.list.take_waiting();

        let result = if self.overlap_chunk() {
            tracing::debug!(
                from = self.ref_chunk_id,
                to = self.slice_start_id,
                "look-behind from overlap hint"
            );
            self.overlap(self.slice_start_id)
        } else {
            self.rev_overlap()
        };

        self.list.append_waiting(forward);
        self.gatherer.idx_chunk_id = idx_chunk_id;
        result?;

        self.ref_chunk_id = self.slice_start_id;
        self.effective_ref_zstart = 0;
        self.state = State::InitialChunk;
        Ok(())
    }

    fn overlap_possible(&self) -> bool {
        let hints = match self.reference.overlap_hints(self.slice_start_id) {
            Ok(Some(hints)) => hints,
            Ok(None) => return true,
            Err(e) => {
                tracing::debug!(error = %e, "overlap hints unavailable");
                return true;
            }
        };
        let offset = (self.slice_zstart % self.chunk_size) as u32;
        if self.categories().any(|c| hints.get(c).max_reach > offset) {
            return true;
        }
        self.wrap
    }

    /// Move `ref_chunk_id` back to the earliest chunk the hints say holds an
    /// overlapping alignment. Returns false when no hint applies.
    fn overlap_chunk(&mut self) -> bool {
        if self.wrap {
            return false;
        }
        let hints = match self.reference.overlap_hints(self.slice_start_id) {
            Ok(Some(hints)) => hints,
            _ => return false,
        };
        let mut chunk = self.ref_chunk_id;
        let mut found = false;
        for category in self.categories() {
            if let Some(start) = hints.get(category).earliest_start {
                chunk = chunk.min(self.chunk_of(start as i64));
                found = true;
            }
        }
        self.ref_chunk_id = chunk;
        found
    }

    /// Gather chunk by chunk from `ref_chunk_id` up to, not including, `stop`.
    fn overlap(&mut self, stop: ChunkId) -> Result<()> {
        loop {
            if self.ref_chunk_id > self.reference_last_id {
                self.ref_chunk_id = self.reference_start_id;
                self.effective_ref_zstart = 0;
            }
            if self.ref_chunk_id == stop {
                return Ok(());
            }
            self.populate(self.ref_chunk_id, 0)?;
            self.ref_chunk_id = self.gatherer.idx_chunk_id;
        }
    }

    /// Walk backward one chunk at a time until the origin of a linear
    /// reference, or until enough alignments were seen to bound the reach of
    /// the longest projection.
    fn rev_overlap(&mut self) -> Result<()> {
        loop {
            if !self.wrap && self.ref_chunk_id == self.reference_start_id {
                return Ok(());
            }
            if self.list.observed >= self.config.min_align_observe {
                return self.jump_behind();
            }

            let later = self.list.take_waiting();
            if self.ref_chunk_id != self.reference_start_id {
                self.ref_chunk_id -= 1;
            } else if self.effective_ref_zstart != 0 {
                self.list.append_waiting(later);
                return Ok(());
            } else {
                self.effective_ref_zstart = -self.ref_len;
                self.ref_chunk_id = self.reference_last_id;
            }

            let result = self.populate(self.ref_chunk_id, 0);
            self.list.append_waiting(later);
            result?;
        }
    }

    /// Jump straight to `slice_zstart - max_ref_len` and gather forward to the
    /// chunk the backward walk had reached.
    fn jump_behind(&mut self) -> Result<()> {
        let stop = self.ref_chunk_id;
        let frontier = self.chunk_zstart(stop) + self.effective_ref_zstart;
        let target = self.slice_zstart - self.list.max_ref_len;

        let (chunk, effective) = if target >= 0 {
            (self.chunk_of(target), 0)
        } else if !self.wrap {
            (self.reference_start_id, 0)
        } else {
            (self.chunk_of((target + self.ref_len).max(0)), -self.ref_len)
        };
        if self.chunk_zstart(chunk) + effective >= frontier {
            return Ok(());
        }

        tracing::debug!(
            observed = self.list.observed,
            max_ref_len = self.list.max_ref_len,
            from = chunk,
            to = stop,
            "look-behind bounded by longest projection"
        );
        self.ref_chunk_id = chunk;
        self.effective_ref_zstart = effective;
        let later = self.list.take_waiting();
        let result = self.overlap(stop);
        self.list.append_waiting(later);
        result
    }
}
