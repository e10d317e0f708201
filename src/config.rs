/// Filter bit values accepted by [`PileupConfig::from_filter_bits`].
pub mod filter_bits {
    pub const PASS_BAD: u32 = 0x01;
    pub const PASS_DUPS: u32 = 0x02;
    pub const MIN_MAP_QUALITY: u32 = 0x04;
    pub const MAX_MAP_QUALITY: u32 = 0x08;
    pub const NO_WRAPAROUND: u32 = 0x10;
    pub const START_WITHIN_WINDOW: u32 = 0x20;
}

/// Mapping-quality bound applied to alignments whose read filter is `Pass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapQualBound {
    AtLeast(i32),
    AtMost(i32),
}

impl MapQualBound {
    pub fn accepts(self, mapq: i32) -> bool {
        match self {
            MapQualBound::AtLeast(bound) => mapq >= bound,
            MapQualBound::AtMost(bound) => mapq <= bound,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct PileupConfig {
    pub wants_primary: bool,
    pub wants_secondary: bool,
    /// Include alignments whose read filter is `Reject`.
    pub pass_bad: bool,
    /// Include alignments whose read filter is `Criteria` (duplicates).
    pub pass_duplicates: bool,
    pub map_qual: Option<MapQualBound>,
    /// Skip the circular part of look-behind.
    pub no_wraparound: bool,
    /// Only report alignments that start inside the window.
    pub start_within_window: bool,
    /// Alignment ids gathered per read-ahead batch.
    pub read_ahead_limit: usize,
    /// Alignments that must be observed before `max_projection_length`
    /// is trusted to bound look-behind.
    pub min_align_observe: u64,
    /// Byte budget for pinned column blobs.
    pub cached_blob_limit: usize,
}

impl PileupConfig {
    pub const DEFAULT_READ_AHEAD_LIMIT: usize = 10_000;
    pub const DEFAULT_MIN_ALIGN_OBSERVE: u64 = 100;
    pub const DEFAULT_CACHED_BLOB_LIMIT: usize = 1 << 30;

    /// Build a configuration from NGS-style filter bits and a map-quality bound.
    pub fn from_filter_bits(
        wants_primary: bool,
        wants_secondary: bool,
        bits: u32,
        map_qual: i32,
    ) -> Self {
        let map_qual = if bits & filter_bits::MIN_MAP_QUALITY != 0 {
            Some(MapQualBound::AtLeast(map_qual))
        } else if bits & filter_bits::MAX_MAP_QUALITY != 0 {
            Some(MapQualBound::AtMost(map_qual))
        } else {
            None
        };
        Self {
            wants_primary,
            wants_secondary,
            pass_bad: bits & filter_bits::PASS_BAD != 0,
            pass_duplicates: bits & filter_bits::PASS_DUPS != 0,
            map_qual,
            no_wraparound: bits & filter_bits::NO_WRAPAROUND != 0,
            start_within_window: bits & filter_bits::START_WITHIN_WINDOW != 0,
            ..Self::default()
        }
    }

    pub fn with_secondary(mut self, wants_secondary: bool) -> Self {
        self.wants_secondary = wants_secondary;
        self
    }

    pub fn with_cached_blob_limit(mut self, limit: usize) -> Self {
        self.cached_blob_limit = limit;
        self
    }
}

impl Default for PileupConfig {
    fn default() -> Self {
        Self {
            wants_primary: true,
            wants_secondary: false,
            pass_bad: false,
            pass_duplicates: false,
            map_qual: None,
            no_wraparound: false,
            start_within_window: false,
            read_ahead_limit: Self::DEFAULT_READ_AHEAD_LIMIT,
            min_align_observe: Self::DEFAULT_MIN_ALIGN_OBSERVE,
            cached_blob_limit: Self::DEFAULT_CACHED_BLOB_LIMIT,
        }
    }
}
