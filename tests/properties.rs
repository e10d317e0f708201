mod common;

use common::{Fixture, depths, events};
use pileup_rs::{AlignmentRecord, MapQualBound, PileupConfig, ReadFilter};
use proptest::prelude::*;

const REF_LEN: usize = 500;

#[derive(Debug, Clone)]
struct Placed {
    start: u64,
    len: u32,
    secondary: bool,
    filter: ReadFilter,
    map_qual: i32,
}

fn placed() -> impl Strategy<Value = Placed> {
    (0u64..400, 1u32..60, any::<bool>(), 0u8..4, 0i32..60).prop_map(
        |(start, len, secondary, filter, map_qual)| Placed {
            start,
            len,
            secondary,
            filter: ReadFilter::from_u8(filter).unwrap(),
            map_qual,
        },
    )
}

fn config() -> impl Strategy<Value = PileupConfig> {
    (
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop_oneof![
            Just(None),
            Just(Some(MapQualBound::AtLeast(30))),
            Just(Some(MapQualBound::AtMost(30)))
        ],
        prop_oneof![Just(1usize), Just(10_000usize)],
    )
        .prop_map(
            |(wants_secondary, pass_bad, pass_duplicates, map_qual, read_ahead_limit)| {
                PileupConfig {
                    wants_secondary,
                    pass_bad,
                    pass_duplicates,
                    map_qual,
                    read_ahead_limit,
                    ..PileupConfig::default()
                }
            },
        )
}

fn fixture(alignments: &[Placed], chunk_size: u32, hints: bool) -> Fixture {
    let mut fixture = Fixture::new(REF_LEN, chunk_size);
    if hints {
        fixture = fixture.with_hints();
    }
    for a in alignments {
        let record = AlignmentRecord::matching(a.start, a.len)
            .with_read_filter(a.filter)
            .with_map_qual(a.map_qual);
        if a.secondary {
            fixture.secondary(record);
        } else {
            fixture.primary(record);
        }
    }
    fixture
}

fn kept(a: &Placed, config: &PileupConfig) -> bool {
    let wanted = if a.secondary { config.wants_secondary } else { config.wants_primary };
    let passes = match a.filter {
        ReadFilter::Pass => config.map_qual.is_none_or(|bound| bound.accepts(a.map_qual)),
        ReadFilter::Reject => config.pass_bad,
        ReadFilter::Criteria => config.pass_duplicates,
        ReadFilter::Redacted => false,
    };
    wanted && passes
}

fn brute_depth(alignments: &[Placed], config: &PileupConfig, pos: u64) -> usize {
    alignments
        .iter()
        .filter(|a| kept(a, config) && a.start <= pos && pos < a.start + a.len as u64)
        .count()
}

proptest! {
    #[test]
    fn depth_counts_covering_alignments(
        alignments in prop::collection::vec(placed(), 0..80),
        chunk_size in prop_oneof![Just(16u32), Just(50), Just(100)],
        hints in any::<bool>(),
        config in config(),
    ) {
        let fixture = fixture(&alignments, chunk_size, hints);
        let observed = depths(&mut fixture.pileup(config.clone()));

        prop_assert_eq!(observed.len(), REF_LEN);
        for (pos, depth) in observed {
            prop_assert_eq!(depth, brute_depth(&alignments, &config, pos), "position {}", pos);
        }
    }

    #[test]
    fn slice_agrees_with_full_walk(
        alignments in prop::collection::vec(placed(), 1..80),
        chunk_size in prop_oneof![Just(16u32), Just(50), Just(100)],
        hints in any::<bool>(),
        config in config(),
        offset in 0u64..REF_LEN as u64,
        length in 1u64..200,
    ) {
        let fixture = fixture(&alignments, chunk_size, hints);
        let full = events(&mut fixture.pileup(config.clone()));
        let sliced = events(&mut fixture.slice(config, offset, length));

        let end = (offset + length).min(REF_LEN as u64) as usize;
        prop_assert_eq!(sliced, full[offset as usize..end].to_vec());
    }

    #[test]
    fn small_cache_budget_keeps_events(
        alignments in prop::collection::vec(placed(), 1..80),
        chunk_size in prop_oneof![Just(16u32), Just(50), Just(100)],
        config in config(),
        limit in 64usize..4000,
    ) {
        let fixture = fixture(&alignments, chunk_size, false);
        let unlimited = events(&mut fixture.pileup(config.clone()));
        let limited = events(&mut fixture.pileup(config.with_cached_blob_limit(limit)));

        prop_assert_eq!(limited, unlimited);
    }
}
