mod common;

use common::{Fixture, advance_by, depths};
use pileup_rs::{
    AlignmentRecord, Category, Column, MapQualBound, MemoryAlignmentStore, MemoryReference, Pileup,
    PileupConfig, PileupError, ReadFilter, filter_bits,
};

#[test]
fn first_positions_are_consecutive() {
    let mut fixture = Fixture::new(1000, 100);
    fixture.primary(AlignmentRecord::matching(0, 50));
    let mut pileup = fixture.pileup(PileupConfig::default());

    for expected in 0..3u64 {
        assert!(pileup.advance().unwrap());
        assert_eq!(pileup.reference_position().unwrap(), expected);
        assert_eq!(pileup.depth().unwrap(), 1);
    }
    assert_eq!(pileup.reference_name().unwrap(), "ref");
}

#[test]
fn single_base_alignment_at_85() {
    let mut fixture = Fixture::new(1000, 100);
    fixture.primary(AlignmentRecord::matching(85, 1));
    let mut pileup = fixture.pileup(PileupConfig::default());

    advance_by(&mut pileup, 85);
    assert_eq!(pileup.reference_position().unwrap(), 84);
    assert_eq!(pileup.depth().unwrap(), 0);

    advance_by(&mut pileup, 1);
    assert_eq!(pileup.reference_position().unwrap(), 85);
    assert_eq!(pileup.depth().unwrap(), 1);

    advance_by(&mut pileup, 1);
    assert_eq!(pileup.depth().unwrap(), 0);
}

#[test]
fn overlapping_alignments_across_chunk_boundary() {
    let mut fixture = Fixture::new(1000, 100);
    fixture
        .primary(AlignmentRecord::matching(184, 30))
        .primary(AlignmentRecord::matching(185, 30));
    let mut pileup = fixture.pileup(PileupConfig::default());

    advance_by(&mut pileup, 185);
    assert_eq!(pileup.reference_position().unwrap(), 184);
    assert_eq!(pileup.depth().unwrap(), 1);
    advance_by(&mut pileup, 1);
    assert_eq!(pileup.depth().unwrap(), 2);
}

#[test]
fn depth_matches_covering_alignments() {
    let mut fixture = Fixture::new(400, 64);
    let spans = [(0u64, 10u32), (5, 100), (63, 2), (64, 64), (120, 200), (399, 1)];
    for &(start, len) in &spans {
        fixture.primary(AlignmentRecord::matching(start, len));
    }
    let mut pileup = fixture.pileup(PileupConfig::default());

    let observed = depths(&mut pileup);
    assert_eq!(observed.len(), 400);
    for (position, depth) in observed {
        let expected = spans
            .iter()
            .filter(|&&(start, len)| start <= position && position < start + len as u64)
            .count();
        assert_eq!(depth, expected, "depth at {position}");
    }
}

#[test]
fn small_read_ahead_batches_give_same_depths() {
    let mut fixture = Fixture::new(500, 32);
    for i in 0..40u64 {
        fixture.primary(AlignmentRecord::matching(i * 11 % 470, (i % 7 + 1) as u32 * 5));
    }
    let full = depths(&mut fixture.pileup(PileupConfig::default()));
    let config = PileupConfig { read_ahead_limit: 1, ..PileupConfig::default() };
    let batched = depths(&mut fixture.pileup(config));
    assert_eq!(full, batched);
}

#[test]
fn advance_is_idempotent_after_the_end() {
    let mut fixture = Fixture::new(10, 4);
    fixture.primary(AlignmentRecord::matching(2, 3));
    let mut pileup = fixture.pileup(PileupConfig::default());

    advance_by(&mut pileup, 10);
    assert!(!pileup.advance().unwrap());
    assert!(!pileup.advance().unwrap());
    assert!(pileup.is_finished());
    assert!(matches!(pileup.reference_position(), Err(PileupError::Exhausted(_))));
    assert!(matches!(pileup.depth(), Err(PileupError::Exhausted(_))));
    assert!(matches!(pileup.next_event(), Err(PileupError::Exhausted(_))));
}

#[test]
fn accessors_fail_before_first_advance() {
    let mut fixture = Fixture::new(10, 4);
    fixture.primary(AlignmentRecord::matching(2, 3));
    let mut pileup = fixture.pileup(PileupConfig::default());

    assert!(matches!(pileup.reference_position(), Err(PileupError::InvalidState(_))));
    assert!(matches!(pileup.reference_name(), Err(PileupError::InvalidState(_))));
    assert!(matches!(pileup.depth(), Err(PileupError::InvalidState(_))));
    assert!(matches!(pileup.reference_base(), Err(PileupError::InvalidState(_))));
    assert!(matches!(pileup.next_event(), Err(PileupError::InvalidState(_))));
}

#[test]
fn closed_pileup_rejects_every_call() {
    let mut fixture = Fixture::new(10, 4);
    fixture.primary(AlignmentRecord::matching(0, 3));
    let mut pileup = fixture.pileup(PileupConfig::default());
    advance_by(&mut pileup, 1);
    assert!(pileup.next_event().unwrap());
    assert!(pileup.cached_bytes() > 0);

    pileup.close();
    assert_eq!(pileup.cached_bytes(), 0);
    assert!(matches!(pileup.advance(), Err(PileupError::InvalidState(_))));
    assert!(matches!(pileup.depth(), Err(PileupError::InvalidState(_))));
    assert!(matches!(pileup.alignment_id(), Err(PileupError::InvalidState(_))));
}

#[test]
fn reference_bases_follow_the_sequence() {
    let fixture = Fixture::new(20, 8);
    let mut pileup = fixture.pileup(PileupConfig::default());
    let mut bases = Vec::new();
    while pileup.advance().unwrap() {
        bases.push(pileup.reference_base().unwrap());
    }
    assert_eq!(bases, fixture.bases);
}

#[test]
fn slice_reports_only_its_window() {
    let mut fixture = Fixture::new(6000, 100);
    fixture.primary(AlignmentRecord::matching(5400, 40));
    let mut pileup = fixture.slice(PileupConfig::default(), 5431, 2);

    assert_eq!(depths(&mut pileup), vec![(5431, 1), (5432, 1)]);
}

#[test]
fn slice_is_clipped_to_the_reference_end() {
    let fixture = Fixture::new(1000, 100);
    let mut pileup = fixture.slice(PileupConfig::default(), 990, 50);
    let positions: Vec<u64> = depths(&mut pileup).into_iter().map(|(p, _)| p).collect();
    assert_eq!(positions, (990..1000).collect::<Vec<_>>());
}

#[test]
fn empty_slice_finishes_immediately() {
    let fixture = Fixture::new(100, 10);
    let mut pileup = fixture.slice(PileupConfig::default(), 10, 0);
    assert!(!pileup.advance().unwrap());
    assert!(!pileup.advance().unwrap());
}

#[test]
fn slice_start_past_the_end_is_out_of_range() {
    let fixture = Fixture::new(100, 10);
    let (reference, store) = fixture.parts();
    let err = Pileup::slice(reference, store, PileupConfig::default(), 100, 5).err();
    assert_eq!(err, Some(PileupError::OutOfRange { start: 100, length: 100 }));
}

#[test]
fn zero_chunk_size_is_rejected() {
    let reference = MemoryReference::new("ref", b"ACGT", 0);
    let store = MemoryAlignmentStore::builder(0).build();
    assert!(matches!(
        Pileup::new(reference, store, PileupConfig::default()),
        Err(PileupError::Storage(_))
    ));
}

fn filtered_fixture(filter: ReadFilter) -> Fixture {
    let mut fixture = Fixture::new(300, 50);
    fixture
        .primary(AlignmentRecord::matching(10, 100))
        .primary(AlignmentRecord::matching(60, 40).with_read_filter(filter));
    fixture
}

fn depth_difference(fixture: &Fixture, wider: PileupConfig) -> Vec<u64> {
    let default = depths(&mut fixture.pileup(PileupConfig::default()));
    let wider = depths(&mut fixture.pileup(wider));
    default
        .iter()
        .zip(wider.iter())
        .filter_map(|(&(p, a), &(_, b))| {
            assert!(b >= a);
            assert!(b - a <= 1);
            (b != a).then_some(p)
        })
        .collect()
}

#[test]
fn rejected_reads_need_pass_bad() {
    let fixture = filtered_fixture(ReadFilter::Reject);
    let config = PileupConfig::from_filter_bits(true, false, filter_bits::PASS_BAD, 0);
    assert_eq!(depth_difference(&fixture, config), (60..100).collect::<Vec<_>>());
}

#[test]
fn duplicates_need_pass_dups() {
    let fixture = filtered_fixture(ReadFilter::Criteria);
    let bad_only = PileupConfig::from_filter_bits(true, false, filter_bits::PASS_BAD, 0);
    assert!(depth_difference(&fixture, bad_only).is_empty());
    let dups = PileupConfig::from_filter_bits(true, false, filter_bits::PASS_DUPS, 0);
    assert_eq!(depth_difference(&fixture, dups), (60..100).collect::<Vec<_>>());
}

#[test]
fn redacted_reads_are_never_reported() {
    let fixture = filtered_fixture(ReadFilter::Redacted);
    let config = PileupConfig::from_filter_bits(
        true,
        false,
        filter_bits::PASS_BAD | filter_bits::PASS_DUPS,
        0,
    );
    assert!(depth_difference(&fixture, config).is_empty());
}

#[test]
fn mapping_quality_bounds() {
    let mut fixture = Fixture::new(100, 10);
    fixture
        .primary(AlignmentRecord::matching(0, 10).with_map_qual(10))
        .primary(AlignmentRecord::matching(0, 10).with_map_qual(40));

    let at_least = PileupConfig::from_filter_bits(true, false, filter_bits::MIN_MAP_QUALITY, 30);
    assert_eq!(at_least.map_qual, Some(MapQualBound::AtLeast(30)));
    let mut pileup = fixture.pileup(at_least);
    advance_by(&mut pileup, 1);
    assert_eq!(pileup.depth().unwrap(), 1);
    assert!(pileup.next_event().unwrap());
    assert_eq!(pileup.mapping_quality().unwrap(), 40);

    let at_most = PileupConfig::from_filter_bits(true, false, filter_bits::MAX_MAP_QUALITY, 30);
    let mut pileup = fixture.pileup(at_most);
    advance_by(&mut pileup, 1);
    assert!(pileup.next_event().unwrap());
    assert_eq!(pileup.mapping_quality().unwrap(), 10);

    let both = PileupConfig::from_filter_bits(
        true,
        false,
        filter_bits::MIN_MAP_QUALITY | filter_bits::MAX_MAP_QUALITY,
        30,
    );
    assert_eq!(both.map_qual, Some(MapQualBound::AtLeast(30)));
}

#[test]
fn secondary_alignments_are_opt_in() {
    let mut fixture = Fixture::new(100, 10);
    fixture
        .secondary(AlignmentRecord::matching(5, 10))
        .primary(AlignmentRecord::matching(5, 10));

    let mut pileup = fixture.pileup(PileupConfig::default());
    advance_by(&mut pileup, 6);
    assert_eq!(pileup.depth().unwrap(), 1);

    let mut pileup = fixture.pileup(PileupConfig::default().with_secondary(true));
    advance_by(&mut pileup, 6);
    assert_eq!(pileup.depth().unwrap(), 2);
    // equal spans: primary first
    assert!(pileup.next_event().unwrap());
    assert_eq!(pileup.alignment_id().unwrap().category, Category::Primary);
    assert!(pileup.next_event().unwrap());
    let id = pileup.alignment_id().unwrap();
    assert_eq!(id.category, Category::Secondary);
    assert_eq!(id.to_string(), "SA.1");

    let secondary_only =
        PileupConfig { wants_primary: false, ..PileupConfig::default() }.with_secondary(true);
    let mut pileup = fixture.pileup(secondary_only);
    advance_by(&mut pileup, 6);
    assert_eq!(pileup.depth().unwrap(), 1);
}

#[test]
fn start_within_window_drops_earlier_alignments() {
    let mut fixture = Fixture::new(300, 50);
    fixture
        .primary(AlignmentRecord::matching(50, 100))
        .primary(AlignmentRecord::matching(105, 10));

    let mut pileup = fixture.slice(PileupConfig::default(), 100, 10);
    assert_eq!(depths(&mut pileup)[5], (105, 2));

    let config = PileupConfig::from_filter_bits(true, false, filter_bits::START_WITHIN_WINDOW, 0);
    let mut pileup = fixture.slice(config, 100, 10);
    let observed = depths(&mut pileup);
    assert_eq!(observed[0], (100, 0));
    assert_eq!(observed[5], (105, 1));
}

#[test]
fn storage_failure_is_sticky() {
    let mut builder =
        MemoryAlignmentStore::builder(10).failing_column(Category::Primary, Column::RefLen);
    builder.push(Category::Primary, AlignmentRecord::matching(0, 5));
    let reference = MemoryReference::new("ref", &common::sequence(50), 10);
    let mut pileup = Pileup::new(reference, builder.build(), PileupConfig::default()).unwrap();

    assert!(matches!(pileup.advance(), Err(PileupError::Storage(_))));
    assert!(matches!(pileup.advance(), Err(PileupError::InvalidState(_))));
    assert!(matches!(pileup.depth(), Err(PileupError::InvalidState(_))));
}

#[test]
fn empty_layout_cell_is_a_sticky_storage_error() {
    for column in [Column::RefPos, Column::RefLen, Column::ReadFilter] {
        let mut builder =
            MemoryAlignmentStore::builder(10).empty_cell(Category::Primary, column, 2);
        builder.push(Category::Primary, AlignmentRecord::matching(0, 5));
        builder.push(Category::Primary, AlignmentRecord::matching(1, 5));
        let reference = MemoryReference::new("ref", &common::sequence(50), 10);
        let mut pileup = Pileup::new(reference, builder.build(), PileupConfig::default()).unwrap();

        match pileup.advance() {
            Err(PileupError::Storage(message)) => assert!(message.contains(".2 "), "{message}"),
            other => panic!("{column:?}: expected a storage error, got {other:?}"),
        }
        assert!(matches!(pileup.advance(), Err(PileupError::InvalidState(_))));
        assert!(matches!(pileup.depth(), Err(PileupError::InvalidState(_))));
    }
}

#[test]
fn first_chunk_row_id_is_respected() {
    let bases = common::sequence(100);
    let mut builder = MemoryAlignmentStore::builder(10).first_chunk(7);
    builder.push(Category::Primary, AlignmentRecord::matching(42, 3));
    let reference = MemoryReference::new("ref", &bases, 10).first_chunk(7);
    let mut pileup = Pileup::new(reference, builder.build(), PileupConfig::default()).unwrap();

    let covered: Vec<u64> = depths(&mut pileup)
        .into_iter()
        .filter(|&(_, depth)| depth > 0)
        .map(|(p, _)| p)
        .collect();
    assert_eq!(covered, vec![42, 43, 44]);
}
