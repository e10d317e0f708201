#![allow(dead_code)]

use pileup_rs::{
    AlignmentId, AlignmentRecord, Category, MemoryAlignmentStore, MemoryReference, Pileup,
    PileupConfig, parse_cigar,
};

/// `ACGT` repeated to `len` bases.
pub fn sequence(len: usize) -> Vec<u8> {
    b"ACGT".iter().copied().cycle().take(len).collect()
}

pub fn encode(reference: &[u8], start: u64, cigar: &str, read: &[u8]) -> AlignmentRecord {
    let ops = parse_cigar(cigar).expect("valid cigar");
    AlignmentRecord::encode(start, &ops, read, &[], reference).expect("encodable alignment")
}

#[derive(Clone)]
pub struct Fixture {
    pub bases: Vec<u8>,
    pub chunk_size: u32,
    pub circular: bool,
    pub hints: bool,
    pub records: Vec<(Category, AlignmentRecord)>,
}

impl Fixture {
    pub fn new(len: usize, chunk_size: u32) -> Self {
        Self {
            bases: sequence(len),
            chunk_size,
            circular: false,
            hints: false,
            records: Vec::new(),
        }
    }

    pub fn circular(mut self) -> Self {
        self.circular = true;
        self
    }

    pub fn with_hints(mut self) -> Self {
        self.hints = true;
        self
    }

    pub fn primary(&mut self, record: AlignmentRecord) -> &mut Self {
        self.records.push((Category::Primary, record));
        self
    }

    pub fn secondary(&mut self, record: AlignmentRecord) -> &mut Self {
        self.records.push((Category::Secondary, record));
        self
    }

    pub fn parts(&self) -> (MemoryReference, MemoryAlignmentStore) {
        let mut builder = MemoryAlignmentStore::builder(self.chunk_size);
        for (category, record) in &self.records {
            builder.push(*category, record.clone());
        }
        let store = builder.build();
        let mut reference =
            MemoryReference::new("ref", &self.bases, self.chunk_size).circular(self.circular);
        if self.hints {
            reference = reference.with_overlap_hints(store.overlap_hints(self.bases.len() as u64));
        }
        (reference, store)
    }

    pub fn pileup(&self, config: PileupConfig) -> Pileup<MemoryReference, MemoryAlignmentStore> {
        let (reference, store) = self.parts();
        Pileup::new(reference, store, config).expect("pileup")
    }

    pub fn slice(
        &self,
        config: PileupConfig,
        offset: u64,
        length: u64,
    ) -> Pileup<MemoryReference, MemoryAlignmentStore> {
        let (reference, store) = self.parts();
        Pileup::slice(reference, store, config, offset, length).expect("slice")
    }
}

/// Per-position depth for the whole window.
pub fn depths(pileup: &mut Pileup<MemoryReference, MemoryAlignmentStore>) -> Vec<(u64, usize)> {
    let mut out = Vec::new();
    while pileup.advance().unwrap() {
        out.push((pileup.reference_position().unwrap(), pileup.depth().unwrap()));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub id: AlignmentId,
    pub bits: u32,
    pub base: u8,
    pub quality: u8,
}

/// Every event of every position, in iteration order.
pub fn events(
    pileup: &mut Pileup<MemoryReference, MemoryAlignmentStore>,
) -> Vec<(u64, Vec<Observed>)> {
    let mut out = Vec::new();
    while pileup.advance().unwrap() {
        let position = pileup.reference_position().unwrap();
        out.push((position, position_events(pileup)));
    }
    out
}

pub fn position_events(
    pileup: &mut Pileup<MemoryReference, MemoryAlignmentStore>,
) -> Vec<Observed> {
    let mut events = Vec::new();
    while pileup.next_event().unwrap() {
        events.push(Observed {
            id: pileup.alignment_id().unwrap(),
            bits: pileup.event_type().unwrap().bits(),
            base: pileup.alignment_base().unwrap(),
            quality: pileup.alignment_quality().unwrap(),
        });
    }
    events
}

/// Advance `steps` times, asserting each step lands on a position.
pub fn advance_by(pileup: &mut Pileup<MemoryReference, MemoryAlignmentStore>, steps: usize) {
    for _ in 0..steps {
        assert!(pileup.advance().unwrap());
    }
}
