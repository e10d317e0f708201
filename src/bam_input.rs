use crate::encode::AlignmentRecord;
use crate::fasta::FastaDb;
use crate::memory::{MemoryAlignmentStore, MemoryStoreBuilder};
use crate::store::{Category, ReadFilter};
use crate::types::{HashMap, HashMapExt};
use anyhow::{Context, Result};
use noodles::sam::alignment::record::cigar::{Op as SamCigarOp, op::Kind as CigarKind};
use rust_htslib::bam;
use rust_htslib::bam::Read as HtsRead;
use rust_htslib::bam::record::Cigar;
use std::path::Path;

const MISSING_QUALITY: u8 = 255;

#[derive(Debug, Default)]
pub struct LoadStats {
    pub total_records: u64,
    pub unmapped_records: u64,
    pub secondary_records: u64,
    /// Records whose reference is not in the FASTA, or that failed to encode.
    pub skipped_records: u64,
}

/// Alignment stores per reference name, ready to build.
pub struct LoadedAlignments {
    pub stores: HashMap<String, MemoryStoreBuilder>,
    pub stats: LoadStats,
}

impl LoadedAlignments {
    pub fn take_store(&mut self, name: &str, chunk_size: u32) -> MemoryAlignmentStore {
        self.stores
            .remove(name)
            .unwrap_or_else(|| MemoryAlignmentStore::builder(chunk_size))
            .build()
    }
}

/// Read every mapped record of `path`, encoding it against `fasta`.
///
/// With `only` set, records on other references are ignored.
pub fn load_alignments(
    path: &Path,
    fasta: &FastaDb,
    chunk_size: u32,
    only: Option<&str>,
) -> Result<LoadedAlignments> {
    let mut reader = bam::Reader::from_path(path)
        .with_context(|| format!("failed to open alignments {}", path.display()))?;
    let target_names: Vec<String> = reader
        .header()
        .target_names()
        .iter()
        .map(|n| String::from_utf8_lossy(n).to_string())
        .collect();

    let mut stores: HashMap<String, MemoryStoreBuilder> = HashMap::new();
    let mut stats = LoadStats::default();
    for result in reader.records() {
        let record = result.with_context(|| format!("failed to read {}", path.display()))?;
        stats.total_records += 1;
        if record.is_unmapped() || record.tid() < 0 {
            stats.unmapped_records += 1;
            continue;
        }
        let Some(name) = target_names.get(record.tid() as usize) else {
            stats.skipped_records += 1;
            continue;
        };
        if only.is_some_and(|only| only != name) {
            continue;
        }
        let Some(reference) = fasta.get(name) else {
            stats.skipped_records += 1;
            continue;
        };

        let ops: Vec<SamCigarOp> = record.cigar().iter().map(to_sam_op).collect();
        let read = record.seq().as_bytes();
        let quality = record.qual();
        let quality: &[u8] = if quality.first() == Some(&MISSING_QUALITY) { &[] } else { quality };

        let start = record.pos() as u64;
        let encoded = match AlignmentRecord::encode(start, &ops, &read, quality, reference) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::debug!(
                    read = %String::from_utf8_lossy(record.qname()),
                    error = %e,
                    "skipping alignment"
                );
                stats.skipped_records += 1;
                continue;
            }
        };

        let read_filter = if record.is_quality_check_failed() {
            ReadFilter::Reject
        } else if record.is_duplicate() {
            ReadFilter::Criteria
        } else {
            ReadFilter::Pass
        };
        let secondary = record.is_secondary() || record.is_supplementary();
        if secondary {
            stats.secondary_records += 1;
        }
        let encoded = encoded
            .with_map_qual(record.mapq() as i32)
            .with_read_filter(read_filter)
            .with_reverse(record.is_reverse());

        stores
            .entry(name.clone())
            .or_insert_with(|| MemoryAlignmentStore::builder(chunk_size))
            .push(Category::from_secondary(secondary), encoded);
    }

    Ok(LoadedAlignments { stores, stats })
}

fn to_sam_op(cigar: &Cigar) -> SamCigarOp {
    let (kind, len) = match *cigar {
        Cigar::Match(n) => (CigarKind::Match, n),
        Cigar::Ins(n) => (CigarKind::Insertion, n),
        Cigar::Del(n) => (CigarKind::Deletion, n),
        Cigar::RefSkip(n) => (CigarKind::Skip, n),
        Cigar::SoftClip(n) => (CigarKind::SoftClip, n),
        Cigar::HardClip(n) => (CigarKind::HardClip, n),
        Cigar::Pad(n) => (CigarKind::Pad, n),
        Cigar::Equal(n) => (CigarKind::SequenceMatch, n),
        Cigar::Diff(n) => (CigarKind::SequenceMismatch, n),
    };
    SamCigarOp::new(kind, len as usize)
}
