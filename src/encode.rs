//! Encoding of CIGAR-described alignments into the per-base edit columns the
//! event decoder walks.

use crate::store::ReadFilter;
use noodles::sam::alignment::record::cigar::{Op as SamCigarOp, op::Kind as CigarKind};
use noodles::sam::record::Cigar as RecordCigar;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("invalid CIGAR string {0:?}")]
    InvalidCigar(String),

    #[error("CIGAR consumes {cigar} read bases but the read has {read}")]
    SequenceLength { cigar: usize, read: usize },

    #[error("quality length {quality} does not match read length {read}")]
    QualityLength { quality: usize, read: usize },

    #[error("alignment projects onto zero reference bases")]
    EmptyProjection,
}

/// Values of the edit-offset-type column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RefOffsetType {
    Normal = 0,
    SoftClip = 1,
    IntronPlus = 2,
    IntronMinus = 3,
    IntronUnknown = 4,
    CompleteGenomics = 5,
}

impl RefOffsetType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RefOffsetType::Normal),
            1 => Some(RefOffsetType::SoftClip),
            2 => Some(RefOffsetType::IntronPlus),
            3 => Some(RefOffsetType::IntronMinus),
            4 => Some(RefOffsetType::IntronUnknown),
            5 => Some(RefOffsetType::CompleteGenomics),
            _ => None,
        }
    }
}

/// One alignment expressed as the column cells an alignment store serves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentRecord {
    /// Zero-based start of the projection on the reference.
    pub ref_start: u64,
    pub ref_len: u32,
    pub map_qual: i32,
    pub read_filter: ReadFilter,
    pub reverse: bool,
    pub has_mismatch: Vec<u8>,
    pub has_ref_offset: Vec<u8>,
    pub ref_offset: Vec<i32>,
    pub ref_offset_type: Vec<u8>,
    pub mismatch: Vec<u8>,
    /// Phred values without the text offset.
    pub quality: Vec<u8>,
}

impl AlignmentRecord {
    /// A gap-free alignment whose bases all agree with `reference`.
    pub fn matching(ref_start: u64, len: u32) -> Self {
        let len = len.max(1);
        Self {
            ref_start,
            ref_len: len,
            has_mismatch: vec![0; len as usize],
            has_ref_offset: vec![0; len as usize],
            quality: vec![30; len as usize],
            ..Self::default()
        }
    }

    /// Encode an alignment of `read` starting at zero-based `ref_start`.
    ///
    /// An empty `quality` is treated as all zeros.
    pub fn encode(
        ref_start: u64,
        ops: &[SamCigarOp],
        read: &[u8],
        quality: &[u8],
        reference: &[u8],
    ) -> Result<Self, EncodeError> {
        let runs = normalize_ops(ops);
        let consumed: usize = runs
            .iter()
            .filter(|(kind, _)| consumes_read(*kind))
            .map(|(_, len)| *len)
            .sum();
        if consumed != read.len() {
            return Err(EncodeError::SequenceLength { cigar: consumed, read: read.len() });
        }
        let quality = if quality.is_empty() {
            vec![0; read.len()]
        } else if quality.len() != read.len() {
            return Err(EncodeError::QualityLength { quality: quality.len(), read: read.len() });
        } else {
            quality.to_vec()
        };

        let mut record = AlignmentRecord {
            ref_start,
            has_mismatch: vec![0; read.len()],
            has_ref_offset: vec![0; read.len()],
            quality,
            ..Self::default()
        };

        let ref_base = |pos: i64| -> Option<u8> {
            if pos < 0 || reference.is_empty() {
                return None;
            }
            let pos = pos as usize;
            reference.get(pos).or_else(|| reference.get(pos % reference.len())).copied()
        };

        let mut read_pos = 0usize;
        let mut ref_pos = ref_start as i64;
        let mut projected = 0u64;
        let mut pending_gap: Option<(u32, RefOffsetType)> = None;

        for &(kind, len) in &runs {
            match kind {
                CigarKind::SoftClip => {
                    record.mark(read_pos, -(len as i32), RefOffsetType::SoftClip);
                    for &base in &read[read_pos..read_pos + len] {
                        record.push_mismatch(read_pos, base);
                        read_pos += 1;
                    }
                    pending_gap = None;
                }
                CigarKind::Insertion => {
                    record.mark(read_pos, -(len as i32), RefOffsetType::Normal);
                    for j in 0..len {
                        let shifted = ref_pos - (len - j) as i64;
                        let base = read[read_pos];
                        if !same_base(ref_base(shifted), base) {
                            record.push_mismatch(read_pos, base);
                        }
                        read_pos += 1;
                    }
                }
                CigarKind::Deletion | CigarKind::Skip => {
                    let kind = if kind == CigarKind::Skip {
                        RefOffsetType::IntronUnknown
                    } else {
                        RefOffsetType::Normal
                    };
                    pending_gap = match pending_gap {
                        Some((n, RefOffsetType::Normal)) => Some((n + len as u32, kind)),
                        Some((n, existing)) => Some((n + len as u32, existing)),
                        None => Some((len as u32, kind)),
                    };
                }
                CigarKind::Match | CigarKind::SequenceMatch | CigarKind::SequenceMismatch => {
                    if let Some((gap, gap_type)) = pending_gap.take() {
                        record.mark(read_pos, gap as i32, gap_type);
                        ref_pos += gap as i64;
                        projected += gap as u64;
                    }
                    for _ in 0..len {
                        let base = read[read_pos];
                        if !same_base(ref_base(ref_pos), base) {
                            record.push_mismatch(read_pos, base);
                        }
                        read_pos += 1;
                        ref_pos += 1;
                    }
                    projected += len as u64;
                }
                CigarKind::HardClip | CigarKind::Pad => {}
            }
        }

        if projected == 0 {
            return Err(EncodeError::EmptyProjection);
        }
        record.ref_len = projected as u32;
        Ok(record)
    }

    pub fn with_map_qual(mut self, map_qual: i32) -> Self {
        self.map_qual = map_qual;
        self
    }

    pub fn with_read_filter(mut self, read_filter: ReadFilter) -> Self {
        self.read_filter = read_filter;
        self
    }

    pub fn with_reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn ref_end(&self) -> u64 {
        self.ref_start + self.ref_len as u64
    }

    fn mark(&mut self, read_pos: usize, offset: i32, kind: RefOffsetType) {
        self.has_ref_offset[read_pos] = 1;
        self.ref_offset.push(offset);
        self.ref_offset_type.push(kind as u8);
    }

    fn push_mismatch(&mut self, read_pos: usize, base: u8) {
        self.has_mismatch[read_pos] = 1;
        self.mismatch.push(base);
    }
}

fn same_base(reference: Option<u8>, read: u8) -> bool {
    reference.is_some_and(|r| r.eq_ignore_ascii_case(&read))
}

fn consumes_read(kind: CigarKind) -> bool {
    matches!(
        kind,
        CigarKind::Match
            | CigarKind::Insertion
            | CigarKind::SoftClip
            | CigarKind::SequenceMatch
            | CigarKind::SequenceMismatch
    )
}

fn is_gap(kind: CigarKind) -> bool {
    matches!(kind, CigarKind::Deletion | CigarKind::Skip)
}

/// Drop empty and non-consuming ops, merge runs of the same kind and move
/// insertions ahead of adjacent reference gaps so that every gap lands on an
/// aligned base.
fn normalize_ops(ops: &[SamCigarOp]) -> Vec<(CigarKind, usize)> {
    let mut runs: Vec<(CigarKind, usize)> = ops
        .iter()
        .filter(|op| op.len() > 0 && !matches!(op.kind(), CigarKind::HardClip | CigarKind::Pad))
        .map(|op| (op.kind(), op.len()))
        .collect();

    loop {
        let mut changed = false;
        let mut merged: Vec<(CigarKind, usize)> = Vec::with_capacity(runs.len());
        for (kind, len) in runs.drain(..) {
            if let Some(last) = merged.last_mut()
                && last.0 == kind
            {
                last.1 += len;
                changed = true;
                continue;
            }
            merged.push((kind, len));
        }
        for i in 1..merged.len() {
            if is_gap(merged[i - 1].0) && merged[i].0 == CigarKind::Insertion {
                merged.swap(i - 1, i);
                changed = true;
            }
        }
        runs = merged;
        if !changed {
            break;
        }
    }
    runs
}

/// Parse a textual CIGAR such as `10M2I5M` into noodles ops.
pub fn parse_cigar(text: &str) -> Result<Vec<SamCigarOp>, EncodeError> {
    RecordCigar::new(text.as_bytes())
        .iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| EncodeError::InvalidCigar(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(start: u64, cigar: &str, read: &[u8], reference: &[u8]) -> AlignmentRecord {
        let ops = parse_cigar(cigar).unwrap();
        AlignmentRecord::encode(start, &ops, read, &[], reference).unwrap()
    }

    #[test]
    fn mismatch_bases_are_recorded_in_read_order() {
        let rec = encode(0, "4M", b"ACTT", b"ACGT");
        assert_eq!(rec.has_mismatch, vec![0, 0, 1, 0]);
        assert_eq!(rec.mismatch, b"T".to_vec());
        assert_eq!(rec.ref_len, 4);
        assert!(rec.ref_offset.is_empty());
    }

    #[test]
    fn deletion_marks_following_base() {
        let rec = encode(0, "2M3D2M", b"ACAC", b"ACGGGAC");
        assert_eq!(rec.has_ref_offset, vec![0, 0, 1, 0]);
        assert_eq!(rec.ref_offset, vec![3]);
        assert_eq!(rec.ref_len, 7);
        assert!(rec.mismatch.is_empty());
    }

    #[test]
    fn insertion_compares_against_shifted_reference() {
        // Inserted "GT" sits before reference position 2 and is compared to ref[0..2].
        let rec = encode(0, "2M2I2M", b"ACATGT", b"ACGT");
        assert_eq!(rec.has_ref_offset, vec![0, 0, 1, 0, 0, 0]);
        assert_eq!(rec.ref_offset, vec![-2]);
        assert_eq!(rec.has_mismatch, vec![0, 0, 0, 1, 0, 0]);
        assert_eq!(rec.mismatch, b"T".to_vec());
        assert_eq!(rec.ref_len, 4);
    }

    #[test]
    fn soft_clips_and_introns() {
        let rec = encode(10, "2S3M4N3M1S", b"GGACGACGA", b"NNNNNNNNNNACGTTTTACG");
        assert_eq!(rec.ref_offset, vec![-2, 4, -1]);
        assert_eq!(
            rec.ref_offset_type,
            vec![
                RefOffsetType::SoftClip as u8,
                RefOffsetType::IntronUnknown as u8,
                RefOffsetType::SoftClip as u8
            ]
        );
        assert_eq!(rec.has_ref_offset, vec![1, 0, 0, 0, 0, 1, 0, 0, 1]);
        assert_eq!(rec.ref_len, 10);
        assert_eq!(rec.mismatch, b"GGA".to_vec());
    }

    #[test]
    fn gap_before_insertion_is_reordered() {
        let rec = encode(0, "2M2D1I2M", b"ACTGT", b"ACGTGT");
        assert_eq!(rec.has_ref_offset, vec![0, 0, 1, 1, 0]);
        assert_eq!(rec.ref_offset, vec![-1, 2]);
        assert_eq!(rec.ref_len, 6);
    }

    #[test]
    fn cigar_text_becomes_ops() {
        assert_eq!(
            parse_cigar("2S10M3I1D4=1X").unwrap(),
            vec![
                SamCigarOp::new(CigarKind::SoftClip, 2),
                SamCigarOp::new(CigarKind::Match, 10),
                SamCigarOp::new(CigarKind::Insertion, 3),
                SamCigarOp::new(CigarKind::Deletion, 1),
                SamCigarOp::new(CigarKind::SequenceMatch, 4),
                SamCigarOp::new(CigarKind::SequenceMismatch, 1),
            ]
        );
        assert!(parse_cigar("").unwrap().is_empty());
    }

    #[test]
    fn rejects_inconsistent_input() {
        let ops = parse_cigar("5M").unwrap();
        assert_eq!(
            AlignmentRecord::encode(0, &ops, b"ACG", &[], b"ACGTA"),
            Err(EncodeError::SequenceLength { cigar: 5, read: 3 })
        );
        assert!(parse_cigar("5").is_err());
        assert!(parse_cigar("M").is_err());
        assert_eq!(parse_cigar("8Z"), Err(EncodeError::InvalidCigar("8Z".to_string())));
        let ops = parse_cigar("3S").unwrap();
        assert_eq!(
            AlignmentRecord::encode(0, &ops, b"ACG", &[], b"ACG"),
            Err(EncodeError::EmptyProjection)
        );
    }
}
