use crate::event::EventKind;
use crate::pileup::Pileup;
use crate::store::{AlignmentStore, ReferenceSource};
use anyhow::Result;
use std::io::Write;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PileupStats {
    pub positions: u64,
    pub covered_positions: u64,
    pub total_depth: u64,
    pub matches: u64,
    pub mismatches: u64,
    pub insertions: u64,
    pub deletions: u64,
}

impl PileupStats {
    pub fn add(&mut self, other: &PileupStats) {
        self.positions += other.positions;
        self.covered_positions += other.covered_positions;
        self.total_depth += other.total_depth;
        self.matches += other.matches;
        self.mismatches += other.mismatches;
        self.insertions += other.insertions;
        self.deletions += other.deletions;
    }

    pub fn write_header<W: Write>(out: &mut W) -> Result<()> {
        writeln!(
            out,
            "#name\tpositions\tcovered\ttotal_depth\tmatches\tmismatches\tinsertions\tdeletions"
        )?;
        Ok(())
    }

    pub fn write_row<W: Write>(&self, out: &mut W, name: &str) -> Result<()> {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            name,
            self.positions,
            self.covered_positions,
            self.total_depth,
            self.matches,
            self.mismatches,
            self.insertions,
            self.deletions
        )?;
        Ok(())
    }
}

/// Drive `pileup` to the end of its window, counting events and, when `out`
/// is given, writing one mpileup-style line per covered position.
pub fn run_pileup<R, S, W>(
    pileup: &mut Pileup<R, S>,
    mut out: Option<&mut W>,
) -> Result<PileupStats>
where
    R: ReferenceSource,
    S: AlignmentStore,
    W: Write,
{
    let mut stats = PileupStats::default();
    let mut bases = Vec::new();
    let mut quals = Vec::new();

    while pileup.advance()? {
        stats.positions += 1;
        let depth = pileup.depth()?;
        if depth == 0 {
            continue;
        }
        stats.covered_positions += 1;
        stats.total_depth += depth as u64;

        bases.clear();
        quals.clear();
        while pileup.next_event()? {
            let event = pileup.event_type()?;
            if event.start {
                let mapq = pileup.mapping_quality()?.clamp(0, 93) as u8;
                bases.push(b'^');
                bases.push(mapq + 33);
            }
            if event.insertion {
                stats.insertions += 1;
                let inserted = pileup.insertion_bases()?;
                write!(bases, "+{}", inserted.len())?;
                bases.extend(inserted.iter().map(|&b| strand_case(b, event.minus_strand)));
            }
            match event.kind {
                EventKind::Match => {
                    stats.matches += 1;
                    bases.push(if event.minus_strand { b',' } else { b'.' });
                }
                EventKind::Mismatch => {
                    stats.mismatches += 1;
                    let base = pileup.alignment_base()?;
                    bases.push(strand_case(base, event.minus_strand));
                }
                EventKind::Deletion => {
                    stats.deletions += 1;
                    bases.push(b'*');
                }
            }
            if event.stop {
                bases.push(b'$');
            }
            quals.push(pileup.alignment_quality()?);
        }

        if let Some(out) = out.as_deref_mut() {
            let position = pileup.reference_position()? + 1;
            let ref_base = pileup.reference_base()?;
            let name = pileup.reference_name()?;
            write!(out, "{}\t{}\t{}\t{}\t", name, position, ref_base as char, depth)?;
            out.write_all(&bases)?;
            out.write_all(b"\t")?;
            out.write_all(&quals)?;
            out.write_all(b"\n")?;
        }
    }
    Ok(stats)
}

fn strand_case(base: u8, minus_strand: bool) -> u8 {
    if minus_strand {
        base.to_ascii_lowercase()
    } else {
        base.to_ascii_uppercase()
    }
}
