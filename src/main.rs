mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use pileup_rs::bam_input::{self, LoadedAlignments};
use pileup_rs::fasta::FastaDb;
use pileup_rs::report::{self, PileupStats};
use pileup_rs::{MapQualBound, MemoryReference, Pileup, PileupConfig};
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let args = cli::Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            if args.quiet {
                EnvFilter::new("warn")
            } else {
                EnvFilter::new("info")
            }
        });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let fasta = FastaDb::load(&args.reference)?;
    let names: Vec<String> = match &args.region {
        Some(region) => {
            if fasta.get(&region.name).is_none() {
                anyhow::bail!("reference {:?} is not in {}", region.name, args.reference.display());
            }
            vec![region.name.clone()]
        }
        None => fasta.names().to_vec(),
    };
    let only = args.region.as_ref().map(|r| r.name.as_str());
    let mut alignments =
        bam_input::load_alignments(&args.alignments, &fasta, args.chunk_size, only)?;

    let mut out: Box<dyn Write> = match &args.out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    if args.stats {
        PileupStats::write_header(&mut out)?;
    }

    let config = pileup_config(&args);
    let mut totals = PileupStats::default();
    for name in &names {
        let stats = pileup_reference(&args, &config, &fasta, &mut alignments, name, &mut out)?;
        if let Some(stats) = stats {
            if args.stats {
                stats.write_row(&mut out, name)?;
            }
            totals.add(&stats);
        }
    }
    out.flush()?;

    let load = &alignments.stats;
    tracing::info!(
        total_records = load.total_records,
        unmapped_records = load.unmapped_records,
        secondary_records = load.secondary_records,
        skipped_records = load.skipped_records,
        positions = totals.positions,
        covered_positions = totals.covered_positions,
        total_depth = totals.total_depth,
        "pileup-rs: processing complete"
    );
    Ok(())
}

fn pileup_config(args: &cli::Args) -> PileupConfig {
    let mut config = PileupConfig {
        wants_primary: !args.no_primary,
        wants_secondary: args.secondary,
        pass_bad: args.pass_bad,
        pass_duplicates: args.pass_dups,
        map_qual: args
            .min_mapq
            .map(MapQualBound::AtLeast)
            .or(args.max_mapq.map(MapQualBound::AtMost)),
        ..PileupConfig::default()
    };
    if let Some(limit) = args.cache_limit {
        config.cached_blob_limit = limit;
    }
    config
}

/// Pile up one reference; `None` when it has no alignments and no region
/// asked for it explicitly.
fn pileup_reference(
    args: &cli::Args,
    config: &PileupConfig,
    fasta: &FastaDb,
    alignments: &mut LoadedAlignments,
    name: &str,
    out: &mut Box<dyn Write>,
) -> Result<Option<PileupStats>> {
    let Some(bases) = fasta.get(name) else {
        return Ok(None);
    };
    if args.region.is_none() && !alignments.stores.contains_key(name) {
        return Ok(None);
    }

    let store = alignments.take_store(name, args.chunk_size);
    let reference = MemoryReference::new(name, bases, args.chunk_size)
        .circular(args.circular.iter().any(|c| c == name))
        .with_overlap_hints(store.overlap_hints(bases.len() as u64));

    let span = args.region.as_ref().and_then(|r| r.span);
    let mut pileup = match span {
        Some((start, length)) => Pileup::slice(reference, store, config.clone(), start, length),
        None => Pileup::new(reference, store, config.clone()),
    }
    .with_context(|| format!("failed to start pileup on {name}"))?;

    let target = (!args.stats).then_some(out);
    let stats = report::run_pileup(&mut pileup, target)
        .with_context(|| format!("pileup failed on {name}"))?;
    tracing::debug!(reference = name, positions = stats.positions, "reference done");
    Ok(Some(stats))
}
