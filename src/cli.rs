use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(
    name = "pileup-rs",
    about = "Per-position pileup of aligned reads against a reference",
    version
)]
pub struct Args {
    /// Input alignments (SAM, BAM or CRAM)
    pub alignments: PathBuf,

    /// Reference sequences (FASTA)
    #[arg(short = 'r', long = "reference", value_name = "FASTA")]
    pub reference: PathBuf,

    /// Restrict output to NAME or NAME:START-END (1-based, inclusive)
    #[arg(long, value_name = "REGION")]
    pub region: Option<Region>,

    /// Bases per reference chunk
    #[arg(long, default_value_t = 5000, value_parser = clap::value_parser!(u32).range(1..))]
    pub chunk_size: u32,

    /// Treat this reference as circular (repeatable)
    #[arg(long = "circular", value_name = "NAME")]
    pub circular: Vec<String>,

    /// Include secondary and supplementary alignments
    #[arg(long)]
    pub secondary: bool,

    /// Leave out primary alignments
    #[arg(long)]
    pub no_primary: bool,

    /// Include reads that failed quality checks
    #[arg(long)]
    pub pass_bad: bool,

    /// Include reads marked as duplicates
    #[arg(long)]
    pub pass_dups: bool,

    /// Minimum mapping quality
    #[arg(long, value_name = "Q", conflicts_with = "max_mapq")]
    pub min_mapq: Option<i32>,

    /// Maximum mapping quality
    #[arg(long, value_name = "Q")]
    pub max_mapq: Option<i32>,

    /// Byte budget for cached alignment columns
    #[arg(long, value_name = "BYTES")]
    pub cache_limit: Option<usize>,

    /// Print per-reference counts instead of the pileup
    #[arg(long)]
    pub stats: bool,

    /// Output path (default: stdout)
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Set logging level to WARN
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

/// `NAME` or `NAME:START-END`, 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    /// Zero-based start and length.
    pub span: Option<(u64, u64)>,
}

impl FromStr for Region {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((name, range)) = s.rsplit_once(':') else {
            return Ok(Region { name: s.to_string(), span: None });
        };
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| format!("region {s:?} is not NAME:START-END"))?;
        let parse = |v: &str| {
            v.replace(',', "")
                .parse::<u64>()
                .map_err(|_| format!("invalid coordinate {v:?} in region {s:?}"))
        };
        let (start, end) = (parse(start)?, parse(end)?);
        if name.is_empty() || start == 0 || end < start {
            return Err(format!("invalid region {s:?}"));
        }
        Ok(Region {
            name: name.to_string(),
            span: Some((start - 1, end - start + 1)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_regions() {
        assert_eq!(
            "chr1:11-20".parse::<Region>().unwrap(),
            Region { name: "chr1".into(), span: Some((10, 10)) }
        );
        assert_eq!("chrM".parse::<Region>().unwrap().span, None);
        assert!("chr1:20-11".parse::<Region>().is_err());
        assert!("chr1:0-5".parse::<Region>().is_err());
    }
}
