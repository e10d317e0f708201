use crate::types::{HashMap, HashMapExt};
use anyhow::Result;
use needletail::parse_fastx_file;
use std::path::Path;

/// Reference sequences in file order, upper-cased.
#[derive(Debug, Default)]
pub struct FastaDb {
    names: Vec<String>,
    seqs: HashMap<String, Vec<u8>>,
}

impl FastaDb {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = parse_fastx_file(path)
            .map_err(|e| anyhow::anyhow!("failed to open FASTA {}: {}", path.display(), e))?;
        let mut db = Self { names: Vec::new(), seqs: HashMap::new() };

        while let Some(result) = reader.next() {
            let record = result
                .map_err(|e| anyhow::anyhow!("failed to parse FASTA record: {}", e))?;
            // the name ends at the first whitespace, as in SAM headers
            let id = String::from_utf8_lossy(record.id());
            let name = id.split_whitespace().next().unwrap_or("").to_string();
            let seq = record.seq().to_ascii_uppercase();
            if db.seqs.insert(name.clone(), seq).is_some() {
                anyhow::bail!("duplicate FASTA record {name:?} in {}", path.display());
            }
            db.names.push(name);
        }

        Ok(db)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.seqs.get(name).map(Vec::as_slice)
    }
}
