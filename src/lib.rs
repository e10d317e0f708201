//! pileup-rs: walk a reference position by position and decode the events of
//! every alignment covering it.
//!
//! # Library usage
//!
//! ```no_run
//! use pileup_rs::{
//!     AlignmentRecord, Category, MemoryAlignmentStore, MemoryReference, Pileup, PileupConfig,
//! };
//!
//! # fn main() -> Result<(), pileup_rs::PileupError> {
//! let reference = MemoryReference::new("chr1", b"ACGTACGTAC", 5);
//! let mut store = MemoryAlignmentStore::builder(5);
//! store.push(Category::Primary, AlignmentRecord::matching(2, 4));
//!
//! let mut pileup = Pileup::new(reference, store.build(), PileupConfig::default())?;
//! while pileup.advance()? {
//!     while pileup.next_event()? {
//!         let event = pileup.event_type()?;
//!         println!("{} {:?}", pileup.reference_position()?, event.kind);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Internal modules, not part of the public API.
pub(crate) mod cache;
pub(crate) mod entry;
pub(crate) mod gather;
pub(crate) mod list;
pub(crate) mod types;

// Public modules.
pub mod config;
pub mod encode;
pub mod error;
pub mod event;
pub mod memory;
pub mod pileup;
pub mod store;

// Input loaders and output used by the `pileup-rs` binary.
pub mod bam_input;
pub mod fasta;
pub mod report;

// Flat re-exports for the most commonly used public types.
pub use config::{MapQualBound, PileupConfig, filter_bits};
pub use encode::{AlignmentRecord, EncodeError, RefOffsetType, parse_cigar};
pub use error::{PileupError, Result};
pub use event::{AlignmentId, EventKind, EventType, IndelType};
pub use memory::{MemoryAlignmentStore, MemoryReference, MemoryStoreBuilder};
pub use pileup::Pileup;
pub use store::{
    AlignmentStore, Blob, Category, CategoryHint, Column, OverlapHints, ReadFilter, ReferenceSource,
};
pub use types::{ChunkId, RowId};
