use thiserror::Error;

/// Errors raised by the pileup engine and its store collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PileupError {
    /// Accessor used before the first successful `advance()`, after a failure,
    /// or on a closed pileup.
    #[error("invalid pileup state: {0}")]
    InvalidState(&'static str),

    /// Accessor used after the window (or the event list) was fully consumed.
    #[error("{0} exhausted")]
    Exhausted(&'static str),

    /// Failure fetching id sets, column cells or reference bases.
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("out of memory while allocating {0}")]
    OutOfMemory(&'static str),

    /// Slice start at or beyond the end of the reference.
    #[error("slice start {start} is beyond reference length {length}")]
    OutOfRange { start: u64, length: u64 },
}

impl PileupError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Failures that leave the engine in its absorbing error state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::OutOfMemory(_))
    }
}

pub type Result<T> = std::result::Result<T, PileupError>;
