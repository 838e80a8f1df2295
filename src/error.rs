use std::io;
use thiserror::Error;

/// Convenience alias for results carrying our [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Everything that can go wrong with a reservation, a page stack or a
/// [`PinnedVec`](crate::PinnedVec).
///
/// Failures to decommit or free memory are not represented here. Those
/// leave the address space in an unknown state and are treated as fatal
/// by [`System`](crate::System).
#[derive(Debug, Error)]
pub enum Error {
    /// The platform refused to reserve address space.
    #[error("reserving {bytes} bytes of address space failed: {source}")]
    Reserve {
        bytes: usize,
        #[source]
        source: io::Error,
    },
    /// The platform refused to back pages with memory.
    #[error("committing {bytes} bytes of memory failed: {source}")]
    Commit {
        bytes: usize,
        #[source]
        source: io::Error,
    },
    /// A request would exceed the reserved maximum.
    #[error("requested {requested} exceeds the maximum of {max}")]
    CapacityExceeded { requested: usize, max: usize },
    /// A checked access past the end.
    #[error("index {index} is out of range for length {len}")]
    OutOfRange { index: usize, len: usize },
}

impl Error {
    /// True if the platform denied us memory or address space, as opposed to
    /// a request the caller should not have made.
    #[inline(always)]
    pub fn is_alloc_failure(&self) -> bool {
        matches!(self, Error::Reserve { .. } | Error::Commit { .. })
    }
}
