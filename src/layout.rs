use crate::error::{Error, Result};
use core::mem::size_of;

/// Rounds `bytes` up to the next multiple of `page_size`.
///
/// ## Notes
///
/// Saturates rather than overflowing, so a silly request fails later when we
/// try to reserve it instead of wrapping around to something small.
#[inline(always)]
pub fn round_up(bytes: usize, page_size: usize) -> usize {
    debug_assert!(page_size > 0);
    match bytes % page_size {
        0 => bytes,
        rem => bytes.saturating_add(page_size - rem),
    }
}

/// The upper bound on how large a [`PinnedVec`](crate::PinnedVec) may ever
/// grow, which is how much address space it reserves up front.
///
/// ## Example
///
/// ```
/// use pinned_vec::MaxSize;
/// assert_eq!(MaxSize::Elements(10).bytes_for::<u32>(4096).unwrap(), 4096);
/// assert_eq!(MaxSize::Bytes(5000).bytes_for::<u32>(4096).unwrap(), 8192);
/// assert_eq!(MaxSize::Pages(3).bytes_for::<u32>(4096).unwrap(), 12288);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaxSize {
    /// A number of elements of the container's type.
    Elements(usize),
    /// A number of bytes.
    Bytes(usize),
    /// A number of platform pages.
    Pages(usize),
}

impl MaxSize {
    /// The page-rounded number of bytes to reserve for elements of type `T`.
    ///
    /// Fails with [`Error::CapacityExceeded`], in bytes, if the size does not
    /// fit in the address space.
    pub fn bytes_for<T>(self, page_size: usize) -> Result<usize> {
        let bytes = match self {
            MaxSize::Elements(n) => n.saturating_mul(size_of::<T>()),
            MaxSize::Bytes(n) => n,
            MaxSize::Pages(n) => n.saturating_mul(page_size),
        };
        let max = isize::MAX as usize;
        let rounded = round_up(bytes, page_size);
        if rounded > max {
            return Err(Error::CapacityExceeded { requested: bytes, max });
        }
        Ok(rounded)
    }

    /// The raw count, in whatever unit this is.
    #[inline(always)]
    pub fn count(self) -> usize {
        match self {
            MaxSize::Elements(n) | MaxSize::Bytes(n) | MaxSize::Pages(n) => n,
        }
    }
}
