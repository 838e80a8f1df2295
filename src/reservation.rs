use crate::error::{Error, Result};
use crate::layout::round_up;
use crate::vm::{System, VirtualMemory};
use core::fmt;
use core::mem;
use core::ptr::{null_mut, NonNull};

/// An owned range of reserved address space. Nothing in it is accessible
/// until a [`PageStack`](crate::PageStack) commits it.
///
/// A reservation may be null, in which case it holds no address space and
/// dropping it does nothing.
///
/// ## Example
///
/// ```
/// use pinned_vec::{Reservation, System, VirtualMemory};
/// let r = Reservation::new(System, 1).unwrap();
/// assert_eq!(r.reserved_bytes(), System.page_size());
/// assert!(!r.is_null());
/// ```
pub struct Reservation<M: VirtualMemory = System> {
    base: Option<NonNull<u8>>,
    bytes: usize,
    memory: M,
}

impl<M: VirtualMemory> Reservation<M> {
    /// Reserves `bytes` bytes, rounded up to the page size, from `memory`.
    ///
    /// ## Notes
    ///
    /// Asking for zero bytes gives a null reservation without troubling the
    /// platform.
    pub fn new(memory: M, bytes: usize) -> Result<Self> {
        if bytes == 0 {
            return Ok(Self::null(memory));
        }
        let bytes = round_up(bytes, memory.page_size());
        let base = memory.reserve(bytes).map_err(|source| Error::Reserve { bytes, source })?;
        Ok(Reservation { base: Some(base), bytes, memory })
    }

    /// A reservation of nothing.
    #[inline(always)]
    pub fn null(memory: M) -> Self { Reservation { base: None, bytes: 0, memory } }

    /// The start of the range, or null.
    #[inline(always)]
    pub fn base(&self) -> *mut u8 { self.base.map_or(null_mut(), NonNull::as_ptr) }

    /// The size of the range. Always a multiple of the page size.
    #[inline(always)]
    pub fn reserved_bytes(&self) -> usize { self.bytes }

    #[inline(always)]
    pub fn is_null(&self) -> bool { self.base.is_none() }

    /// The provider we reserved from.
    #[inline(always)]
    pub fn memory(&self) -> &M { &self.memory }

    /// Exchanges everything with `other`.
    #[inline(always)]
    pub fn swap(&mut self, other: &mut Self) { mem::swap(self, other) }

    /// Reserves a fresh range of the same size. Contents are not copied;
    /// nothing in the new range is committed.
    pub fn try_clone(&self) -> Result<Self>
    where
        M: Clone,
    {
        Self::new(self.memory.clone(), self.bytes)
    }

    /// Moves the range out, leaving a null reservation behind.
    pub fn take(&mut self) -> Self
    where
        M: Clone,
    {
        let null = Self::null(self.memory.clone());
        mem::replace(self, null)
    }
}

impl<M: VirtualMemory + Default> Default for Reservation<M> {
    #[inline(always)]
    fn default() -> Self { Self::null(M::default()) }
}

unsafe impl<M: VirtualMemory + Send> Send for Reservation<M> {}
unsafe impl<M: VirtualMemory + Sync> Sync for Reservation<M> {}

impl<M: VirtualMemory> fmt::Debug for Reservation<M> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "Reservation[{:p}+{}]", self.base(), self.bytes)
    }
}

impl<M: VirtualMemory> Drop for Reservation<M> {
    // Safety: we own the range and everyone borrowing it is gone.
    fn drop(&mut self) {
        if let Some(base) = self.base.take() {
            unsafe { self.memory.free(base, self.bytes) }
        }
    }
}
