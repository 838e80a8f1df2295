//! The platform's virtual memory primitives, which are all we need from the
//! operating system.
//!
//! A region of address space goes through three states:
//!
//! * **reserved**: nobody else will be handed these addresses, but touching
//!   them faults. Costs address space and nothing else.
//! * **committed**: readable, writable and zeroed on first touch. Counts
//!   towards the process' commit charge.
//! * **freed**: handed back; the addresses may be reused by anyone.
//!
//! Commit and decommit work at page granularity. Their addresses and sizes
//! must be page aligned and lie within one live reservation.
use core::ptr::NonNull;
use std::io;

#[cfg(test)]
pub(crate) mod stub;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
    } else if #[cfg(windows)] {
        mod windows;
    } else {
        compile_error!("pinned-vec supports only unix and windows targets");
    }
}

/// A source of reserved, committable pages.
///
/// [`System`] goes to the operating system. Other implementations may
/// record, fail on demand or fake the whole thing, which is how the
/// containers are tested with tiny page sizes.
pub trait VirtualMemory {
    /// Reserves `bytes` bytes of address space with no access rights and no
    /// backing. `bytes` is a nonzero multiple of [`page_size`](Self::page_size).
    fn reserve(&self, bytes: usize) -> io::Result<NonNull<u8>>;

    /// Releases a whole reservation, including any pages still committed.
    ///
    /// ## Safety
    ///
    /// `base` and `bytes` must be exactly what a previous [`reserve`](Self::reserve)
    /// on this provider returned and was asked for. Nothing may touch the range
    /// afterwards.
    unsafe fn free(&self, base: NonNull<u8>, bytes: usize);

    /// Makes `[offset, offset + bytes)` readable and writable.
    ///
    /// ## Safety
    ///
    /// The range must be page aligned and inside a live reservation.
    unsafe fn commit(&self, offset: NonNull<u8>, bytes: usize) -> io::Result<()>;

    /// Drops the backing of `[offset, offset + bytes)` and revokes access.
    ///
    /// ## Safety
    ///
    /// The range must be page aligned, inside a live reservation and must not
    /// contain anything still in use.
    unsafe fn decommit(&self, offset: NonNull<u8>, bytes: usize);

    /// The granularity of commit and decommit. Constant for the provider's life.
    fn page_size(&self) -> usize;
}

/// The operating system's virtual memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct System;

impl VirtualMemory for System {
    #[inline]
    fn reserve(&self, bytes: usize) -> io::Result<NonNull<u8>> {
        let base = sys::reserve(bytes)?;
        log::trace!("reserved {} bytes at {:p}", bytes, base);
        Ok(base)
    }

    #[inline]
    unsafe fn free(&self, base: NonNull<u8>, bytes: usize) {
        log::trace!("freeing {} bytes at {:p}", bytes, base);
        if let Err(e) = sys::free(base, bytes) {
            fatal("free", base, bytes, e)
        }
    }

    #[inline]
    unsafe fn commit(&self, offset: NonNull<u8>, bytes: usize) -> io::Result<()> {
        log::trace!("committing {} bytes at {:p}", bytes, offset);
        sys::commit(offset, bytes)
    }

    #[inline]
    unsafe fn decommit(&self, offset: NonNull<u8>, bytes: usize) {
        log::trace!("decommitting {} bytes at {:p}", bytes, offset);
        if let Err(e) = sys::decommit(offset, bytes) {
            fatal("decommit", offset, bytes, e)
        }
    }

    #[inline(always)]
    fn page_size(&self) -> usize { sys::page_size() }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use unix as sys;
    } else if #[cfg(windows)] {
        use windows as sys;
    }
}

/// Releasing memory we own only fails if our bookkeeping is wrong, after which
/// nothing in the address space can be trusted.
#[cold]
fn fatal(op: &str, offset: NonNull<u8>, bytes: usize, e: io::Error) -> ! {
    log::error!("{} of {} bytes at {:p} failed: {}", op, bytes, offset, e);
    std::process::abort()
}
