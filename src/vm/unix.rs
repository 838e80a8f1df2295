use core::ptr::{null_mut, NonNull};
use std::io;
use std::sync::OnceLock;

#[cfg(any(target_os = "linux", target_os = "android"))]
const RESERVE_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_NORESERVE;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RESERVE_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON;

pub(super) fn reserve(bytes: usize) -> io::Result<NonNull<u8>> {
    // Safety: an anonymous mapping at an address of the kernel's choosing.
    let ptr = unsafe { libc::mmap(null_mut(), bytes, libc::PROT_NONE, RESERVE_FLAGS, -1, 0) };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr.cast()).ok_or_else(|| io::Error::other("mmap returned null"))
}

pub(super) unsafe fn free(base: NonNull<u8>, bytes: usize) -> io::Result<()> {
    check(libc::munmap(base.as_ptr().cast(), bytes))
}

pub(super) unsafe fn commit(offset: NonNull<u8>, bytes: usize) -> io::Result<()> {
    check(libc::mprotect(offset.as_ptr().cast(), bytes, libc::PROT_READ | libc::PROT_WRITE))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(super) unsafe fn decommit(offset: NonNull<u8>, bytes: usize) -> io::Result<()> {
    // DONTNEED drops the pages so a later commit sees zeroes again.
    check(libc::madvise(offset.as_ptr().cast(), bytes, libc::MADV_DONTNEED))?;
    check(libc::mprotect(offset.as_ptr().cast(), bytes, libc::PROT_NONE))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(super) unsafe fn decommit(offset: NonNull<u8>, bytes: usize) -> io::Result<()> {
    // Elsewhere DONTNEED may keep the contents, so map fresh pages over the range.
    let flags = RESERVE_FLAGS | libc::MAP_FIXED;
    let ptr = libc::mmap(offset.as_ptr().cast(), bytes, libc::PROT_NONE, flags, -1, 0);
    if ptr == libc::MAP_FAILED { Err(io::Error::last_os_error()) } else { Ok(()) }
}

pub(super) fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // Safety: sysconf has no preconditions.
        let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        assert!(raw > 0, "sysconf(_SC_PAGESIZE) failed: {}", io::Error::last_os_error());
        raw as usize
    })
}

#[inline(always)]
fn check(ret: libc::c_int) -> io::Result<()> {
    if ret == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
}
