use core::ptr::{null, NonNull};
use std::io;
use std::mem::MaybeUninit;
use std::sync::OnceLock;
use windows_sys::Win32::System::Memory::{
    VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_NOACCESS,
    PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

pub(super) fn reserve(bytes: usize) -> io::Result<NonNull<u8>> {
    // Safety: a fresh reservation at an address of the kernel's choosing.
    let ptr = unsafe { VirtualAlloc(null(), bytes, MEM_RESERVE, PAGE_NOACCESS) };
    NonNull::new(ptr.cast()).ok_or_else(io::Error::last_os_error)
}

pub(super) unsafe fn free(base: NonNull<u8>, _bytes: usize) -> io::Result<()> {
    // MEM_RELEASE wants the base address and a size of zero.
    check(VirtualFree(base.as_ptr().cast(), 0, MEM_RELEASE))
}

pub(super) unsafe fn commit(offset: NonNull<u8>, bytes: usize) -> io::Result<()> {
    let ptr = VirtualAlloc(offset.as_ptr().cast_const().cast(), bytes, MEM_COMMIT, PAGE_READWRITE);
    if ptr.is_null() { Err(io::Error::last_os_error()) } else { Ok(()) }
}

pub(super) unsafe fn decommit(offset: NonNull<u8>, bytes: usize) -> io::Result<()> {
    check(VirtualFree(offset.as_ptr().cast(), bytes, MEM_DECOMMIT))
}

pub(super) fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        // Safety: GetSystemInfo fills in the whole struct.
        let info = unsafe {
            let mut info = MaybeUninit::<SYSTEM_INFO>::uninit();
            GetSystemInfo(info.as_mut_ptr());
            info.assume_init()
        };
        info.dwPageSize as usize
    })
}

#[inline(always)]
fn check(ret: i32) -> io::Result<()> {
    if ret != 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
}
