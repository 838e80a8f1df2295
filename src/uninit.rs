//! Building and tearing down elements in raw slots.
//!
//! Everything here works on pointers into committed but possibly
//! uninitialised memory. Anything that builds more than one element drops what
//! it has built so far if a constructor panics, so the caller only ever has to
//! account for the slots it knows are live.
use core::mem;
use core::ptr::{self, drop_in_place};
use core::slice;

/// Writes `value` into the uninitialised slot `slot`.
#[inline(always)]
pub(crate) unsafe fn construct_at<T>(slot: *mut T, value: T) -> *mut T {
    slot.write(value);
    slot
}

/// Drops the element in `slot`, leaving it uninitialised.
#[inline(always)]
pub(crate) unsafe fn destroy_at<T>(slot: *mut T) { drop_in_place(slot) }

/// Drops `count` elements starting at `first`.
///
/// If one of the drops panics the rest are still dropped.
#[inline(always)]
pub(crate) unsafe fn destroy_range<T>(first: *mut T, count: usize) {
    drop_in_place(slice::from_raw_parts_mut(first, count))
}

/// The part of a run that has been built so far. Dropped by unwinding.
struct Partial<T> {
    first: *mut T,
    built: usize,
}

impl<T> Drop for Partial<T> {
    fn drop(&mut self) { unsafe { destroy_range(self.first, self.built) } }
}

/// Fills `count` uninitialised slots from `first` with successive results of
/// `f`, which is told the index within the run.
pub(crate) unsafe fn uninitialized_fill_with<T, F>(first: *mut T, count: usize, mut f: F)
where
    F: FnMut(usize) -> T,
{
    let mut partial = Partial { first, built: 0 };
    while partial.built < count {
        construct_at(first.add(partial.built), f(partial.built));
        partial.built += 1;
    }
    mem::forget(partial);
}

/// Fills `count` slots with clones of `value`.
#[inline]
pub(crate) unsafe fn uninitialized_fill_n<T: Clone>(first: *mut T, count: usize, value: &T) {
    uninitialized_fill_with(first, count, |_| value.clone())
}

/// Fills `count` slots with `T::default()`.
#[inline]
pub(crate) unsafe fn uninitialized_default_construct_n<T: Default>(first: *mut T, count: usize) {
    uninitialized_fill_with(first, count, |_| T::default())
}

/// Clones every element of `src` into the slots from `dest`.
#[inline]
pub(crate) unsafe fn uninitialized_copy<T: Clone>(src: &[T], dest: *mut T) {
    uninitialized_fill_with(dest, src.len(), |i| src[i].clone())
}

/// Moves `count` live elements from `src` into the slots at `dest`. The ranges
/// may overlap. Afterwards the source slots are logically uninitialised,
/// except where they overlap the destination.
///
/// ## Notes
///
/// Moves are bitwise and cannot fail, so there is nothing to roll back.
#[inline(always)]
pub(crate) unsafe fn uninitialized_move<T>(src: *const T, count: usize, dest: *mut T) {
    ptr::copy(src, dest, count)
}
