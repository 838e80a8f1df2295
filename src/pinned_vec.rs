use crate::error::{Error, Result};
use crate::growth::GrowthFactor;
use crate::layout::MaxSize;
use crate::page_stack::PageStack;
use crate::uninit::*;
use crate::vm::{System, VirtualMemory};
use core::borrow::{Borrow, BorrowMut};
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem::{self, align_of, size_of};
use core::ops::{Bound, Deref, DerefMut, RangeBounds};
use core::ptr::NonNull;
use core::slice;

/// A growable array living in a single reservation of address space. Growing
/// commits more pages after the ones already in use, so elements never move
/// and references to them stay valid for as long as the borrow checker lets
/// you hold them (and raw pointers stay valid until the element is removed).
///
/// The price is a maximum size fixed at construction. Reserving address space
/// is cheap, so make it generous.
///
/// ## Example
///
/// ```
/// use pinned_vec::{MaxSize, PinnedVec};
/// let mut v = PinnedVec::<u64>::new(MaxSize::Elements(1 << 20)).unwrap();
/// v.push(1).unwrap();
/// let first: *const u64 = &v[0];
/// for i in 2..=100_000 {
///     v.push(i).unwrap();
/// }
/// assert_eq!(first, &v[0] as *const u64);
/// assert_eq!(v.iter().sum::<u64>(), 5_000_050_000);
/// ```
///
/// ## Notes
///
/// Anything that needs more memory returns a [`Result`]. On failure the
/// length and contents are as they were before the call. Capacity may have
/// grown if an iterator yielded more than its size hint promised.
pub struct PinnedVec<T, M: VirtualMemory = System> {
    pages: PageStack<M>,
    len: usize,
    growth: GrowthFactor,
    _phantom: PhantomData<T>,
}

impl<T> PinnedVec<T> {
    /// Reserves room for `max` and commits nothing yet.
    #[inline]
    pub fn new(max: MaxSize) -> Result<Self> { Self::with_memory(max, System) }

    /// `count` clones of `value`.
    pub fn from_elem(max: MaxSize, count: usize, value: T) -> Result<Self>
    where
        T: Clone,
    {
        let mut v = Self::new(max)?;
        v.insert_n(0, count, &value)?;
        Ok(v)
    }

    /// `count` default values.
    pub fn with_len(max: MaxSize, count: usize) -> Result<Self>
    where
        T: Default,
    {
        let mut v = Self::new(max)?;
        v.resize_default(count)?;
        Ok(v)
    }

    /// Clones of everything in `items`.
    pub fn from_slice(max: MaxSize, items: &[T]) -> Result<Self>
    where
        T: Clone,
    {
        let mut v = Self::new(max)?;
        v.insert_slice(0, items)?;
        Ok(v)
    }

    /// Everything `iter` yields.
    pub fn from_iter_in<I: IntoIterator<Item = T>>(max: MaxSize, iter: I) -> Result<Self> {
        let mut v = Self::new(max)?;
        v.try_extend(iter)?;
        Ok(v)
    }
}

impl<T, M: VirtualMemory> PinnedVec<T, M> {
    /// Element size, refusing zero-sized types.
    const ELEMENT: usize = {
        assert!(size_of::<T>() != 0, "PinnedVec does not support zero-sized types");
        size_of::<T>()
    };

    /// Reserves room for `max` from `memory` and commits nothing yet.
    ///
    /// ## Notes
    ///
    /// Panics if `T` is aligned more strictly than a page.
    pub fn with_memory(max: MaxSize, memory: M) -> Result<Self> {
        let page_size = memory.page_size();
        assert!(align_of::<T>() <= page_size, "alignment {} exceeds page size {}", align_of::<T>(), page_size);
        let bytes = max.bytes_for::<T>(page_size)?;
        let pages = PageStack::new(memory, bytes)?;
        log::debug!("reserved {} bytes for up to {} elements", bytes, bytes / Self::ELEMENT);
        Ok(PinnedVec { pages, len: 0, growth: GrowthFactor::DOUBLE, _phantom: PhantomData })
    }

    /// An empty container with no reservation. It can't hold anything.
    #[inline(always)]
    pub fn null(memory: M) -> Self {
        PinnedVec { pages: PageStack::null(memory), len: 0, growth: GrowthFactor::DOUBLE, _phantom: PhantomData }
    }

    /// Replaces the growth factor.
    #[inline(always)]
    pub fn with_growth_factor(mut self, growth: GrowthFactor) -> Self {
        self.growth = growth;
        self
    }

    #[inline(always)]
    pub fn growth_factor(&self) -> GrowthFactor { self.growth }

    #[inline(always)]
    pub fn len(&self) -> usize { self.len }

    #[inline(always)]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// How many elements fit in the committed pages.
    #[inline(always)]
    pub fn capacity(&self) -> usize { self.pages.committed_bytes() / Self::ELEMENT }

    /// How many elements fit in the reservation. This never changes.
    #[inline(always)]
    pub fn max_size(&self) -> usize { self.pages.reserved_bytes() / Self::ELEMENT }

    #[inline(always)]
    pub fn page_size(&self) -> usize { self.pages.page_size() }

    #[inline(always)]
    pub fn memory(&self) -> &M { self.pages.memory() }

    /// The first slot. Dangling (but aligned) if there's no reservation.
    #[inline(always)]
    pub fn as_ptr(&self) -> *const T { self.data() }

    #[inline(always)]
    pub fn as_mut_ptr(&mut self) -> *mut T { self.data() }

    #[inline(always)]
    pub fn as_slice(&self) -> &[T] { unsafe { slice::from_raw_parts(self.data(), self.len) } }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [T] { unsafe { slice::from_raw_parts_mut(self.data(), self.len) } }

    /// Checked access.
    #[inline]
    pub fn at(&self, index: usize) -> Result<&T> {
        let len = self.len;
        self.as_slice().get(index).ok_or(Error::OutOfRange { index, len })
    }

    /// Checked mutable access.
    #[inline]
    pub fn at_mut(&mut self, index: usize) -> Result<&mut T> {
        let len = self.len;
        self.as_mut_slice().get_mut(index).ok_or(Error::OutOfRange { index, len })
    }

    /// Makes sure there is room for `capacity` elements without committing
    /// again. Capacity is rounded up to whole pages and never shrinks here.
    pub fn reserve(&mut self, capacity: usize) -> Result<()> {
        let max = self.max_size();
        if capacity > max {
            return Err(Error::CapacityExceeded { requested: capacity, max });
        }
        if capacity > self.capacity() {
            self.pages.commit(capacity * Self::ELEMENT - self.pages.committed_bytes())?;
        }
        Ok(())
    }

    /// Decommits every page past the last element. A partly used page stays,
    /// so the capacity afterwards is the length rounded up to a page.
    pub fn shrink_to_fit(&mut self) {
        if self.capacity() > self.len {
            let before = self.capacity();
            self.pages.decommit(self.pages.committed_bytes() - self.len * Self::ELEMENT);
            log::debug!("shrank {:p} from {} to {} elements", self.data(), before, self.capacity());
        }
    }

    /// Appends `value`, returning a reference to it where it will stay.
    ///
    /// ## Notes
    ///
    /// `value` is dropped if it can't be stored.
    #[inline]
    pub fn push(&mut self, value: T) -> Result<&mut T> { self.push_with(|| value) }

    /// Appends the result of `f`, which is only called once there is room.
    pub fn push_with<F: FnOnce() -> T>(&mut self, f: F) -> Result<&mut T> {
        self.grow_if_necessary(1)?;
        unsafe {
            let slot = construct_at(self.data().add(self.len), f());
            self.len += 1;
            Ok(&mut *slot)
        }
    }

    /// Removes and returns the last element.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(unsafe { self.data().add(self.len).read() })
    }

    /// Inserts `value` at `index`, moving everything after it up one.
    ///
    /// ## Notes
    ///
    /// Panics if `index > len`.
    #[inline]
    pub fn insert(&mut self, index: usize, value: T) -> Result<&mut T> { self.insert_with(index, || value) }

    /// Inserts the result of `f` at `index`. `f` runs before anything moves,
    /// so if it panics nothing has changed.
    pub fn insert_with<F: FnOnce() -> T>(&mut self, index: usize, f: F) -> Result<&mut T> {
        self.check_insert(index);
        self.grow_if_necessary(1)?;
        let value = f();
        unsafe {
            let slot = self.data().add(index);
            uninitialized_move(slot, self.len - index, slot.add(1));
            construct_at(slot, value);
            self.len += 1;
            Ok(&mut *slot)
        }
    }

    /// Inserts `count` clones of `value` at `index`.
    pub fn insert_n(&mut self, index: usize, count: usize, value: &T) -> Result<()>
    where
        T: Clone,
    {
        self.insert_run(index, count, |_| value.clone())
    }

    /// Inserts clones of `items` at `index`.
    pub fn insert_slice(&mut self, index: usize, items: &[T]) -> Result<()>
    where
        T: Clone,
    {
        self.insert_run(index, items.len(), |i| items[i].clone())
    }

    /// Inserts everything `iter` yields at `index`, in order.
    ///
    /// ## Notes
    ///
    /// If the container fills up or the iterator panics, whatever was taken
    /// from the iterator is dropped and the contents are as before.
    pub fn insert_iter<I: IntoIterator<Item = T>>(&mut self, index: usize, iter: I) -> Result<()> {
        self.check_insert(index);
        let iter = iter.into_iter();
        let old_len = self.len;
        let mut appended = Appended { vec: self, len: old_len, armed: true };
        appended.vec.grow_if_necessary(iter.size_hint().0)?;
        for item in iter {
            appended.vec.push(item)?;
        }
        appended.armed = false;
        appended.vec.as_mut_slice()[index..].rotate_left(old_len - index);
        Ok(())
    }

    /// Appends everything `iter` yields. See [`insert_iter`](Self::insert_iter).
    #[inline]
    pub fn try_extend<I: IntoIterator<Item = T>>(&mut self, iter: I) -> Result<()> {
        self.insert_iter(self.len, iter)
    }

    /// Removes and returns the element at `index`, moving everything after it
    /// down one.
    ///
    /// ## Notes
    ///
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        assert!(index < self.len, "removal index (is {}) should be < len (is {})", index, self.len);
        unsafe {
            let slot = self.data().add(index);
            let value = slot.read();
            uninitialized_move(slot.add(1), self.len - index - 1, slot);
            self.len -= 1;
            value
        }
    }

    /// Drops the element at `index` and moves everything after it down one.
    ///
    /// ## Notes
    ///
    /// Panics if `index >= len`.
    pub fn erase_at(&mut self, index: usize) {
        assert!(index < self.len, "erase index (is {}) should be < len (is {})", index, self.len);
        unsafe {
            let base = self.data();
            let tail = self.len - index - 1;
            self.len = index;
            let _gap = CloseGap { from: base.add(index + 1), to: base.add(index), tail, len: &mut self.len };
            destroy_at(base.add(index));
        }
    }

    /// Drops the elements in `range` and moves the rest down to close the gap.
    /// Capacity is unchanged.
    ///
    /// ## Notes
    ///
    /// Panics if the range is out of bounds.
    pub fn erase<R: RangeBounds<usize>>(&mut self, range: R) {
        let (start, end) = bounds(range, self.len);
        if start == end {
            return;
        }
        unsafe {
            let base = self.data();
            let tail = self.len - end;
            self.len = start;
            // Closes the gap even if a drop panics.
            let _gap = CloseGap { from: base.add(end), to: base.add(start), tail, len: &mut self.len };
            destroy_range(base.add(start), end - start);
        }
    }

    /// Drops everything from `len` on. Capacity is unchanged.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        let tail = self.len - len;
        unsafe {
            let first = self.data().add(len);
            self.len = len;
            destroy_range(first, tail);
        }
    }

    /// Drops everything. Capacity is unchanged.
    #[inline]
    pub fn clear(&mut self) { self.truncate(0) }

    /// Grows with clones of `value` or shrinks to `len`. Shrinking also
    /// decommits the pages no longer needed.
    pub fn resize(&mut self, len: usize, value: T) -> Result<()>
    where
        T: Clone,
    {
        self.resize_run(len, |first, count| unsafe { uninitialized_fill_n(first, count, &value) })
    }

    /// Like [`resize`](Self::resize), filling with `T::default()`.
    pub fn resize_default(&mut self, len: usize) -> Result<()>
    where
        T: Default,
    {
        self.resize_run(len, |first, count| unsafe { uninitialized_default_construct_n(first, count) })
    }

    /// Like [`resize`](Self::resize), filling with the results of `f`.
    pub fn resize_with<F: FnMut() -> T>(&mut self, len: usize, mut f: F) -> Result<()> {
        self.resize_run(len, |first, count| unsafe { uninitialized_fill_with(first, count, |_| f()) })
    }

    /// Replaces the contents with what `iter` yields.
    pub fn assign<I: IntoIterator<Item = T>>(&mut self, iter: I) -> Result<()> {
        self.clear();
        self.try_extend(iter)
    }

    /// Replaces the contents with `count` clones of `value`.
    pub fn assign_fill(&mut self, count: usize, value: &T) -> Result<()>
    where
        T: Clone,
    {
        self.clear();
        self.insert_n(0, count, value)
    }

    /// Replaces the contents with clones of `items`.
    pub fn assign_slice(&mut self, items: &[T]) -> Result<()>
    where
        T: Clone,
    {
        self.clear();
        self.insert_slice(0, items)
    }

    /// Exchanges everything with `other` without touching any element.
    #[inline(always)]
    pub fn swap_with(&mut self, other: &mut Self) { mem::swap(self, other) }

    /// Moves the contents out, reservation and all, leaving an empty container
    /// with no reservation behind. The elements keep their addresses.
    pub fn take(&mut self) -> Self
    where
        M: Clone,
    {
        let len = mem::replace(&mut self.len, 0);
        PinnedVec { pages: self.pages.take(), len, growth: self.growth, _phantom: PhantomData }
    }

    /// A copy in a fresh reservation of the same size.
    ///
    /// ## Notes
    ///
    /// If a clone panics the copies made so far are dropped and the new
    /// reservation released before the panic continues.
    pub fn try_clone(&self) -> Result<Self>
    where
        T: Clone,
        M: Clone,
    {
        let mut pages = self.pages.try_clone()?;
        pages.commit(self.len * Self::ELEMENT)?;
        let mut copy = PinnedVec { pages, len: 0, growth: self.growth, _phantom: PhantomData };
        unsafe { uninitialized_copy(self.as_slice(), copy.data()) };
        copy.len = self.len;
        Ok(copy)
    }

    #[inline(always)]
    fn data(&self) -> *mut T {
        let base = self.pages.base();
        if base.is_null() { NonNull::dangling().as_ptr() } else { base.cast() }
    }

    #[inline(always)]
    fn check_insert(&self, index: usize) {
        assert!(index <= self.len, "insertion index (is {}) should be <= len (is {})", index, self.len);
    }

    /// Makes room for `extra` more elements, growing geometrically.
    fn grow_if_necessary(&mut self, extra: usize) -> Result<()> {
        let max = self.max_size();
        if extra > max - self.len {
            return Err(Error::CapacityExceeded { requested: self.len.saturating_add(extra), max });
        }
        let wanted = self.len + extra;
        let capacity = self.capacity();
        if wanted > capacity {
            let new = self.growth.apply(capacity).max(wanted).min(max);
            log::debug!("growing {:p} from {} towards {} elements", self.data(), capacity, new);
            self.reserve(new)?;
        }
        Ok(())
    }

    /// Opens a gap of `count` at `index` and fills it with `fill`. If `fill`
    /// panics, the gap is closed again.
    fn insert_run<F: FnMut(usize) -> T>(&mut self, index: usize, count: usize, mut fill: F) -> Result<()> {
        self.check_insert(index);
        if count == 0 {
            return Ok(());
        }
        self.grow_if_necessary(count)?;
        unsafe {
            let hole = self.data().add(index);
            let tail = self.len - index;
            uninitialized_move(hole, tail, hole.add(count));
            let restore = self.len;
            self.len = index;
            let mut gap = Gap { hole, count, built: 0, tail, len: &mut self.len, restore };
            while gap.built < count {
                construct_at(hole.add(gap.built), fill(gap.built));
                gap.built += 1;
            }
            *gap.len = restore + count;
            mem::forget(gap);
        }
        Ok(())
    }

    fn resize_run<F: FnOnce(*mut T, usize)>(&mut self, len: usize, construct: F) -> Result<()> {
        if len > self.len {
            self.reserve(len)?;
            construct(unsafe { self.data().add(self.len) }, len - self.len);
            self.len = len;
        } else if len < self.len {
            self.truncate(len);
            self.shrink_to_fit();
        }
        Ok(())
    }
}

fn bounds<R: RangeBounds<usize>>(range: R, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&n) => n,
        Bound::Excluded(&n) => n.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&n) => n.saturating_add(1),
        Bound::Excluded(&n) => n,
        Bound::Unbounded => len,
    };
    assert!(start <= end, "range starts at {} but ends at {}", start, end);
    assert!(end <= len, "range end {} out of range for length {}", end, len);
    (start, end)
}

/// Truncates back to `len` unless disarmed.
struct Appended<'a, T, M: VirtualMemory> {
    vec: &'a mut PinnedVec<T, M>,
    len: usize,
    armed: bool,
}

impl<T, M: VirtualMemory> Drop for Appended<'_, T, M> {
    fn drop(&mut self) {
        if self.armed {
            self.vec.truncate(self.len);
        }
    }
}

/// A half-filled gap with the tail parked `count` slots up. Dropping it
/// drops what was built and moves the tail back.
struct Gap<'a, T> {
    hole: *mut T,
    count: usize,
    built: usize,
    tail: usize,
    len: &'a mut usize,
    restore: usize,
}

impl<T> Drop for Gap<'_, T> {
    fn drop(&mut self) {
        unsafe {
            destroy_range(self.hole, self.built);
            uninitialized_move(self.hole.add(self.count), self.tail, self.hole);
        }
        *self.len = self.restore;
    }
}

/// Moves the tail down over an erased range.
struct CloseGap<'a, T> {
    from: *mut T,
    to: *mut T,
    tail: usize,
    len: &'a mut usize,
}

impl<T> Drop for CloseGap<'_, T> {
    fn drop(&mut self) {
        unsafe { uninitialized_move(self.from, self.tail, self.to) };
        *self.len += self.tail;
    }
}

unsafe impl<T: Send, M: VirtualMemory + Send> Send for PinnedVec<T, M> {}
unsafe impl<T: Sync, M: VirtualMemory + Sync> Sync for PinnedVec<T, M> {}

impl<T, M: VirtualMemory> Drop for PinnedVec<T, M> {
    // The page stack decommits and frees after us.
    fn drop(&mut self) { self.clear() }
}

impl<T, M: VirtualMemory + Default> Default for PinnedVec<T, M> {
    #[inline(always)]
    fn default() -> Self { Self::null(M::default()) }
}

impl<T: Clone, M: VirtualMemory + Clone> Clone for PinnedVec<T, M> {
    /// ## Notes
    ///
    /// Panics if the copy can't be reserved or committed. Use
    /// [`try_clone`](PinnedVec::try_clone) to handle that.
    fn clone(&self) -> Self {
        self.try_clone().unwrap_or_else(|e| panic!("cloning a PinnedVec failed: {}", e))
    }
}

impl<T, M: VirtualMemory> Deref for PinnedVec<T, M> {
    type Target = [T];
    #[inline(always)]
    fn deref(&self) -> &[T] { self.as_slice() }
}

impl<T, M: VirtualMemory> DerefMut for PinnedVec<T, M> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut [T] { self.as_mut_slice() }
}

impl<T, M: VirtualMemory> AsRef<[T]> for PinnedVec<T, M> {
    #[inline(always)]
    fn as_ref(&self) -> &[T] { self.as_slice() }
}

impl<T, M: VirtualMemory> AsMut<[T]> for PinnedVec<T, M> {
    #[inline(always)]
    fn as_mut(&mut self) -> &mut [T] { self.as_mut_slice() }
}

impl<T, M: VirtualMemory> Borrow<[T]> for PinnedVec<T, M> {
    #[inline(always)]
    fn borrow(&self) -> &[T] { self.as_slice() }
}

impl<T, M: VirtualMemory> BorrowMut<[T]> for PinnedVec<T, M> {
    #[inline(always)]
    fn borrow_mut(&mut self) -> &mut [T] { self.as_mut_slice() }
}

impl<T: fmt::Debug, M: VirtualMemory> fmt::Debug for PinnedVec<T, M> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result { fmt.debug_list().entries(self.iter()).finish() }
}

impl<T, U, M, N> PartialEq<PinnedVec<U, N>> for PinnedVec<T, M>
where
    T: PartialEq<U>,
    M: VirtualMemory,
    N: VirtualMemory,
{
    #[inline]
    fn eq(&self, other: &PinnedVec<U, N>) -> bool { self.as_slice() == other.as_slice() }
}

impl<T: PartialEq<U>, U, M: VirtualMemory> PartialEq<[U]> for PinnedVec<T, M> {
    #[inline]
    fn eq(&self, other: &[U]) -> bool { self.as_slice() == other }
}

impl<T: PartialEq<U>, U, M: VirtualMemory, const N: usize> PartialEq<[U; N]> for PinnedVec<T, M> {
    #[inline]
    fn eq(&self, other: &[U; N]) -> bool { self.as_slice() == other }
}

impl<T: Eq, M: VirtualMemory> Eq for PinnedVec<T, M> {}

impl<T: PartialOrd, M: VirtualMemory> PartialOrd for PinnedVec<T, M> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { self.as_slice().partial_cmp(other.as_slice()) }
}

impl<T: Ord, M: VirtualMemory> Ord for PinnedVec<T, M> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering { self.as_slice().cmp(other.as_slice()) }
}

impl<T: Hash, M: VirtualMemory> Hash for PinnedVec<T, M> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) { self.as_slice().hash(state) }
}

impl<T, M: VirtualMemory> Extend<T> for PinnedVec<T, M> {
    /// ## Notes
    ///
    /// Panics if the container fills up. Use
    /// [`try_extend`](PinnedVec::try_extend) to handle that.
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.try_extend(iter).unwrap_or_else(|e| panic!("extending a PinnedVec failed: {}", e))
    }
}

impl<'a, T: Copy + 'a, M: VirtualMemory> Extend<&'a T> for PinnedVec<T, M> {
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.try_extend(iter.into_iter().copied()).unwrap_or_else(|e| panic!("extending a PinnedVec failed: {}", e))
    }
}

impl<'a, T, M: VirtualMemory> IntoIterator for &'a PinnedVec<T, M> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;
    #[inline(always)]
    fn into_iter(self) -> Self::IntoIter { self.iter() }
}

impl<'a, T, M: VirtualMemory> IntoIterator for &'a mut PinnedVec<T, M> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;
    #[inline(always)]
    fn into_iter(self) -> Self::IntoIter { self.iter_mut() }
}
