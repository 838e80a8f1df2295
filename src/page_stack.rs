use crate::error::{Error, Result};
use crate::layout::round_up;
use crate::reservation::Reservation;
use crate::vm::{System, VirtualMemory};
use core::fmt;
use core::mem;
use core::ptr::NonNull;

/// A [`Reservation`] with a committed prefix that grows and shrinks a whole
/// page at a time, like a stack of pages.
///
/// `[base, base + committed_bytes)` is readable and writable, the rest of the
/// reservation is not. The base never moves.
///
/// ## Example
///
/// ```
/// use pinned_vec::{PageStack, System};
/// let mut stack = PageStack::new(System, 1 << 20).unwrap();
/// let page = stack.page_size();
/// stack.commit(1).unwrap();
/// assert_eq!(stack.committed_bytes(), page);
/// unsafe { stack.base().write(42) };
/// stack.decommit(page);
/// assert_eq!(stack.committed_bytes(), 0);
/// ```
pub struct PageStack<M: VirtualMemory = System> {
    reservation: Reservation<M>,
    committed: usize,
    page_size: usize,
}

impl<M: VirtualMemory> PageStack<M> {
    /// Reserves `bytes` bytes (rounded up to a page) with nothing committed.
    pub fn new(memory: M, bytes: usize) -> Result<Self> {
        let page_size = memory.page_size();
        let reservation = Reservation::new(memory, bytes)?;
        Ok(PageStack { reservation, committed: 0, page_size })
    }

    /// A page stack with no address space at all.
    #[inline(always)]
    pub fn null(memory: M) -> Self {
        let page_size = memory.page_size();
        PageStack { reservation: Reservation::null(memory), committed: 0, page_size }
    }

    #[inline(always)]
    pub fn base(&self) -> *mut u8 { self.reservation.base() }

    #[inline(always)]
    pub fn committed_bytes(&self) -> usize { self.committed }

    #[inline(always)]
    pub fn reserved_bytes(&self) -> usize { self.reservation.reserved_bytes() }

    #[inline(always)]
    pub fn page_size(&self) -> usize { self.page_size }

    #[inline(always)]
    pub fn memory(&self) -> &M { self.reservation.memory() }

    /// Commits at least `bytes` more bytes, rounding the committed total up to
    /// the next page.
    ///
    /// ## Notes
    ///
    /// Fails with [`Error::CapacityExceeded`] if the total would pass the
    /// reservation, and with [`Error::Commit`] if the platform can't back the
    /// pages. Either way nothing changes.
    pub fn commit(&mut self, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        let reserved = self.reserved_bytes();
        let wanted = self.committed.saturating_add(bytes);
        let new = round_up(wanted, self.page_size);
        if wanted > reserved || new > reserved {
            return Err(Error::CapacityExceeded { requested: wanted, max: reserved });
        }
        let delta = new - self.committed;
        // Safety: within the reservation, and page aligned as the base is.
        unsafe {
            let offset = NonNull::new_unchecked(self.base().add(self.committed));
            self.memory().commit(offset, delta).map_err(|source| Error::Commit { bytes: delta, source })?;
        }
        log::trace!("page stack at {:p}: committed {} -> {}", self.base(), self.committed, new);
        self.committed = new;
        Ok(())
    }

    /// Gives back up to `bytes` bytes from the top, keeping the committed total
    /// rounded up to a page. Partial pages stay committed.
    pub fn decommit(&mut self, bytes: usize) {
        if bytes == 0 {
            return;
        }
        debug_assert!(bytes <= self.committed, "decommit of {} > {} committed", bytes, self.committed);
        let new = round_up(self.committed.saturating_sub(bytes), self.page_size);
        if new < self.committed {
            // Safety: within the committed prefix.
            unsafe {
                let offset = NonNull::new_unchecked(self.base().add(new));
                self.memory().decommit(offset, self.committed - new);
            }
            log::trace!("page stack at {:p}: committed {} -> {}", self.base(), self.committed, new);
            self.committed = new;
        }
    }

    /// Commits or decommits so that `bytes` bytes (rounded up) are committed.
    pub fn resize(&mut self, bytes: usize) -> Result<()> {
        if bytes > self.committed {
            self.commit(bytes - self.committed)
        } else {
            self.decommit(self.committed - bytes);
            Ok(())
        }
    }

    /// Reserves a fresh page stack of the same size with nothing committed.
    pub fn try_clone(&self) -> Result<Self>
    where
        M: Clone,
    {
        Ok(PageStack { reservation: self.reservation.try_clone()?, committed: 0, page_size: self.page_size })
    }

    #[inline(always)]
    pub fn swap(&mut self, other: &mut Self) { mem::swap(self, other) }

    /// Moves everything out, leaving a null page stack behind.
    pub fn take(&mut self) -> Self
    where
        M: Clone,
    {
        let null = Self::null(self.memory().clone());
        mem::replace(self, null)
    }
}

impl<M: VirtualMemory + Default> Default for PageStack<M> {
    #[inline(always)]
    fn default() -> Self { Self::null(M::default()) }
}

impl<M: VirtualMemory> fmt::Debug for PageStack<M> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "PageStack[{}/{}]", self.committed, self.reserved_bytes())
    }
}

impl<M: VirtualMemory> Drop for PageStack<M> {
    fn drop(&mut self) {
        if self.committed > 0 {
            self.decommit(self.committed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::stub::{Call, StubMemory};

    fn stack(page: usize, pages: usize) -> (StubMemory, PageStack<StubMemory>) {
        let stub = StubMemory::new(page);
        let stack = PageStack::new(stub.clone(), page * pages).unwrap();
        stub.clear_calls();
        (stub, stack)
    }

    #[test]
    fn commits_round_up_to_pages() {
        let (stub, mut s) = stack(100, 4);
        s.commit(0).unwrap();
        assert!(stub.calls().is_empty());
        s.commit(1).unwrap();
        assert_eq!(s.committed_bytes(), 100);
        s.commit(150).unwrap();
        assert_eq!(s.committed_bytes(), 300);
        assert_eq!(
            stub.calls(),
            vec![
                Call::Commit { block: 0, offset: 0, bytes: 100 },
                Call::Commit { block: 0, offset: 100, bytes: 200 },
            ]
        );
        assert_eq!(stub.committed_pages(0), 3);
    }

    #[test]
    fn decommits_keep_partial_pages() {
        let (stub, mut s) = stack(100, 4);
        s.commit(400).unwrap();
        s.decommit(50);
        assert_eq!(s.committed_bytes(), 400);
        s.decommit(150);
        assert_eq!(s.committed_bytes(), 300);
        s.decommit(300);
        assert_eq!(s.committed_bytes(), 0);
        assert_eq!(
            stub.decommits(),
            vec![
                Call::Decommit { block: 0, offset: 300, bytes: 100 },
                Call::Decommit { block: 0, offset: 0, bytes: 300 },
            ]
        );
    }

    #[test]
    fn committing_past_the_reservation_is_refused() {
        let (stub, mut s) = stack(100, 2);
        s.commit(150).unwrap();
        let err = s.commit(51).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { requested: 251, max: 200 }));
        assert_eq!(s.committed_bytes(), 200);
        assert_eq!(stub.commits().len(), 1);
        assert!(s.commit(usize::MAX).is_err());
    }

    #[test]
    fn failed_commits_change_nothing() {
        let (stub, mut s) = stack(100, 4);
        s.commit(100).unwrap();
        stub.fail_nth_commit(1);
        let err = s.commit(100).unwrap_err();
        assert!(err.is_alloc_failure());
        assert_eq!(s.committed_bytes(), 100);
        assert_eq!(stub.committed_pages(0), 1);
        // The same range is asked for again, not a later one.
        s.commit(100).unwrap();
        assert_eq!(
            stub.commits(),
            vec![
                Call::Commit { block: 0, offset: 0, bytes: 100 },
                Call::Commit { block: 0, offset: 100, bytes: 100 },
                Call::Commit { block: 0, offset: 100, bytes: 100 },
            ]
        );
    }

    #[test]
    fn resize_goes_both_ways() {
        let (_stub, mut s) = stack(100, 4);
        s.resize(250).unwrap();
        assert_eq!(s.committed_bytes(), 300);
        s.resize(100).unwrap();
        assert_eq!(s.committed_bytes(), 100);
        s.resize(100).unwrap();
        assert_eq!(s.committed_bytes(), 100);
        s.resize(0).unwrap();
        assert_eq!(s.committed_bytes(), 0);
    }

    #[test]
    fn drop_decommits_then_frees() {
        let (stub, mut s) = stack(100, 4);
        s.commit(200).unwrap();
        drop(s);
        assert_eq!(
            stub.calls()[1..],
            [Call::Decommit { block: 0, offset: 0, bytes: 200 }, Call::Free { block: 0, bytes: 400 }]
        );
        assert_eq!(stub.live_reservations(), 0);
    }

    #[test]
    fn take_and_swap_move_whole_stacks() {
        let (stub, mut a) = stack(100, 4);
        a.commit(100).unwrap();
        let base = a.base();
        let mut b = a.take();
        assert_eq!(a.committed_bytes(), 0);
        assert_eq!(a.reserved_bytes(), 0);
        assert_eq!(a.page_size(), 100);
        assert_eq!((b.base(), b.committed_bytes()), (base, 100));
        a.swap(&mut b);
        assert_eq!((a.base(), a.committed_bytes()), (base, 100));
        assert!(b.base().is_null());
        drop((a, b));
        assert_eq!(stub.live_reservations(), 0);
    }

    #[test]
    fn clones_start_uncommitted() {
        let (stub, mut a) = stack(100, 4);
        a.commit(300).unwrap();
        let b = a.try_clone().unwrap();
        assert_eq!(b.reserved_bytes(), 400);
        assert_eq!(b.committed_bytes(), 0);
        assert_ne!(a.base(), b.base());
        assert_eq!(stub.committed_pages(1), 0);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Copy, Debug)]
        enum Op {
            Commit(usize),
            Decommit(usize),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![(0usize..350).prop_map(Op::Commit), (0usize..350).prop_map(Op::Decommit)]
        }

        proptest! {
            #[test]
            fn accounting_matches_the_model(ops in proptest::collection::vec(op(), 1..40)) {
                let page = 100;
                let reserved = 1000;
                let (stub, mut s) = stack(page, reserved / page);
                let mut model = 0usize;
                let mut expected = Vec::new();
                for op in ops {
                    match op {
                        Op::Commit(n) => {
                            let new = round_up(model + n, page);
                            if n == 0 {
                                s.commit(n).unwrap();
                            } else if new > reserved {
                                prop_assert!(s.commit(n).is_err());
                            } else {
                                s.commit(n).unwrap();
                                if new > model {
                                    expected.push(Call::Commit { block: 0, offset: model, bytes: new - model });
                                }
                                model = new;
                            }
                        }
                        Op::Decommit(n) => {
                            let n = n.min(model);
                            s.decommit(n);
                            let new = round_up(model - n, page);
                            if n > 0 && new < model {
                                expected.push(Call::Decommit { block: 0, offset: new, bytes: model - new });
                                model = new;
                            }
                        }
                    }
                    prop_assert_eq!(s.committed_bytes(), model);
                    prop_assert_eq!(s.committed_bytes() % page, 0);
                    prop_assert_eq!(stub.committed_pages(0) * page, model);
                }
                prop_assert_eq!(stub.calls(), expected);
            }
        }
    }
}
