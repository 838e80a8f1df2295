//! A recording [`VirtualMemory`] for tests. Reservations are heap blocks, the
//! page size is whatever the test likes and every call is written down.
//! Misuse (unaligned ranges, double commits, stray frees) panics.
use super::VirtualMemory;
use core::ptr::NonNull;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

/// A call made to the stub. `block` is the index of the reservation in the
/// order they were made and `offset` is relative to its base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Reserve { bytes: usize },
    Free { block: usize, bytes: usize },
    Commit { block: usize, offset: usize, bytes: usize },
    Decommit { block: usize, offset: usize, bytes: usize },
}

struct Block {
    base: NonNull<u8>,
    layout: Layout,
    committed: Vec<bool>,
    live: bool,
}

struct State {
    page_size: usize,
    blocks: Vec<Block>,
    calls: Vec<Call>,
    fail_reserve: bool,
    fail_commit_in: Option<usize>,
}

#[derive(Clone)]
pub(crate) struct StubMemory(Rc<RefCell<State>>);

impl StubMemory {
    pub(crate) fn new(page_size: usize) -> Self {
        assert!(page_size > 0);
        StubMemory(Rc::new(RefCell::new(State {
            page_size,
            blocks: Vec::new(),
            calls: Vec::new(),
            fail_reserve: false,
            fail_commit_in: None,
        })))
    }

    /// The `n`th commit from now (1 = the next one) reports out of memory.
    pub(crate) fn fail_nth_commit(&self, n: usize) {
        assert!(n > 0);
        self.0.borrow_mut().fail_commit_in = Some(n);
    }

    pub(crate) fn fail_next_reserve(&self) { self.0.borrow_mut().fail_reserve = true; }

    pub(crate) fn calls(&self) -> Vec<Call> { self.0.borrow().calls.clone() }

    pub(crate) fn clear_calls(&self) { self.0.borrow_mut().calls.clear(); }

    pub(crate) fn live_reservations(&self) -> usize {
        self.0.borrow().blocks.iter().filter(|b| b.live).count()
    }

    /// Number of committed pages in reservation `block`.
    pub(crate) fn committed_pages(&self, block: usize) -> usize {
        self.0.borrow().blocks[block].committed.iter().filter(|c| **c).count()
    }

    pub(crate) fn commits(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| matches!(c, Call::Commit { .. })).collect()
    }

    pub(crate) fn decommits(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| matches!(c, Call::Decommit { .. })).collect()
    }
}

impl State {
    /// Finds the live block containing `[ptr, ptr + bytes)` and the page range.
    fn locate(&self, ptr: NonNull<u8>, bytes: usize) -> (usize, usize) {
        let addr = ptr.as_ptr() as usize;
        let (index, block) = self
            .blocks
            .iter()
            .enumerate()
            .find(|(_, b)| {
                let base = b.base.as_ptr() as usize;
                b.live && addr >= base && addr + bytes <= base + b.layout.size()
            })
            .unwrap_or_else(|| panic!("{:p}+{} is not inside a live reservation", ptr, bytes));
        let offset = addr - block.base.as_ptr() as usize;
        assert_eq!(offset % self.page_size, 0, "unaligned offset {}", offset);
        assert_eq!(bytes % self.page_size, 0, "unaligned size {}", bytes);
        assert!(bytes > 0, "empty range");
        (index, offset)
    }
}

impl VirtualMemory for StubMemory {
    fn reserve(&self, bytes: usize) -> io::Result<NonNull<u8>> {
        let mut state = self.0.borrow_mut();
        assert!(bytes > 0 && bytes % state.page_size == 0, "bad reservation size {}", bytes);
        state.calls.push(Call::Reserve { bytes });
        if std::mem::take(&mut state.fail_reserve) {
            return Err(io::ErrorKind::OutOfMemory.into());
        }
        let layout = Layout::from_size_align(bytes, 64).expect("layout");
        let base = NonNull::new(unsafe { alloc_zeroed(layout) }).expect("test allocation");
        let pages = bytes / state.page_size;
        state.blocks.push(Block { base, layout, committed: vec![false; pages], live: true });
        Ok(base)
    }

    unsafe fn free(&self, base: NonNull<u8>, bytes: usize) {
        let mut state = self.0.borrow_mut();
        let index = state
            .blocks
            .iter()
            .position(|b| b.live && b.base == base)
            .unwrap_or_else(|| panic!("free of unknown reservation {:p}", base));
        let block = &mut state.blocks[index];
        assert_eq!(block.layout.size(), bytes, "free with the wrong size");
        block.live = false;
        dealloc(block.base.as_ptr(), block.layout);
        state.calls.push(Call::Free { block: index, bytes });
    }

    unsafe fn commit(&self, offset: NonNull<u8>, bytes: usize) -> io::Result<()> {
        let mut state = self.0.borrow_mut();
        let (block, start) = state.locate(offset, bytes);
        state.calls.push(Call::Commit { block, offset: start, bytes });
        if let Some(n) = state.fail_commit_in {
            if n == 1 {
                state.fail_commit_in = None;
                return Err(io::ErrorKind::OutOfMemory.into());
            }
            state.fail_commit_in = Some(n - 1);
        }
        let page = state.page_size;
        for p in start / page..(start + bytes) / page {
            let slot = &mut state.blocks[block].committed[p];
            assert!(!*slot, "page {} of block {} committed twice", p, block);
            *slot = true;
        }
        offset.as_ptr().write_bytes(0, bytes);
        Ok(())
    }

    unsafe fn decommit(&self, offset: NonNull<u8>, bytes: usize) {
        let mut state = self.0.borrow_mut();
        let (block, start) = state.locate(offset, bytes);
        let page = state.page_size;
        for p in start / page..(start + bytes) / page {
            let slot = &mut state.blocks[block].committed[p];
            assert!(*slot, "page {} of block {} decommitted twice", p, block);
            *slot = false;
        }
        // Poison, so reads of decommitted memory show up.
        offset.as_ptr().write_bytes(0xA5, bytes);
        state.calls.push(Call::Decommit { block, offset: start, bytes });
    }

    fn page_size(&self) -> usize { self.0.borrow().page_size }
}

impl Drop for State {
    fn drop(&mut self) {
        for block in self.blocks.iter().filter(|b| b.live) {
            unsafe { dealloc(block.base.as_ptr(), block.layout) }
        }
    }
}
