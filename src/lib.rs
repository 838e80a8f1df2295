//! A growable contiguous array that never moves its elements.
//!
//! [`PinnedVec`] reserves address space for its maximum size up front and
//! commits pages to it as it grows. Because the base address never changes,
//! growing never relocates anything. Only operations that shift elements
//! (insert, erase, resize) invalidate pointers into the container.
//!
//! Underneath are two smaller pieces you can use on their own:
//!
//! * [`Reservation`] owns a page-aligned range of reserved address space.
//! * [`PageStack`] commits and decommits a prefix of a reservation, a page at
//!   a time.
//!
//! The operating system is reached through the [`VirtualMemory`] trait, which
//! [`System`] implements for unix and windows.
//!
//! ## Example
//!
//! ```
//! use pinned_vec::{GrowthFactor, MaxSize, PinnedVec};
//! // Room for a million names, committing one page at a time.
//! let mut names = PinnedVec::<String>::new(MaxSize::Elements(1_000_000))
//!     .unwrap()
//!     .with_growth_factor(GrowthFactor::new(3, 2));
//! let alice: *const String = names.push("alice".to_string()).unwrap();
//! names.try_extend((0..10_000).map(|i| format!("user{}", i))).unwrap();
//! assert_eq!(unsafe { &*alice }, "alice");
//! assert_eq!(names.len(), 10_001);
//! assert!(names.capacity() <= names.max_size());
//! ```
//!
//! ## Notes
//!
//! Zero-sized types are rejected at compile time, and element types may not
//! be aligned more strictly than a page.
mod error;
mod growth;
mod layout;
mod page_stack;
mod pinned_vec;
mod reservation;
mod uninit;
mod vm;

pub use error::{Error, Result};
pub use growth::GrowthFactor;
pub use layout::{round_up, MaxSize};
pub use page_stack::PageStack;
pub use pinned_vec::PinnedVec;
pub use reservation::Reservation;
pub use vm::{System, VirtualMemory};
