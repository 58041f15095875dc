use crate::types::*;
use std::fmt;

/// Holds the two copies of the underlying value that readers and the writer
/// see as a single logical value.
///
/// `Slots` guarantees the memory safety of the two storage locations: both
/// are initialized on construction and dropped together on `Slots::drop`.
/// It does *not* guarantee thread safety on its own. That requires the
/// discipline enforced by `Container`:
/// 1. `fg_index` names the slot readers may dereference. It is only ever
///    written by the writer holding `writer_lock`, with `Release` ordering
///    on publish, and only ever read with `Acquire` ordering by a reader
///    that has already taken its own reader lock.
/// 2. The slot at `1 - fg_index` ("background") is only ever touched by the
///    single writer currently inside `Modify`; readers never observe it.
pub(crate) struct Slots<T> {
    cells: [UnsafeCell<T>; 2],
    fg_index: AtomicUsize,
}

// SAFETY: access to each cell is partitioned between readers (foreground,
// shared) and the writer (background, exclusive) by `Container`; see the
// type-level comment above.
unsafe impl<T: Send> Sync for Slots<T> {}

impl<T> Slots<T> {
    pub fn new(foreground: T, background: T) -> Slots<T> {
        Slots {
            cells: [UnsafeCell::new(foreground), UnsafeCell::new(background)],
            fg_index: AtomicUsize::new(0),
        }
    }

    /// Loads the index of the slot currently exposed to readers.
    pub fn foreground_index(&self, order: Ordering) -> usize {
        self.fg_index.load(order)
    }

    /// Flips which slot is foreground. Only the writer may call this, with
    /// `Ordering::Release` so that every write the writer performed to
    /// `slots[idx]` before the flip happens-before any reader that observes
    /// the new index with `Ordering::Acquire`.
    pub fn publish(&self, idx: usize, order: Ordering) {
        debug_assert!(idx < 2);
        self.fg_index.store(idx, order);
    }

    /// Borrows `slots[idx]` immutably.
    ///
    /// SAFETY: the caller must guarantee no `&mut` borrow of the same slot
    /// is concurrently live. For the foreground slot this holds because the
    /// writer never mutates it while it's foreground; for the background
    /// slot it holds because only the single writer ever touches it.
    pub unsafe fn slot(&self, idx: usize) -> &T {
        self.cells[idx].get()
    }

    /// Borrows `slots[idx]` mutably.
    ///
    /// SAFETY: the caller must guarantee exclusive access to `slots[idx]`
    /// for the lifetime of the returned reference (true for the background
    /// slot under the single-writer discipline `Container` enforces).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_mut(&self, idx: usize) -> &mut T {
        self.cells[idx].get_mut()
    }

    /// Borrows `slots[idx]` mutably and `slots[1 - idx]` immutably at once,
    /// for `ModifyWithForeground`. Sound because `idx != 1 - idx`, so the
    /// two returned references never alias.
    ///
    /// SAFETY: same exclusivity requirement on `slots[idx]` as `slot_mut`.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slot_mut_and_other(&self, idx: usize) -> (&mut T, &T) {
        debug_assert!(idx < 2);
        let other = 1 - idx;
        (self.cells[idx].get_mut(), self.cells[other].get())
    }
}

impl<T: fmt::Debug> fmt::Debug for Slots<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slots")
            .field("fg_index", &self.fg_index.load(Ordering::Relaxed))
            .finish()
    }
}
