// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Allocate-once pool over a fixed on-chip memory window.
//!
//! The BestComm engine carves its microcode image and descriptor rings out of
//! a single window of SRAM handed over at init. Nothing in that window is
//! ever freed: rings are allocated exactly once per task and persist for the
//! life of the system, and reconfiguration reuses the original storage. A
//! bump pointer is therefore the entire allocator.
//!
//! Exhausting the pool means the board configuration asks for more rings than
//! the window can hold, which is a build-time defect, not a runtime
//! condition. Callers treat `None` from [`SramPool::alloc`] accordingly.

#![cfg_attr(not(test), no_std)]

pub struct SramPool {
    base: *mut u8,
    len: usize,
    next: usize,
}

// The pool owns its window exclusively (see `new`), so handing the pool to
// another context moves that ownership with it.
unsafe impl Send for SramPool {}

impl SramPool {
    /// Creates a pool over `[base, base + len)`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that the window is valid for reads and
    /// writes for the life of the pool and that nothing else allocates from
    /// or writes to it except through pointers returned by `alloc`.
    pub unsafe fn new(base: *mut u8, len: usize) -> Self {
        Self { base, len, next: 0 }
    }

    /// Hands out `size` bytes aligned to `align`, or `None` if the window is
    /// exhausted. `align` must be a power of two.
    ///
    /// The returned region is never reclaimed.
    pub fn alloc(&mut self, size: usize, align: usize) -> Option<*mut u8> {
        debug_assert!(align.is_power_of_two());

        let start = (self.next + align - 1) & !(align - 1);
        let end = start.checked_add(size)?;
        if end > self.len {
            return None;
        }
        self.next = end;
        Some(self.base.wrapping_add(start))
    }

    /// Bytes still available, ignoring any alignment padding a future
    /// allocation might need.
    pub fn remaining(&self) -> usize {
        self.len - self.next
    }

    /// Base address of the window.
    pub fn base(&self) -> *mut u8 {
        self.base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(len: usize) -> (SramPool, *mut u8) {
        let mem = Box::leak(vec![0u8; len].into_boxed_slice());
        let base = mem.as_mut_ptr();
        (unsafe { SramPool::new(base, len) }, base)
    }

    #[test]
    fn first_alloc_is_at_base() {
        let (mut p, base) = pool(64);
        assert_eq!(p.alloc(16, 4), Some(base));
        assert_eq!(p.remaining(), 48);
    }

    #[test]
    fn allocations_do_not_overlap() {
        let (mut p, base) = pool(64);
        let a = p.alloc(10, 1).unwrap();
        let b = p.alloc(10, 1).unwrap();
        assert_eq!(a, base);
        assert_eq!(b, base.wrapping_add(10));
    }

    #[test]
    fn alignment_is_honored() {
        let (mut p, base) = pool(64);
        p.alloc(3, 1).unwrap();
        let a = p.alloc(8, 8).unwrap();
        assert_eq!(a, base.wrapping_add(8));
    }

    #[test]
    fn exhaustion_returns_none_and_keeps_state() {
        let (mut p, _) = pool(32);
        assert!(p.alloc(32, 4).is_some());
        assert_eq!(p.alloc(1, 1), None);
        assert_eq!(p.remaining(), 0);
    }
}
