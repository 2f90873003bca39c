// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Buffer descriptor rings.
//!
//! A BestComm buffer descriptor (BD) is one status word followed by one or
//! two data pointer words, laid out in SRAM where the task microcode walks
//! them. The status word's ready bit is the only handshake between software
//! and the coprocessor:
//!
//! - software fills a descriptor and sets ready, handing it to the hardware;
//! - the hardware clears ready when it has consumed the descriptor.
//!
//! While ready is set we must treat the descriptor as foreign memory: the
//! engine may rewrite the status word (it stores residual counts there) at
//! any time. All descriptor access therefore goes through volatile reads and
//! writes of raw words, and the ring only materializes values, never
//! references, for in-flight descriptors.
//!
//! Descriptors move through the ring strictly FIFO. Two cursors and an
//! in-use count distinguish full from empty:
//!
//! ```text
//!    +--------------------------------------------+
//!    |  free  |  READY (owned by hw)  |  free     |
//!    +--------------------------------------------+
//!       tail --^                       ^-- head
//!       (next release)                 (next assign)
//! ```
//!
//! Ring storage comes from the SRAM pool and is allocated exactly once per
//! task, sized for the capacity compiled into the task image.
//! Reconfiguration reuses the storage and re-arms only the visible prefix of
//! the ring.

use drv_mpc5200_bestcomm_api::{BdFlags, BdIndex, TaskError, NUM_TASKS};
use sram_pool::SramPool;

use crate::regs::{BD_LEN_MASK, BD_READY};

/// One task's descriptor ring.
pub struct BdRing {
    /// CPU pointer to the first status word. Raw rather than a reference:
    /// the ring owns the storage but loans in-flight descriptors to the DMA
    /// engine, which a `&mut` would falsely claim exclusive.
    base: *mut u32,
    /// Device address of the first status word, as the microcode sees it.
    device_base: u32,
    /// Capacity compiled into the task image.
    max_bd: u16,
    /// Live ring length; wrap happens here, not at `max_bd`.
    num_bd: u16,
    /// Data pointers per descriptor, 1 or 2.
    num_ptr: u8,
    in_use: u16,
    /// Next descriptor to assign.
    head: u16,
    /// Next descriptor to release.
    tail: u16,
}

// The ring hands its storage to the DMA engine but is itself driven from a
// single context; moving it between contexts is fine.
unsafe impl Send for BdRing {}

/// Words per descriptor for a given pointer width.
fn words_per_bd(num_ptr: u8) -> usize {
    1 + usize::from(num_ptr)
}

impl BdRing {
    fn word(&self, index: usize) -> *mut u32 {
        self.base.wrapping_add(index)
    }

    fn status_ptr(&self, bd: u16) -> *mut u32 {
        self.word(usize::from(bd) * words_per_bd(self.num_ptr))
    }

    /// Device address of descriptor `bd`.
    pub fn device_addr(&self, bd: u16) -> u32 {
        self.device_base + (u32::from(bd) * words_per_bd(self.num_ptr) as u32 * 4)
    }

    /// Device address of the first descriptor.
    pub fn device_base(&self) -> u32 {
        self.device_base
    }

    /// Device address of the last descriptor of the *visible* ring, i.e. the
    /// wrap-around point for the microcode.
    pub fn device_last(&self) -> u32 {
        self.device_addr(self.num_bd - 1)
    }

    pub fn num_bd(&self) -> u16 {
        self.num_bd
    }

    pub fn num_ptr(&self) -> u8 {
        self.num_ptr
    }

    pub fn in_use(&self) -> u16 {
        self.in_use
    }

    /// Re-arms the first `num_bd` descriptors: status words take `status`,
    /// data pointers are zeroed, both cursors return to slot zero.
    fn rearm(&mut self, num_bd: u16, status: u32) {
        self.num_bd = num_bd;
        self.in_use = 0;
        self.head = 0;
        self.tail = 0;
        let words = words_per_bd(self.num_ptr);
        for bd in 0..usize::from(num_bd) {
            unsafe {
                self.word(bd * words).write_volatile(status);
                for p in 1..words {
                    self.word(bd * words + p).write_volatile(0);
                }
            }
        }
    }

    /// Binds the next free descriptor to `buf0` (and `buf1` for two-pointer
    /// rings), sets its length and flag bits, and hands it to the hardware.
    /// Returns the descriptor's ring index.
    pub fn assign(
        &mut self,
        buf0: u32,
        buf1: u32,
        len: u32,
        flags: BdFlags,
    ) -> Result<BdIndex, TaskError> {
        if self.in_use == self.num_bd {
            return Err(TaskError::BdRingFull);
        }
        if len > BD_LEN_MASK {
            return Err(TaskError::SizeTooLarge);
        }

        let bd = self.head;
        let status = self.status_ptr(bd);
        unsafe {
            status.wrapping_add(1).write_volatile(buf0);
            if self.num_ptr == 2 {
                status.wrapping_add(2).write_volatile(buf1);
            }
            // Ready last: the hardware must not see the descriptor before
            // its pointers are in place.
            status.write_volatile(BD_READY | flags.bits() | len);
        }

        self.head = (self.head + 1) % self.num_bd;
        self.in_use += 1;
        Ok(bd)
    }

    /// Retires the oldest in-flight descriptor if the hardware has finished
    /// with it, returning its ring index.
    pub fn release(&mut self) -> Result<BdIndex, TaskError> {
        if self.in_use == 0 {
            return Err(TaskError::BdRingEmpty);
        }
        let bd = self.tail;
        let status = unsafe { self.status_ptr(bd).read_volatile() };
        if status & BD_READY != 0 {
            return Err(TaskError::BdBusy);
        }
        self.tail = (self.tail + 1) % self.num_bd;
        self.in_use -= 1;
        Ok(bd)
    }

    /// Forces the ring back to empty without touching capacity or pointer
    /// width. Used when recovering a task after an error stop.
    pub fn reset(&mut self) {
        let num_bd = self.num_bd;
        self.rearm(num_bd, 0);
    }

    /// A peek handle for descriptor `bd`, or `None` past the visible ring.
    pub fn get(&self, bd: u16) -> Option<Bd> {
        if bd < self.num_bd {
            Some(Bd {
                status: self.status_ptr(bd),
                num_ptr: self.num_ptr,
            })
        } else {
            None
        }
    }
}

/// Client view of a single descriptor. Reads and writes are volatile; the
/// descriptor may be hardware-owned while peeked.
#[derive(Copy, Clone)]
pub struct Bd {
    status: *mut u32,
    num_ptr: u8,
}

impl Bd {
    pub fn status(&self) -> u32 {
        unsafe { self.status.read_volatile() }
    }

    pub fn set_status(&self, status: u32) {
        unsafe { self.status.write_volatile(status) }
    }

    pub fn is_ready(&self) -> bool {
        self.status() & BD_READY != 0
    }

    pub fn len(&self) -> u32 {
        self.status() & BD_LEN_MASK
    }

    pub fn data_ptr(&self, which: u8) -> u32 {
        debug_assert!(which < self.num_ptr);
        unsafe { self.status.wrapping_add(1 + usize::from(which)).read_volatile() }
    }
}

/// The per-task ring table: slot `n` belongs to hardware task `n`.
pub struct RingTable {
    rings: [Option<BdRing>; NUM_TASKS],
}

impl RingTable {
    pub const fn new() -> Self {
        const NONE: Option<BdRing> = None;
        Self { rings: [NONE; NUM_TASKS] }
    }

    pub fn get(&self, task: usize) -> Option<&BdRing> {
        self.rings.get(task)?.as_ref()
    }

    pub fn get_mut(&mut self, task: usize) -> Option<&mut BdRing> {
        self.rings.get_mut(task)?.as_mut()
    }

    /// Creates or re-arms task `task`'s ring.
    ///
    /// The first call for a task allocates `max_bd` descriptors' worth of
    /// SRAM and fixes the pointer width; the storage is never reallocated,
    /// so later reconfiguration cannot leak or fragment the pool. Every call
    /// re-arms the first `num_bd` descriptors with `status` and zeroed
    /// pointers.
    ///
    /// Panics when `num_ptr` is not 1 or 2 or when the pool is exhausted;
    /// both are board-configuration defects with no runtime recovery.
    pub fn setup(
        &mut self,
        pool: &mut SramPool,
        device_base_of: impl Fn(*mut u8) -> u32,
        task: usize,
        num_bd: u16,
        max_bd: u16,
        num_ptr: u8,
        status: u32,
    ) -> &mut BdRing {
        assert!(num_ptr == 1 || num_ptr == 2, "bad BD pointer width");

        let slot = &mut self.rings[task];
        if slot.is_none() {
            let bytes = usize::from(max_bd) * words_per_bd(num_ptr) * 4;
            let base = pool
                .alloc(bytes, 4)
                .expect("SRAM pool exhausted allocating a BD ring");
            *slot = Some(BdRing {
                base: base.cast(),
                device_base: device_base_of(base),
                max_bd,
                num_bd,
                num_ptr,
                in_use: 0,
                head: 0,
                tail: 0,
            });
        }

        let ring = slot.as_mut().unwrap();
        debug_assert_eq!(ring.num_ptr, num_ptr);
        debug_assert!(num_bd <= ring.max_bd);
        ring.rearm(num_bd, status);
        ring
    }
}
