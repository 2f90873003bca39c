// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SDMA register block and hardware word layouts.
//!
//! The MPC5200 has no machine-readable register description, so the block is
//! written out by hand from the reference manual's SDMA chapter. The manual
//! numbers bits big-endian (bit 0 is the MSB); the constants below are the
//! usual shift-and-mask translation.

use bitflags::bitflags;
use vcell::VolatileCell;

/// The SDMA register block, at `MBAR + 0x1200` on real hardware.
#[repr(C)]
pub struct SdmaRegs {
    /// Base (device address) of the task descriptor table in SRAM.
    pub task_bar: VolatileCell<u32>,
    pub current_pointer: VolatileCell<u32>,
    pub end_pointer: VolatileCell<u32>,
    pub variable_pointer: VolatileCell<u32>,
    pub int_vect1: VolatileCell<u8>,
    pub int_vect2: VolatileCell<u8>,
    pub ptd_control: VolatileCell<u16>,
    /// Interrupt pending, one bit per source; write one to clear.
    pub int_pend: VolatileCell<u32>,
    /// Interrupt mask; a set bit suppresses the source.
    pub int_mask: VolatileCell<u32>,
    /// Task control registers, one per task.
    pub tcr: [VolatileCell<u16>; super::NUM_TASKS],
    /// Per-initiator priority bytes.
    pub ipr: [VolatileCell<u8>; 32],
    pub c_req_select: VolatileCell<u32>,
    /// Source/destination element-size codes, one byte per task pair.
    pub task_size: [VolatileCell<u8>; super::NUM_TASKS / 2],
    pub reserved_0: VolatileCell<u32>,
    pub reserved_1: VolatileCell<u32>,
    pub value1: VolatileCell<u32>,
    pub value2: VolatileCell<u32>,
    pub control: VolatileCell<u32>,
    pub status: VolatileCell<u32>,
}

// Task control register (16 bit, manual bits 0..15 MSB-first).

/// Task enable (manual bit 0).
pub const TCR_EN: u16 = 1 << 15;
/// Initiator-valid flag (manual bit 1).
pub const TCR_VALID: u16 = 1 << 14;
/// Treat the initiator as always asserted (manual bit 2).
pub const TCR_ALWAYS_INIT: u16 = 1 << 13;
/// Initiator number field (manual bits 3..7).
pub const TCR_INITIATOR_MASK: u16 = 0x1F << 8;
/// Auto-start enable (manual bit 8).
pub const TCR_AUTO_START: u16 = 1 << 7;
/// High-priority completion interrupt enable (manual bit 9).
pub const TCR_HIGH_ENABLE: u16 = 1 << 6;
/// Hold the initiator while the task runs (manual bit 10).
pub const TCR_HOLD_INITIATOR: u16 = 1 << 5;
/// Auto-start target task field (manual bits 12..15).
pub const TCR_AUTO_START_TASK_MASK: u16 = 0xF;

pub fn tcr_initiator(initiator: u8) -> u16 {
    u16::from(initiator & 0x1F) << 8
}

// Request-mux (PTD) control.

/// Hold outstanding transfers while a higher-priority initiator arbitrates.
pub const PTD_HOLD: u16 = 1;

// Interrupt pending/mask word.

/// Debug pseudo interrupt.
pub const INT_BIT_DBG: u32 = 31;
/// Transfer Error Acknowledge (bus error) pseudo interrupt.
pub const INT_BIT_TEA: u32 = 28;
/// Task number that was bus master when TEA fired (4 bits).
pub const INT_TEA_TASK_SHIFT: u32 = 24;
pub const INT_TEA_TASK_MASK: u32 = 0xF << INT_TEA_TASK_SHIFT;

pub fn pending_bit(source: usize) -> u32 {
    1 << source
}

pub fn tea_task(pending: u32) -> u8 {
    ((pending & INT_TEA_TASK_MASK) >> INT_TEA_TASK_SHIFT) as u8
}

// Buffer descriptor status word.

/// Descriptor is owned by the hardware.
pub const BD_READY: u32 = 1 << 30;
/// Transfer length field.
pub const BD_LEN_MASK: u32 = 0x03FF_FFFF;

// Data request descriptor (DRD) microcode word.

/// This DRD continues into the next word; the next word carries no
/// initiator field of its own.
pub const DRD_EXTENDED: u32 = 1 << 31;
pub const DRD_INITIATOR_SHIFT: u32 = 22;
pub const DRD_INITIATOR_MASK: u32 = 0x1F << DRD_INITIATOR_SHIFT;

pub fn drd_initiator(word: u32) -> u8 {
    ((word & DRD_INITIATOR_MASK) >> DRD_INITIATOR_SHIFT) as u8
}

pub fn drd_with_initiator(word: u32, initiator: u8) -> u32 {
    (word & !DRD_INITIATOR_MASK)
        | (u32::from(initiator & 0x1F) << DRD_INITIATOR_SHIFT)
}

bitflags! {
    /// The per-task pragma control byte: microcode data-handling policy,
    /// stored in the low byte of the task's function descriptor pointer.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct Pragma: u8 {
        const PRECISE_INCREMENT = 1 << 6;
        /// Do not reset error status when the task is re-enabled.
        const NO_ERROR_RESET = 1 << 5;
        const PACK_DATA = 1 << 4;
        /// Integer (as opposed to fractional) address alignment.
        const INTEGER_MODE = 1 << 3;
        const SPECULATIVE_READ = 1 << 2;
        const COMBINE_WRITES = 1 << 1;
        const READ_LINE_BUFFER = 1 << 0;
    }
}

impl SdmaRegs {
    /// Read-modify-write of one task's TCR: clears `mask`, then sets `bits`.
    pub fn modify_tcr(&self, task: usize, mask: u16, bits: u16) {
        let r = &self.tcr[task];
        r.set((r.get() & !mask) | bits);
    }

    /// Programs the two-bit source/destination size codes for `task`. Each
    /// byte of the task-size registers covers a pair of tasks, so this is a
    /// byte-level read-modify-write keyed by task parity.
    pub fn write_size_codes(&self, task: usize, src: u8, dst: u8) {
        let byte = &self.task_size[task / 2];
        let nibble = ((src & 0x3) << 2) | (dst & 0x3);
        let cur = byte.get();
        byte.set(if task % 2 == 0 {
            (cur & 0x0F) | (nibble << 4)
        } else {
            (cur & 0xF0) | nibble
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs() -> &'static SdmaRegs {
        // Zero is a valid (all clear) state for every register.
        Box::leak(unsafe { Box::<SdmaRegs>::new_zeroed().assume_init() })
    }

    #[test]
    fn tcr_modify_preserves_unrelated_bits() {
        let r = regs();
        r.tcr[4].set(TCR_HOLD_INITIATOR | 0x3);
        r.modify_tcr(4, TCR_AUTO_START_TASK_MASK | TCR_AUTO_START, TCR_AUTO_START | 0x5);
        assert_eq!(r.tcr[4].get(), TCR_HOLD_INITIATOR | TCR_AUTO_START | 0x5);
    }

    #[test]
    fn size_codes_pack_by_task_parity() {
        let r = regs();
        r.write_size_codes(0, 0b10, 0b01);
        r.write_size_codes(1, 0b00, 0b10);
        assert_eq!(r.task_size[0].get(), 0b1001_0010);
        // Reprogramming one task of the pair leaves the other alone.
        r.write_size_codes(0, 0b01, 0b01);
        assert_eq!(r.task_size[0].get(), 0b0101_0010);
    }

    #[test]
    fn drd_initiator_field_round_trips() {
        let word = DRD_EXTENDED | 0x0000_1234;
        let patched = drd_with_initiator(word, 9);
        assert_eq!(drd_initiator(patched), 9);
        assert_eq!(patched & !DRD_INITIATOR_MASK, word & !DRD_INITIATOR_MASK);
    }

    #[test]
    fn tea_task_extraction() {
        let pending = (1 << INT_BIT_TEA) | (0xA << INT_TEA_TASK_SHIFT);
        assert_eq!(tea_task(pending), 0xA);
    }
}
