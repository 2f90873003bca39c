// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The task setup engine.
//!
//! One routine configures any of the sixteen tasks by interpreting its
//! [`TaskProfile`](crate::tasks::TaskProfile): it resolves the task's
//! relocated tables, programs the variable and increment slots, patches
//! requestor words when the initiator is caller-chosen, and arms or re-arms
//! the descriptor ring for ring-walking tasks.
//!
//! The parameter block is in/out. Where a task's microcode leaves no
//! freedom, the request is coerced and the effective value written back, so
//! callers can always read what the hardware will actually do.

use drv_mpc5200_bestcomm_api::{
    ElementSize, TaskError, TaskId, TaskSetupParams, TransferSize,
};
use sram_pool::SramPool;

use crate::image::TaskRef;
use drv_mpc5200_bestcomm_api::Initiator;

use crate::regs::{
    self, Pragma, SdmaRegs, TCR_ALWAYS_INIT, TCR_AUTO_START,
    TCR_AUTO_START_TASK_MASK, TCR_EN, TCR_INITIATOR_MASK, BD_LEN_MASK,
};
use crate::ring::RingTable;
use crate::tasks::{self, Completion, IncrPolicy, InitiatorPolicy, Side, SizePolicy};
use crate::AddressMap;

/// Increment-table slot of the per-iteration byte-count decrement, common
/// to every task in the image.
const INC_BYTES_SLOT: u8 = 0;

/// Everything the engine borrows from the controller for one setup call.
pub(crate) struct SetupCtx<'a> {
    pub regs: &'a SdmaRegs,
    pub rings: &'a mut RingTable,
    pub pool: &'a mut SramPool,
    pub map: &'a AddressMap,
    /// CPU pointer to the loaded image.
    pub sram: *mut u8,
    /// Byte offset of the descriptor table within the image.
    pub offset_entry: usize,
    /// Device address of the controller register block, for the
    /// self-disable pointer ring tasks carry.
    pub regs_device_base: u32,
}

pub(crate) fn task_setup(
    ctx: &mut SetupCtx<'_>,
    task: TaskId,
    params: &mut TaskSetupParams,
) -> Result<(), TaskError> {
    let t = task.index();
    let profile = tasks::profile(t);
    let tref = TaskRef::resolve(profile, ctx.sram, ctx.offset_entry, ctx.map);

    // Reconfiguring a live task is a caller bug; stop it regardless so the
    // microcode cannot observe a half-written variable table.
    debug_assert!(
        ctx.regs.tcr[t].get() & TCR_EN == 0,
        "setup of running task {t}"
    );
    ctx.regs.modify_tcr(t, TCR_EN, 0);

    let mut pragma = Pragma::from_bits_truncate(profile.pragma);
    if profile.misaligned {
        // Arbitrary alignment needs packed partial elements instead of
        // integer-aligned bursts.
        pragma.remove(Pragma::INTEGER_MODE);
        pragma.insert(Pragma::PACK_DATA);
    }
    tref.write_pragma(pragma.bits());

    if let SizePolicy::Fixed(size) = profile.size {
        params.sz_src = size;
        params.sz_dst = size;
    }

    let mut ring_base = None;
    match profile.completion {
        Completion::Ring {
            max_bd,
            base_slot,
            last_slot,
            start_slot,
            enable_slot,
            num_ptr,
            flag_drd,
        } => {
            let max_buf = match params.size {
                TransferSize::MaxBuf(n) => n,
                TransferSize::ByteCount(_) => return Err(TaskError::InvalidArg),
            };
            if params.num_bd == 0 || params.num_bd > max_bd {
                return Err(TaskError::InvalidArg);
            }
            if max_buf > BD_LEN_MASK {
                return Err(TaskError::SizeTooLarge);
            }
            let map = &ctx.map;
            let ring = ctx.rings.setup(
                ctx.pool,
                |p| map.device_addr(p),
                t,
                params.num_bd,
                max_bd,
                num_ptr,
                0,
            );
            tref.write_var(base_slot, ring.device_base());
            tref.write_var(last_slot, ring.device_last());
            tref.write_var(start_slot, ring.device_base());
            tref.write_var(profile.bytes_slot, max_buf);
            // The microcode clears its own enable bit when it runs out of
            // ready descriptors.
            tref.write_var(
                enable_slot,
                ctx.regs_device_base
                    + core::mem::offset_of!(SdmaRegs, tcr) as u32
                    + 2 * t as u32,
            );
            if let Some((slot, drd_index)) = flag_drd {
                tref.write_var(
                    slot,
                    tref.code_base + u32::from(profile.drd_offsets[usize::from(drd_index)]),
                );
            }
            ring_base = Some(ring.device_base());
        }
        Completion::ByteCount { iter_slot } => {
            let bytes = match params.size {
                TransferSize::ByteCount(n) => n,
                TransferSize::MaxBuf(_) => return Err(TaskError::InvalidArg),
            };
            let elem = u32::from(params.sz_src.bytes().max(params.sz_dst.bytes()));
            if bytes == 0 || bytes % elem != 0 {
                return Err(TaskError::InvalidArg);
            }
            tref.write_var(profile.bytes_slot, bytes);
            tref.write_var(iter_slot, bytes / elem - 1);
        }
    }

    apply_auto_start(ctx.regs, t, profile.auto_start);

    match profile.initiator {
        InitiatorPolicy::Fixed(initiator) => {
            params.initiator = initiator;
        }
        InitiatorPolicy::Runtime => {
            ctx.regs.modify_tcr(
                t,
                TCR_INITIATOR_MASK,
                regs::tcr_initiator(params.initiator.number()),
            );
            patch_drd_initiators(&tref, params.initiator.number());
        }
    }
    // An unpaced task must not wait on a request line.
    ctx.regs.modify_tcr(
        t,
        TCR_ALWAYS_INIT,
        if params.initiator == Initiator::Always {
            TCR_ALWAYS_INIT
        } else {
            0
        },
    );

    let src_stride = apply_side(
        &tref,
        &profile.src,
        params.sz_src,
        params.incr_src,
        &mut params.start_addr_src,
        ring_base,
    );
    params.incr_src = src_stride;
    let dst_stride = apply_side(
        &tref,
        &profile.dst,
        params.sz_dst,
        params.incr_dst,
        &mut params.start_addr_dst,
        ring_base,
    );
    params.incr_dst = dst_stride;

    ctx.regs
        .write_size_codes(t, params.sz_src.code(), params.sz_dst.code());

    tref.write_inc(
        INC_BYTES_SLOT,
        byte_decrement(src_stride, dst_stride, profile.default_incr_bytes),
    );

    Ok(())
}

/// Encodes an auto-start request into the two TCR chaining fields.
///
/// `-1` chains the task to itself, a valid task number chains to that task,
/// anything else disables chaining (the target field still names the task
/// itself, matching what the hardware resets to).
pub(crate) fn auto_start_bits(auto_start: i8, task: usize) -> u16 {
    let (enable, target) = match auto_start {
        -1 => (TCR_AUTO_START, task as u16),
        n if (0..16).contains(&i32::from(n)) => (TCR_AUTO_START, n as u16),
        _ => (0, task as u16),
    };
    enable | (target & TCR_AUTO_START_TASK_MASK)
}

fn apply_auto_start(regs: &SdmaRegs, task: usize, auto_start: i8) {
    regs.modify_tcr(
        task,
        TCR_AUTO_START | TCR_AUTO_START_TASK_MASK,
        auto_start_bits(auto_start, task),
    );
}

/// Rewrites the initiator field of every requestor word that carries one.
///
/// Words marked always-ready are left alone, as is the tail of an extended
/// pair (its bits are operand payload, not an initiator field).
fn patch_drd_initiators(tref: &TaskRef, initiator: u8) {
    for (ptr, is_continuation) in tref.drd_words() {
        if is_continuation {
            continue;
        }
        let word = unsafe { ptr.read_volatile() };
        if regs::drd_initiator(word) == 0 {
            continue;
        }
        unsafe { ptr.write_volatile(regs::drd_with_initiator(word, initiator)) };
    }
}

/// Programs one side's address and stride slots. Returns the stride
/// actually programmed, zero for FIFO ports.
fn apply_side(
    tref: &TaskRef,
    side: &Side,
    size: ElementSize,
    requested: i16,
    start_addr: &mut u32,
    ring_base: Option<u32>,
) -> i16 {
    let stride = match side.incr {
        IncrPolicy::Fifo => 0,
        IncrPolicy::Auto { slot } => {
            let s = if requested < 0 {
                -i16::from(size.bytes())
            } else {
                i16::from(size.bytes())
            };
            tref.write_inc(slot, s);
            s
        }
        IncrPolicy::Runtime { slot } => {
            tref.write_inc(slot, requested);
            requested
        }
    };

    match side.addr_slot {
        Some(slot) => tref.write_var(slot, *start_addr),
        // Ring sides take their addresses from descriptors; report where
        // the ring lives instead.
        None => {
            if let Some(base) = ring_base {
                *start_addr = base;
            }
        }
    }

    if let Some(ma) = side.ma_slot {
        tref.write_inc(ma, stride.signum());
    }

    stride
}

/// The per-iteration byte-count decrement: the magnitude of the first
/// nonzero stride, negated, falling back to the profile default.
fn byte_decrement(src_stride: i16, dst_stride: i16, default: i16) -> i16 {
    if src_stride != 0 {
        -src_stride.abs()
    } else if dst_stride != 0 {
        -dst_stride.abs()
    } else {
        -default.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::TCR_AUTO_START;

    #[test]
    fn auto_start_encoding() {
        // Disabled request: no enable bit, target is the task itself.
        assert_eq!(auto_start_bits(-3, 5), 5);
        // Self-restart.
        assert_eq!(auto_start_bits(-1, 5), TCR_AUTO_START | 5);
        // Chain to task 0, chain to task 5.
        assert_eq!(auto_start_bits(0, 9), TCR_AUTO_START);
        assert_eq!(auto_start_bits(5, 9), TCR_AUTO_START | 5);
    }

    #[test]
    fn byte_decrement_prefers_source() {
        assert_eq!(byte_decrement(4, 2, 4), -4);
        assert_eq!(byte_decrement(-2, 4, 4), -2);
        assert_eq!(byte_decrement(0, -4, 2), -4);
        assert_eq!(byte_decrement(0, 0, 2), -2);
    }
}
