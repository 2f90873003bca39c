// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task control and interrupt register operations.
//!
//! Thin, register-level operations over a configured task: run control via
//! its TCR, and the shared pending/mask words that multiplex the sixteen
//! completion interrupts with the transfer-error and debug pseudo sources.

use drv_mpc5200_bestcomm_api::{IrqSource, TaskId};

use crate::regs::{
    self, SdmaRegs, INT_BIT_DBG, INT_BIT_TEA, TCR_AUTO_START,
    TCR_AUTO_START_TASK_MASK, TCR_EN, TCR_HOLD_INITIATOR, TCR_VALID,
};

/// Starts (or restarts) a task.
///
/// `auto_start` reprograms the chaining fields for this run; `None` keeps
/// whatever setup established. `intr_enable` holds the initiator for the
/// task's whole run so its completion interrupt fires once per start rather
/// than per request.
pub(crate) fn task_start(
    regs: &SdmaRegs,
    task: TaskId,
    auto_start: Option<TaskId>,
    intr_enable: bool,
) {
    let mut mask = TCR_EN | TCR_VALID | TCR_HOLD_INITIATOR;
    let mut bits = TCR_EN | TCR_VALID;
    if intr_enable {
        bits |= TCR_HOLD_INITIATOR;
    }
    if let Some(target) = auto_start {
        mask |= TCR_AUTO_START | TCR_AUTO_START_TASK_MASK;
        bits |= TCR_AUTO_START | (target.index() as u16 & TCR_AUTO_START_TASK_MASK);
    }
    regs.modify_tcr(task.index(), mask, bits);
}

/// Stops a task at its next descriptor boundary by dropping its enable bit.
pub(crate) fn task_stop(regs: &SdmaRegs, task: TaskId) {
    regs.modify_tcr(task.index(), TCR_EN, 0);
}

/// Whether the task's enable bit is currently set. Ring-walking tasks clear
/// it themselves when they drain their ring.
pub(crate) fn task_running(regs: &SdmaRegs, task: TaskId) -> bool {
    regs.tcr[task.index()].get() & TCR_EN != 0
}

/// The task's raw control register, for callers that want more than the
/// enable bit.
pub(crate) fn task_status(regs: &SdmaRegs, task: TaskId) -> u16 {
    regs.tcr[task.index()].get()
}

/// Acknowledges one source's pending bit. The pending register is
/// write-one-to-clear.
pub(crate) fn int_clear(regs: &SdmaRegs, source: usize) {
    regs.int_pend.set(regs::pending_bit(source));
}

/// Whether `source` is pending, regardless of masking.
pub(crate) fn int_status(regs: &SdmaRegs, source: usize) -> bool {
    regs.int_pend.get() & regs::pending_bit(source) != 0
}

/// The raw pending word, filtered by the mask.
pub(crate) fn int_pending(regs: &SdmaRegs) -> u32 {
    regs.int_pend.get() & !regs.int_mask.get()
}

/// Identifies the highest-priority unmasked pending source, if any.
///
/// A bus error outranks everything and reports the task that was bus
/// master when it fired. Debug comes next, then task completions from the
/// highest task number down, matching the hardware's own arbitration.
pub(crate) fn int_source(regs: &SdmaRegs) -> Option<IrqSource> {
    let pending = int_pending(regs);
    if pending & regs::pending_bit(INT_BIT_TEA as usize) != 0 {
        // The task field is only meaningful while the TEA bit is up.
        let task = regs::tea_task(regs.int_pend.get());
        return Some(IrqSource::TransferError(TaskId::new(task)));
    }
    if pending & regs::pending_bit(INT_BIT_DBG as usize) != 0 {
        return Some(IrqSource::Debug);
    }
    for task in (0..16).rev() {
        if pending & regs::pending_bit(task) != 0 {
            return Some(IrqSource::Task(TaskId::new(task as u8)));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::INT_TEA_TASK_SHIFT;
    use crate::testutil;

    #[test]
    fn start_stop_preserve_chaining_bits() {
        let fix = testutil::Fixture::new();
        let task = TaskId::new(5);
        fix.regs.modify_tcr(5, 0, TCR_AUTO_START | 5);

        task_start(fix.regs, task, None, false);
        let tcr = fix.regs.tcr[5].get();
        assert_eq!(tcr & TCR_EN, TCR_EN);
        assert_eq!(tcr & TCR_VALID, TCR_VALID);
        // Chaining programmed at setup survives a plain start.
        assert_eq!(tcr & (TCR_AUTO_START | 0xF), TCR_AUTO_START | 5);
        assert!(task_running(fix.regs, task));

        task_stop(fix.regs, task);
        assert!(!task_running(fix.regs, task));
        assert_eq!(fix.regs.tcr[5].get() & (TCR_AUTO_START | 0xF), TCR_AUTO_START | 5);
    }

    #[test]
    fn start_can_reprogram_chaining() {
        let fix = testutil::Fixture::new();
        task_start(fix.regs, TaskId::new(2), Some(TaskId::new(7)), true);
        let tcr = fix.regs.tcr[2].get();
        assert_eq!(tcr & TCR_HOLD_INITIATOR, TCR_HOLD_INITIATOR);
        assert_eq!(tcr & (TCR_AUTO_START | 0xF), TCR_AUTO_START | 7);
        assert_eq!(task_status(fix.regs, TaskId::new(2)), tcr);
    }

    #[test]
    fn source_priority_tea_then_debug_then_high_task() {
        let fix = testutil::Fixture::new();
        fix.regs.int_mask.set(0);
        fix.regs.int_pend.set(
            regs::pending_bit(3)
                | regs::pending_bit(12)
                | regs::pending_bit(INT_BIT_DBG as usize)
                | regs::pending_bit(INT_BIT_TEA as usize)
                | (7 << INT_TEA_TASK_SHIFT),
        );
        assert_eq!(
            int_source(fix.regs),
            Some(IrqSource::TransferError(TaskId::new(7)))
        );

        fix.regs.int_pend.set(
            regs::pending_bit(3)
                | regs::pending_bit(12)
                | regs::pending_bit(INT_BIT_DBG as usize),
        );
        assert_eq!(int_source(fix.regs), Some(IrqSource::Debug));

        fix.regs
            .int_pend
            .set(regs::pending_bit(3) | regs::pending_bit(12));
        assert_eq!(int_source(fix.regs), Some(IrqSource::Task(TaskId::new(12))));
    }

    #[test]
    fn masked_sources_are_invisible_to_queries() {
        let fix = testutil::Fixture::new();
        fix.regs.int_pend.set(regs::pending_bit(4));
        fix.regs.int_mask.set(regs::pending_bit(4));
        assert_eq!(int_pending(fix.regs), 0);
        assert_eq!(int_source(fix.regs), None);
        // Raw status still sees it.
        assert!(int_status(fix.regs, 4));
    }
}
