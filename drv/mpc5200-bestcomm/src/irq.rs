// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interrupt demultiplexing.
//!
//! The controller raises a single interrupt for all thirty-two sources.
//! Client drivers install a handler per source; dispatch walks the unmasked
//! pending word and fans out. A pending source nobody claimed is
//! acknowledged anyway so a misconfigured peripheral cannot wedge the line.

use drv_mpc5200_bestcomm_api::NUM_IRQ_SOURCES;

use crate::regs::{self, SdmaRegs};

/// A client's completion callback. Implementations run in interrupt
/// context and must not block.
pub trait BestCommHandler: Sync {
    /// Called with the source number whose pending bit was set.
    fn on_interrupt(&self, source: u8);
}

/// Environment hooks the controller cannot provide itself.
pub trait Platform {
    /// Runs `f` with the controller's interrupt masked at the CPU, for the
    /// handler-table updates that race with dispatch.
    fn with_irqs_masked<R>(&self, f: impl FnOnce() -> R) -> R;
}

/// One handler slot per demultiplexed source.
pub(crate) struct HandlerTable {
    handlers: [Option<&'static dyn BestCommHandler>; NUM_IRQ_SOURCES],
}

impl HandlerTable {
    pub const fn new() -> Self {
        Self {
            handlers: [None; NUM_IRQ_SOURCES],
        }
    }

    /// Installs `handler` for `source`, unmasking it. Replacing a handler
    /// is allowed; the previous one stops being called.
    pub fn install(
        &mut self,
        regs: &SdmaRegs,
        source: usize,
        handler: &'static dyn BestCommHandler,
    ) {
        self.handlers[source] = Some(handler);
        // Drop any stale event from before the handler existed.
        regs.int_pend.set(regs::pending_bit(source));
        regs.int_mask
            .set(regs.int_mask.get() & !regs::pending_bit(source));
    }

    /// Removes the handler for `source` and masks it.
    pub fn remove(&mut self, regs: &SdmaRegs, source: usize) {
        regs.int_mask
            .set(regs.int_mask.get() | regs::pending_bit(source));
        self.handlers[source] = None;
    }

    pub fn enable(&self, regs: &SdmaRegs, source: usize) {
        regs.int_mask
            .set(regs.int_mask.get() & !regs::pending_bit(source));
    }

    pub fn disable(&self, regs: &SdmaRegs, source: usize) {
        regs.int_mask
            .set(regs.int_mask.get() | regs::pending_bit(source));
    }

    /// Fans the unmasked pending word out to handlers, lowest source first.
    ///
    /// Handlers are expected to acknowledge their own source (typically via
    /// the clear operation) once they have drained the condition; a source
    /// with no handler is acknowledged here. Returns the number of sources
    /// dispatched.
    pub fn dispatch(&self, regs: &SdmaRegs) -> usize {
        let pending = regs.int_pend.get() & !regs.int_mask.get();
        let mut dispatched = 0;
        for source in 0..NUM_IRQ_SOURCES {
            if pending & regs::pending_bit(source) == 0 {
                continue;
            }
            match self.handlers[source] {
                Some(handler) => {
                    handler.on_interrupt(source as u8);
                    dispatched += 1;
                }
                None => regs.int_pend.set(regs::pending_bit(source)),
            }
        }
        dispatched
    }
}
