// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Driver for the MPC5200 BestComm (SmartComm DMA) engine.
//!
//! BestComm is a microcoded coprocessor that runs up to sixteen DMA tasks
//! against on-chip SRAM. The driver loads the compiled task image into that
//! SRAM, configures individual tasks from a caller's parameter block,
//! manages the descriptor rings the ring-walking tasks consume, and
//! demultiplexes the engine's single interrupt line for client drivers.
//!
//! The [`BestComm`] controller owns the register block, the SRAM window,
//! and all per-task state. Host-side tests drive the whole stack against a
//! zeroed register image and a heap arena standing in for SRAM; the ready
//! bit handshake lets them play the coprocessor's half of the protocol.

#![cfg_attr(not(test), no_std)]

pub mod control;
pub mod image;
pub mod irq;
pub mod regs;
pub mod ring;
mod setup;
pub mod tasks;
pub mod trace;

pub use drv_mpc5200_bestcomm_api::{
    BdFlags, BdIndex, ElementSize, Initiator, IrqSource, TaskError, TaskId,
    TaskName, TaskSetupParams, TransferSize, NUM_IRQ_SOURCES, NUM_TASKS,
};
pub use image::TaskImage;
pub use irq::{BestCommHandler, Platform};
pub use trace::Event;

use sram_pool::SramPool;

use crate::irq::HandlerTable;
use crate::regs::SdmaRegs;
use crate::ring::{Bd, RingTable};
use crate::setup::SetupCtx;
use crate::trace::TraceBuf;

/// Depth of the retained event history.
const TRACE_DEPTH: usize = 32;

/// The CPU's view of the shared SRAM window versus the coprocessor's.
///
/// Every address handed to the hardware (descriptor pointers, task table
/// pointers) is a device address; every access the driver itself makes goes
/// through the CPU mapping. On real hardware the two coincide; under test
/// the window is a heap arena and they do not.
#[derive(Copy, Clone)]
pub struct AddressMap {
    /// CPU pointer to the first byte of the window.
    pub cpu_base: *mut u8,
    /// Device address of that same byte.
    pub device_base: u32,
    /// Window length in bytes.
    pub len: usize,
}

impl AddressMap {
    /// CPU pointer for a device address inside the window.
    pub fn cpu_addr(&self, device: u32) -> *mut u8 {
        debug_assert!(self.contains(device));
        self.cpu_base
            .wrapping_add(device.wrapping_sub(self.device_base) as usize)
    }

    /// Device address for a CPU pointer inside the window.
    pub fn device_addr(&self, cpu: *mut u8) -> u32 {
        let off = cpu as usize - self.cpu_base as usize;
        debug_assert!(off < self.len);
        self.device_base + off as u32
    }

    fn contains(&self, device: u32) -> bool {
        device.wrapping_sub(self.device_base) < self.len as u32
    }
}

// The window pointer is plain memory shared with a coprocessor, not
// thread-affine state.
unsafe impl Send for AddressMap {}

struct LoadedImage {
    /// CPU pointer to the image in SRAM.
    sram: *mut u8,
    /// Byte offset of the task descriptor table within the image.
    offset_entry: usize,
}

/// The BestComm controller.
pub struct BestComm<P: Platform> {
    regs: &'static SdmaRegs,
    /// Device address of `regs`, for pointers handed to the microcode.
    regs_device_base: u32,
    map: AddressMap,
    pool: SramPool,
    rings: RingTable,
    handlers: HandlerTable,
    image: Option<LoadedImage>,
    trace: TraceBuf<TRACE_DEPTH>,
    platform: P,
}

impl<P: Platform> BestComm<P> {
    /// Creates the controller over a mapped register block and SRAM window.
    ///
    /// Quiesces the engine: every task's control register is cleared, the
    /// request mux is put in its hold configuration, and every interrupt
    /// source is masked until a handler is installed.
    ///
    /// # Safety
    ///
    /// `map` must describe a mapped, exclusively-owned SRAM window of at
    /// least `map.len` bytes, and `regs_device_base` must be the device
    /// address of `regs`.
    pub unsafe fn new(
        regs: &'static SdmaRegs,
        regs_device_base: u32,
        map: AddressMap,
        platform: P,
    ) -> Self {
        for tcr in &regs.tcr {
            tcr.set(0);
        }
        regs.ptd_control.set(regs::PTD_HOLD);
        regs.int_mask.set(!0);
        Self {
            regs,
            regs_device_base,
            map,
            // Safety: the window contract is inherited from our own caller.
            pool: unsafe { SramPool::new(map.cpu_base, map.len) },
            rings: RingTable::new(),
            handlers: HandlerTable::new(),
            image: None,
            trace: TraceBuf::new(),
            platform,
        }
    }

    /// Copies the task image into SRAM, relocates it, and points the engine
    /// at its descriptor table. Must happen exactly once, before any task
    /// is configured.
    pub fn load_image(&mut self, img: &TaskImage<'_>) -> Result<(), TaskError> {
        let sram = self.place_image(img)?;
        // Safety: place_image reserved img.bytes.len() bytes at sram.
        unsafe { image::load(img, sram, self.map.device_addr(sram)) };
        self.finish_image(img, sram);
        Ok(())
    }

    /// Like [`Self::load_image`] for an image a boot loader already put at
    /// the start of the window: relocates in place without copying.
    pub fn attach_image(&mut self, img: &TaskImage<'_>) -> Result<(), TaskError> {
        let sram = self.place_image(img)?;
        // Safety: the caller's image contract says the bytes are already
        // present in the reserved region.
        unsafe { image::attach(img, sram, self.map.device_addr(sram)) };
        self.finish_image(img, sram);
        Ok(())
    }

    fn place_image(&mut self, img: &TaskImage<'_>) -> Result<*mut u8, TaskError> {
        if self.image.is_some() {
            return Err(TaskError::ApiAlreadyInitialized);
        }
        // The image is the pool's first allocation, so it lands at the
        // window base and image-relative offsets stay valid.
        self.pool
            .alloc(img.bytes.len(), 4)
            .ok_or(TaskError::SizeTooLarge)
    }

    fn finish_image(&mut self, img: &TaskImage<'_>, sram: *mut u8) {
        self.regs.task_bar.set(
            self.map.device_addr(sram) + img.offset_entry as u32,
        );
        self.image = Some(LoadedImage {
            sram,
            offset_entry: img.offset_entry,
        });
        self.trace.record(Event::ImageLoaded {
            tasks: img.task_count as u8,
        });
    }

    /// Configures a task from `params`. See [`TaskSetupParams`] for the
    /// in/out convention; the returned id is the handle for every further
    /// operation on the task.
    pub fn task_setup(
        &mut self,
        task: impl Into<TaskId>,
        params: &mut TaskSetupParams,
    ) -> Result<TaskId, TaskError> {
        let task = task.into();
        let img = self.image.as_ref().ok_or(TaskError::InvalidArg)?;
        let mut ctx = SetupCtx {
            regs: self.regs,
            rings: &mut self.rings,
            pool: &mut self.pool,
            map: &self.map,
            sram: img.sram,
            offset_entry: img.offset_entry,
            regs_device_base: self.regs_device_base,
        };
        match setup::task_setup(&mut ctx, task, params) {
            Ok(()) => {
                self.trace.record(Event::TaskSetup {
                    task: task.index() as u8,
                });
                Ok(task)
            }
            Err(err) => {
                self.trace.record(Event::TaskSetupFailed {
                    task: task.index() as u8,
                    err,
                });
                Err(err)
            }
        }
    }

    /// Starts a task. `auto_start` optionally reprograms the chaining
    /// target for this run; `intr_enable` holds the initiator so completion
    /// raises one interrupt per run.
    pub fn task_start(
        &mut self,
        task: TaskId,
        auto_start: Option<TaskId>,
        intr_enable: bool,
    ) {
        control::task_start(self.regs, task, auto_start, intr_enable);
        self.trace.record(Event::TaskStart {
            task: task.index() as u8,
        });
    }

    /// Stops a task at its next descriptor boundary.
    pub fn task_stop(&mut self, task: TaskId) {
        control::task_stop(self.regs, task);
        self.trace.record(Event::TaskStop {
            task: task.index() as u8,
        });
    }

    /// Whether the task's enable bit is up.
    pub fn task_running(&self, task: TaskId) -> bool {
        control::task_running(self.regs, task)
    }

    /// The task's raw control register.
    pub fn task_status(&self, task: TaskId) -> u16 {
        control::task_status(self.regs, task)
    }

    /// Per-initiator arbitration priority, 0 (lowest) to 7.
    pub fn set_initiator_priority(&mut self, initiator: Initiator, priority: u8) {
        self.regs.ipr[usize::from(initiator.number())].set(priority & 0x7);
    }

    /// Hands a buffer to the hardware on `task`'s ring. Two-pointer tasks
    /// take both a source and a destination buffer; one-pointer tasks
    /// ignore `buf1`.
    pub fn bd_assign(
        &mut self,
        task: TaskId,
        buf0: u32,
        buf1: u32,
        len: u32,
        flags: BdFlags,
    ) -> Result<BdIndex, TaskError> {
        let t = task.index() as u8;
        let ring = self
            .rings
            .get_mut(task.index())
            .ok_or(TaskError::InvalidArg);
        match ring.and_then(|r| r.assign(buf0, buf1, len, flags)) {
            Ok(bd) => {
                self.trace.record(Event::BdAssign { task: t, bd });
                Ok(bd)
            }
            Err(err) => {
                self.trace.record(Event::BdError { task: t, err });
                Err(err)
            }
        }
    }

    /// Reclaims the oldest completed descriptor on `task`'s ring.
    pub fn bd_release(&mut self, task: TaskId) -> Result<BdIndex, TaskError> {
        let t = task.index() as u8;
        let ring = self
            .rings
            .get_mut(task.index())
            .ok_or(TaskError::InvalidArg);
        match ring.and_then(|r| r.release()) {
            Ok(bd) => {
                self.trace.record(Event::BdRelease { task: t, bd });
                Ok(bd)
            }
            Err(err) => {
                self.trace.record(Event::BdError { task: t, err });
                Err(err)
            }
        }
    }

    /// Returns `task`'s ring to empty. The task must be stopped; the
    /// hardware may otherwise still be walking the descriptors.
    pub fn bd_reset(&mut self, task: TaskId) -> Result<(), TaskError> {
        if self.task_running(task) {
            return Err(TaskError::TaskRunning);
        }
        self.rings
            .get_mut(task.index())
            .ok_or(TaskError::InvalidArg)?
            .reset();
        Ok(())
    }

    /// Descriptors currently in flight on `task`'s ring.
    pub fn bd_in_use(&self, task: TaskId) -> Result<u16, TaskError> {
        Ok(self
            .rings
            .get(task.index())
            .ok_or(TaskError::InvalidArg)?
            .in_use())
    }

    /// Peek handle for one of `task`'s descriptors.
    pub fn get_bd(&self, task: TaskId, bd: BdIndex) -> Option<Bd> {
        self.rings.get(task.index())?.get(bd)
    }

    /// Installs a completion handler for `source` and unmasks it.
    pub fn irq_install(&mut self, source: usize, handler: &'static dyn BestCommHandler) {
        debug_assert!(source < NUM_IRQ_SOURCES);
        let regs = self.regs;
        let handlers = &mut self.handlers;
        self.platform
            .with_irqs_masked(|| handlers.install(regs, source, handler));
        self.trace.record(Event::IrqInstalled {
            source: source as u8,
        });
    }

    /// Removes `source`'s handler and masks it.
    pub fn irq_remove(&mut self, source: usize) {
        debug_assert!(source < NUM_IRQ_SOURCES);
        let regs = self.regs;
        let handlers = &mut self.handlers;
        self.platform
            .with_irqs_masked(|| handlers.remove(regs, source));
    }

    /// Unmasks `source` without touching its handler slot. Mask updates are
    /// read-modify-write and must not interleave with dispatch, so they run
    /// under the platform critical section.
    pub fn irq_enable(&self, source: usize) {
        debug_assert!(source < NUM_IRQ_SOURCES);
        let regs = self.regs;
        let handlers = &self.handlers;
        self.platform
            .with_irqs_masked(|| handlers.enable(regs, source));
    }

    /// Masks `source`, leaving its handler installed.
    pub fn irq_disable(&self, source: usize) {
        debug_assert!(source < NUM_IRQ_SOURCES);
        let regs = self.regs;
        let handlers = &self.handlers;
        self.platform
            .with_irqs_masked(|| handlers.disable(regs, source));
    }

    /// Call from the controller's interrupt entry: fans pending sources out
    /// to their handlers. Returns the number dispatched.
    pub fn dispatch(&mut self) -> usize {
        self.trace.record(Event::Irq {
            pending: control::int_pending(self.regs),
        });
        self.handlers.dispatch(self.regs)
    }

    /// Acknowledges `source`'s pending bit.
    pub fn int_clear(&self, source: usize) {
        debug_assert!(source < NUM_IRQ_SOURCES);
        control::int_clear(self.regs, source);
    }

    /// Whether `source` is pending, mask notwithstanding.
    pub fn int_status(&self, source: usize) -> bool {
        debug_assert!(source < NUM_IRQ_SOURCES);
        control::int_status(self.regs, source)
    }

    /// The unmasked pending word.
    pub fn int_pending(&self) -> u32 {
        control::int_pending(self.regs)
    }

    /// Highest-priority unmasked pending source, if any.
    pub fn int_source(&self) -> Option<IrqSource> {
        control::int_source(self.regs)
    }

    /// Most recent trace event.
    pub fn trace_last(&self) -> Option<Event> {
        self.trace.last()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! A synthetic image and register block standing in for the hardware.
    //!
    //! The image is geometrically honest (16 descriptor entries, per-task
    //! microcode and variable areas at image-relative offsets) but its code
    //! words are zero; tests seed the requestor words they care about
    //! through the reflection layer.

    use super::*;
    use crate::image::{TaskRef, TdtEntry, TDT_ENTRY_BYTES};
    use zerocopy::IntoBytes;

    pub const SRAM_LEN: usize = 64 * 1024;
    pub const DEVICE_BASE: u32 = 0xF000_0000;
    pub const REGS_DEVICE_BASE: u32 = 0xF000_8000;

    /// Image-relative offsets of the synthetic image's areas.
    pub const CODE_OFFSET: usize = 0x400;
    pub const VAR_OFFSET: usize = 0x1000;
    pub const SAVE_OFFSET: usize = 0x1900;
    /// Per-task spans within those areas.
    pub const CODE_STRIDE: usize = 0x100;
    pub const VAR_STRIDE: usize = 0x80;

    pub const IMAGE_LEN: usize = 0x2000;

    pub struct Fixture {
        pub regs: &'static SdmaRegs,
        pub sram: *mut u8,
        pub device_base: u32,
        pub map: AddressMap,
        pub image: TaskImage<'static>,
    }

    pub struct NopPlatform;

    impl Platform for NopPlatform {
        fn with_irqs_masked<R>(&self, f: impl FnOnce() -> R) -> R {
            f()
        }
    }

    fn build_image() -> &'static [u8] {
        let mut bytes = vec![0u8; IMAGE_LEN];
        for t in 0..NUM_TASKS {
            let start = (CODE_OFFSET + t * CODE_STRIDE) as u32;
            let entry = TdtEntry {
                start,
                stop: start + CODE_STRIDE as u32,
                var_table: (VAR_OFFSET + t * VAR_STRIDE) as u32,
                fdt: 0x300,
                exec_status: 0,
                mvtp: 0,
                context_save: (SAVE_OFFSET + t * 0x10) as u32,
                literal_base: 0,
            };
            bytes[t * TDT_ENTRY_BYTES..(t + 1) * TDT_ENTRY_BYTES]
                .copy_from_slice(entry.as_bytes());
        }
        Box::leak(bytes.into_boxed_slice())
    }

    impl Fixture {
        /// An arena with the image loaded and relocated, for tests that
        /// poke the reflection layer directly.
        pub fn new() -> Self {
            let fix = Self::unloaded();
            unsafe { image::load(&fix.image, fix.sram, fix.device_base) };
            fix
        }

        /// An arena with the image *not* yet in SRAM, for tests that go
        /// through the controller's load path.
        pub fn unloaded() -> Self {
            // Word-typed arena so descriptor and table words are aligned.
            let arena = Box::leak(vec![0u32; SRAM_LEN / 4].into_boxed_slice());
            let sram = arena.as_mut_ptr().cast::<u8>();
            let regs: &'static SdmaRegs =
                Box::leak(unsafe { Box::<SdmaRegs>::new_zeroed().assume_init() });
            Self {
                regs,
                sram,
                device_base: DEVICE_BASE,
                map: AddressMap {
                    cpu_base: sram,
                    device_base: DEVICE_BASE,
                    len: SRAM_LEN,
                },
                image: TaskImage {
                    bytes: build_image(),
                    task_count: NUM_TASKS,
                    offset_entry: 0,
                },
            }
        }

        pub fn resolve(&self, task: usize) -> TaskRef {
            TaskRef::resolve(tasks::profile(task), self.sram, 0, &self.map)
        }

        /// A controller over this fixture's arena, with the image loaded.
        pub fn controller(&self) -> BestComm<NopPlatform> {
            let mut bc = unsafe {
                BestComm::new(self.regs, REGS_DEVICE_BASE, self.map, NopPlatform)
            };
            bc.load_image(&self.image).unwrap();
            bc
        }
    }
}
