// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Client API types for the MPC5200 BestComm (SmartComm DMA) engine.
//!
//! This crate defines everything a device driver needs to talk to the
//! BestComm driver: the task namespace, the setup parameter block, error
//! codes, initiator assignments, and the per-descriptor flag bits. The
//! engine itself lives in `drv-mpc5200-bestcomm`.

#![no_std]

use bitflags::bitflags;

/// Number of hardware tasks in one BestComm task group.
pub const NUM_TASKS: usize = 16;

/// Number of demultiplexed interrupt sources: the 16 task-completion bits
/// plus pseudo sources (transfer error, debug) in the upper half of the
/// pending word.
pub const NUM_IRQ_SOURCES: usize = 32;

/// The sixteen microcode programs baked into the standard task image, in
/// task-number order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum TaskName {
    PciTx = 0,
    PciRx = 1,
    FecTx = 2,
    FecRx = 3,
    Lpc = 4,
    Ata = 5,
    Crc16Dp0 = 6,
    Crc16Dp1 = 7,
    GenDp0 = 8,
    GenDp1 = 9,
    GenDp2 = 10,
    GenDp3 = 11,
    GenTxBd = 12,
    GenRxBd = 13,
    GenDpBd0 = 14,
    GenDpBd1 = 15,
}

/// Opaque handle for a configured task, returned by setup and accepted by
/// every control and ring operation. The wrapped value is the task's number
/// within its group of sixteen.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TaskId(u8);

impl TaskId {
    pub fn new(task: u8) -> Self {
        Self(task % NUM_TASKS as u8)
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl From<TaskName> for TaskId {
    fn from(name: TaskName) -> Self {
        Self(name as u8)
    }
}

/// Errors reported by the engine.
///
/// The discriminants are the negative sentinel codes of the original
/// Freescale API, kept so the values showing up in a trace or a debugger
/// match the hardware documentation. `-1` (no error / no interrupt) is not
/// represented; success is the `Ok` arm.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum TaskError {
    /// A structurally invalid request: unknown task, descriptor operation on
    /// a task without a ring, or a ring length of zero or beyond the image's
    /// compiled capacity.
    InvalidArg = -2,
    /// Every live descriptor is in flight; retry after releasing.
    BdRingFull = -3,
    /// The engine was asked to load a second microcode image.
    ApiAlreadyInitialized = -4,
    /// Requested transfer length exceeds the descriptor length field.
    SizeTooLarge = -5,
    /// No descriptors are in flight.
    BdRingEmpty = -6,
    /// The oldest in-flight descriptor is still owned by the hardware.
    BdBusy = -7,
    /// The task is currently enabled.
    TaskRunning = -8,
}

impl From<TaskError> for i32 {
    fn from(e: TaskError) -> Self {
        e as i32
    }
}

/// Hardware units that can pace a task's data movement.
///
/// `Always` doubles as the sentinel meaning "no pacing": a microcode word
/// carrying it is left alone by the initiator patch pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Initiator {
    Always = 0,
    ScTmr0 = 1,
    ScTmr1 = 2,
    FecRx = 3,
    FecTx = 4,
    AtaRx = 5,
    AtaTx = 6,
    ScPciRx = 7,
    ScPciTx = 8,
    Psc3Rx = 9,
    Psc3Tx = 10,
    Psc2Rx = 11,
    Psc2Tx = 12,
    Psc1Rx = 13,
    Psc1Tx = 14,
    ScTmr2 = 15,
    ScLpc = 16,
    Psc5Rx = 17,
    Psc5Tx = 18,
    Psc4Rx = 19,
    Psc4Tx = 20,
    I2c2Rx = 21,
    I2c2Tx = 22,
    I2c1Rx = 23,
    I2c1Tx = 24,
    Psc6Rx = 25,
    Psc6Tx = 26,
    IrdaRx = 27,
    IrdaTx = 28,
    ScTmr3 = 29,
    ScTmr4 = 30,
    ScTmr5 = 31,
}

impl Initiator {
    pub fn number(self) -> u8 {
        self as u8
    }
}

/// Transfer element width. Tasks whose microcode hard-codes a width coerce
/// the caller's request to it; flexible tasks take it verbatim.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ElementSize {
    Byte = 1,
    Halfword = 2,
    Word = 4,
}

impl ElementSize {
    /// Width in bytes.
    pub fn bytes(self) -> u8 {
        self as u8
    }

    /// The hardware's two-bit encoding, as written to the task-size nibble
    /// registers.
    pub fn code(self) -> u8 {
        match self {
            ElementSize::Byte => 0b00,
            ElementSize::Halfword => 0b01,
            ElementSize::Word => 0b10,
        }
    }
}

/// Amount of data a task moves, discriminated by whether the task walks a
/// descriptor ring or runs a fixed byte count.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransferSize {
    /// Ring-based task: largest buffer one descriptor may carry.
    MaxBuf(u32),
    /// Byte-counted task: total bytes per run.
    ByteCount(u32),
}

/// Caller-supplied task configuration.
///
/// Fields double as *outputs*: setup overwrites them with the values the
/// hardware actually accepted (a hard-wired FIFO side forces its stride to
/// zero, a fixed-width task forces its element sizes, a fixed-initiator task
/// reports its initiator). Callers that need the effective configuration
/// read the struct back after setup returns.
#[derive(Clone, Debug)]
pub struct TaskSetupParams {
    /// Live ring length for descriptor tasks; ignored for byte-counted ones.
    pub num_bd: u16,
    pub size: TransferSize,
    pub initiator: Initiator,
    /// Source start address (device address space). For a descriptor task
    /// this is rewritten to the device address of the ring's first
    /// descriptor.
    pub start_addr_src: u32,
    /// Source stride in bytes; sign selects direction.
    pub incr_src: i16,
    pub sz_src: ElementSize,
    /// Destination start address (device address space); same ring
    /// convention as the source side.
    pub start_addr_dst: u32,
    pub incr_dst: i16,
    pub sz_dst: ElementSize,
}

bitflags! {
    /// Caller-controlled bits in a buffer descriptor's status word, above
    /// the length field. The ready bit is owned by the engine and the
    /// hardware and is not expressible here.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct BdFlags: u32 {
        /// Raise the task's completion interrupt for this descriptor.
        const INTERRUPT = 1 << 26;
        /// This descriptor ends a frame (FEC transmit).
        const LAST = 1 << 27;
    }
}

/// Index of a descriptor within its task's ring.
pub type BdIndex = u16;

/// What a shared-interrupt query found pending, in priority order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IrqSource {
    /// A bus error (TEA) raised while the given task was bus master.
    TransferError(TaskId),
    /// The debug pseudo interrupt.
    Debug,
    /// Completion interrupt of the given task.
    Task(TaskId),
}
