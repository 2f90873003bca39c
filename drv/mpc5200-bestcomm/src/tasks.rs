// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-task profiles for the standard sixteen-task image.
//!
//! Each microcode program has its own variable-table layout, data request
//! descriptor placement, and degrees of freedom (whether the caller may
//! choose the element width, the pacing initiator, the strides). The
//! original vendor code expressed this as one hand-written setup routine per
//! task; here it is a table the single setup engine in [`crate::setup`]
//! interprets.
//!
//! Slot numbers and descriptor offsets were extracted from the relocation
//! records of the compiled image and are only valid for that image.

use drv_mpc5200_bestcomm_api::{ElementSize, Initiator};

use crate::regs::Pragma;

/// How a task's source or destination side is programmed.
pub struct Side {
    /// Variable slot receiving the side's start address. Descriptor-ring
    /// sides have no address variable; their addresses arrive via the ring.
    pub addr_slot: Option<u8>,
    pub incr: IncrPolicy,
    /// Increment slot of the side's memory-assist pointer, where the
    /// microcode keeps one alongside the data pointer.
    pub ma_slot: Option<u8>,
}

/// Stride handling for one side.
pub enum IncrPolicy {
    /// Hard-wired FIFO port. The stride is forced to zero and the caller's
    /// address is taken as the FIFO's register address.
    Fifo,
    /// Stride magnitude is the element width; the caller controls only the
    /// direction through the sign of the requested stride.
    Auto { slot: u8 },
    /// The caller's stride is programmed verbatim.
    Runtime { slot: u8 },
}

/// Whether the caller may choose the pacing initiator.
pub enum InitiatorPolicy {
    /// The microcode is built against one initiator; requests are coerced.
    Fixed(Initiator),
    /// The initiator field of every requestor word is rewritten at setup.
    Runtime,
}

/// Whether the caller may choose the element width.
pub enum SizePolicy {
    Fixed(ElementSize),
    Flex,
}

/// How the task's amount of work is expressed.
pub enum Completion {
    /// The task walks a descriptor ring.
    Ring {
        /// Ring capacity the image was compiled for.
        max_bd: u16,
        base_slot: u8,
        last_slot: u8,
        start_slot: u8,
        /// Slot receiving the device address of the task's own enable
        /// register, used by the microcode to stop itself at ring end.
        enable_slot: u8,
        /// Data words per descriptor (two-pointer tasks carry both a source
        /// and a destination address per descriptor).
        num_ptr: u8,
        /// Variable slot and descriptor index of the frame-flag requestor
        /// word, for tasks that latch per-frame flags (FEC transmit).
        flag_drd: Option<(u8, u8)>,
    },
    /// The task runs a fixed byte count per start.
    ByteCount {
        /// Slot receiving `bytes / element_size - 1`.
        iter_slot: u8,
    },
}

/// Everything the setup engine needs to know about one task.
pub struct TaskProfile {
    pub task: u8,
    /// Byte offsets of the task's data request descriptor words from the
    /// start of its microcode.
    pub drd_offsets: &'static [u16],
    pub pragma: u8,
    /// Auto-start request: `-1` chains the task to itself, `0..16` to that
    /// task number, anything else leaves chaining disabled.
    pub auto_start: i8,
    pub initiator: InitiatorPolicy,
    pub size: SizePolicy,
    pub src: Side,
    pub dst: Side,
    /// Whether the microcode tolerates starts and stops off element
    /// alignment; setup adjusts the pragma byte accordingly.
    pub misaligned: bool,
    /// Variable slot receiving the per-descriptor (or total) byte count.
    pub bytes_slot: u8,
    pub completion: Completion,
    /// Increment-table byte stride programmed when the caller supplies no
    /// negative stride of their own.
    pub default_incr_bytes: i16,
}

impl Completion {
    pub fn num_ptr(&self) -> u8 {
        match *self {
            Completion::Ring { num_ptr, .. } => num_ptr,
            Completion::ByteCount { .. } => 1,
        }
    }
}

/// Looks up the profile for a task number. Task numbers are four bits, so
/// this cannot fail for a `TaskId`.
pub fn profile(task: usize) -> &'static TaskProfile {
    &PROFILES[task % PROFILES.len()]
}

const PRAGMA_DEFAULT: u8 = Pragma::SPECULATIVE_READ
    .union(Pragma::COMBINE_WRITES)
    .union(Pragma::READ_LINE_BUFFER)
    .union(Pragma::INTEGER_MODE)
    .bits();

const DRD_PCI_TX: &[u16] = &[0x08, 0x10, 0x18, 0x20, 0x24, 0x2C, 0x38];
const DRD_PCI_RX: &[u16] = &[0x08, 0x10, 0x18, 0x20, 0x2C];
const DRD_FEC_TX: &[u16] = &[
    0x04, 0x08, 0x10, 0x1C, 0x20, 0x24, 0x2C, 0x30, 0x34, 0x38, 0x44, 0x48,
    0x4C, 0x54, 0x60, 0x64, 0x68, 0x6C, 0x74, 0x7C, 0x84, 0x88,
];
const DRD_FEC_RX: &[u16] = &[
    0x04, 0x0C, 0x10, 0x14, 0x20, 0x24, 0x2C, 0x38, 0x3C, 0x40, 0x48, 0x50,
    0x58,
];
const DRD_DP: &[u16] = &[0x0C, 0x18, 0x24, 0x2C];
const DRD_ATA: &[u16] = &[0x04, 0x0C, 0x10, 0x14, 0x24, 0x2C, 0x30];
const DRD_CRC16_DP: &[u16] =
    &[0x04, 0x08, 0x14, 0x18, 0x24, 0x28, 0x34, 0x38, 0x40];
const DRD_GEN_TX_BD: &[u16] =
    &[0x04, 0x0C, 0x10, 0x14, 0x20, 0x28, 0x30, 0x34];
const DRD_GEN_RX_BD: &[u16] = &[0x04, 0x0C, 0x10, 0x14, 0x20, 0x28, 0x2C];
const DRD_GEN_DP_BD: &[u16] = &[0x04, 0x0C, 0x10, 0x14, 0x24, 0x2C, 0x30];

/// The double-pipe (memory to memory) tasks share one variable layout.
const fn dp_profile(task: u8, drd_offsets: &'static [u16]) -> TaskProfile {
    TaskProfile {
        task,
        drd_offsets,
        pragma: PRAGMA_DEFAULT,
        auto_start: -2,
        initiator: InitiatorPolicy::Runtime,
        size: SizePolicy::Flex,
        src: Side {
            addr_slot: Some(5),
            incr: IncrPolicy::Runtime { slot: 3 },
            ma_slot: Some(4),
        },
        dst: Side {
            addr_slot: Some(4),
            incr: IncrPolicy::Runtime { slot: 1 },
            ma_slot: Some(2),
        },
        misaligned: true,
        bytes_slot: 0,
        completion: Completion::ByteCount { iter_slot: 1 },
        default_incr_bytes: 4,
    }
}

static PROFILES: [TaskProfile; 16] = [
    // 0: PCI transmit, memory to the PCI FIFO, byte-counted.
    TaskProfile {
        task: 0,
        drd_offsets: DRD_PCI_TX,
        pragma: PRAGMA_DEFAULT,
        auto_start: -2,
        initiator: InitiatorPolicy::Fixed(Initiator::ScPciTx),
        size: SizePolicy::Fixed(ElementSize::Word),
        src: Side {
            addr_slot: Some(7),
            incr: IncrPolicy::Auto { slot: 1 },
            ma_slot: None,
        },
        dst: Side {
            addr_slot: Some(0),
            incr: IncrPolicy::Fifo,
            ma_slot: None,
        },
        misaligned: false,
        bytes_slot: 3,
        completion: Completion::ByteCount { iter_slot: 4 },
        default_incr_bytes: 4,
    },
    // 1: PCI receive, the PCI FIFO to memory.
    TaskProfile {
        task: 1,
        drd_offsets: DRD_PCI_RX,
        pragma: PRAGMA_DEFAULT,
        auto_start: -2,
        initiator: InitiatorPolicy::Fixed(Initiator::ScPciRx),
        size: SizePolicy::Fixed(ElementSize::Word),
        src: Side {
            addr_slot: Some(1),
            incr: IncrPolicy::Fifo,
            ma_slot: None,
        },
        dst: Side {
            addr_slot: Some(6),
            incr: IncrPolicy::Auto { slot: 1 },
            ma_slot: None,
        },
        misaligned: false,
        bytes_slot: 2,
        completion: Completion::ByteCount { iter_slot: 3 },
        default_incr_bytes: 4,
    },
    // 2: FEC transmit, descriptor ring to the Ethernet FIFO.
    TaskProfile {
        task: 2,
        drd_offsets: DRD_FEC_TX,
        pragma: PRAGMA_DEFAULT,
        auto_start: -2,
        initiator: InitiatorPolicy::Fixed(Initiator::FecTx),
        size: SizePolicy::Fixed(ElementSize::Word),
        src: Side {
            addr_slot: None,
            incr: IncrPolicy::Auto { slot: 1 },
            ma_slot: Some(2),
        },
        dst: Side {
            addr_slot: Some(1),
            incr: IncrPolicy::Fifo,
            ma_slot: None,
        },
        misaligned: false,
        bytes_slot: 6,
        completion: Completion::Ring {
            max_bd: 64,
            base_slot: 3,
            last_slot: 4,
            start_slot: 5,
            enable_slot: 2,
            num_ptr: 1,
            flag_drd: Some((0, 19)),
        },
        default_incr_bytes: 4,
    },
    // 3: FEC receive, the Ethernet FIFO to a descriptor ring.
    TaskProfile {
        task: 3,
        drd_offsets: DRD_FEC_RX,
        pragma: PRAGMA_DEFAULT,
        auto_start: -2,
        initiator: InitiatorPolicy::Fixed(Initiator::FecRx),
        size: SizePolicy::Fixed(ElementSize::Word),
        src: Side {
            addr_slot: Some(1),
            incr: IncrPolicy::Fifo,
            ma_slot: None,
        },
        dst: Side {
            addr_slot: None,
            incr: IncrPolicy::Auto { slot: 1 },
            ma_slot: Some(2),
        },
        misaligned: false,
        bytes_slot: 5,
        completion: Completion::Ring {
            max_bd: 64,
            base_slot: 2,
            last_slot: 3,
            start_slot: 4,
            enable_slot: 0,
            num_ptr: 1,
            flag_drd: None,
        },
        default_incr_bytes: 4,
    },
    // 4: LocalPlus bus, byte-counted, both strides caller-controlled.
    TaskProfile {
        task: 4,
        drd_offsets: DRD_DP,
        pragma: PRAGMA_DEFAULT,
        auto_start: -2,
        initiator: InitiatorPolicy::Runtime,
        size: SizePolicy::Flex,
        src: Side {
            addr_slot: Some(5),
            incr: IncrPolicy::Runtime { slot: 3 },
            ma_slot: Some(4),
        },
        dst: Side {
            addr_slot: Some(4),
            incr: IncrPolicy::Runtime { slot: 1 },
            ma_slot: Some(2),
        },
        misaligned: true,
        bytes_slot: 0,
        completion: Completion::ByteCount { iter_slot: 1 },
        default_incr_bytes: 4,
    },
    // 5: ATA, two-pointer descriptor ring, halfword register file.
    TaskProfile {
        task: 5,
        drd_offsets: DRD_ATA,
        pragma: Pragma::SPECULATIVE_READ
            .union(Pragma::COMBINE_WRITES)
            .union(Pragma::READ_LINE_BUFFER)
            .union(Pragma::INTEGER_MODE)
            .union(Pragma::PRECISE_INCREMENT)
            .bits(),
        auto_start: -2,
        initiator: InitiatorPolicy::Runtime,
        size: SizePolicy::Flex,
        src: Side {
            addr_slot: None,
            incr: IncrPolicy::Runtime { slot: 2 },
            ma_slot: None,
        },
        dst: Side {
            addr_slot: None,
            incr: IncrPolicy::Runtime { slot: 1 },
            ma_slot: None,
        },
        misaligned: false,
        bytes_slot: 4,
        completion: Completion::Ring {
            max_bd: 32,
            base_slot: 1,
            last_slot: 2,
            start_slot: 3,
            enable_slot: 0,
            num_ptr: 2,
            flag_drd: None,
        },
        default_incr_bytes: 2,
    },
    // 6, 7: CRC-accumulating double pipes.
    dp_profile(6, DRD_CRC16_DP),
    dp_profile(7, DRD_CRC16_DP),
    // 8..11: general-purpose double pipes.
    dp_profile(8, DRD_DP),
    dp_profile(9, DRD_DP),
    dp_profile(10, DRD_DP),
    dp_profile(11, DRD_DP),
    // 12: generic transmit over a descriptor ring into a FIFO.
    TaskProfile {
        task: 12,
        drd_offsets: DRD_GEN_TX_BD,
        pragma: PRAGMA_DEFAULT,
        auto_start: -2,
        initiator: InitiatorPolicy::Runtime,
        size: SizePolicy::Flex,
        src: Side {
            addr_slot: None,
            incr: IncrPolicy::Runtime { slot: 1 },
            ma_slot: Some(2),
        },
        dst: Side {
            addr_slot: Some(0),
            incr: IncrPolicy::Fifo,
            ma_slot: None,
        },
        misaligned: false,
        bytes_slot: 5,
        completion: Completion::Ring {
            max_bd: 64,
            base_slot: 2,
            last_slot: 3,
            start_slot: 4,
            enable_slot: 1,
            num_ptr: 1,
            flag_drd: None,
        },
        default_incr_bytes: 4,
    },
    // 13: generic receive from a FIFO into a descriptor ring.
    TaskProfile {
        task: 13,
        drd_offsets: DRD_GEN_RX_BD,
        pragma: PRAGMA_DEFAULT,
        auto_start: -2,
        initiator: InitiatorPolicy::Runtime,
        size: SizePolicy::Flex,
        src: Side {
            addr_slot: Some(1),
            incr: IncrPolicy::Fifo,
            ma_slot: None,
        },
        dst: Side {
            addr_slot: None,
            incr: IncrPolicy::Runtime { slot: 1 },
            ma_slot: None,
        },
        misaligned: false,
        bytes_slot: 5,
        completion: Completion::Ring {
            max_bd: 64,
            base_slot: 2,
            last_slot: 3,
            start_slot: 4,
            enable_slot: 0,
            num_ptr: 1,
            flag_drd: None,
        },
        default_incr_bytes: 4,
    },
    // 14, 15: memory-to-memory over two-pointer descriptor rings.
    gen_dp_bd_profile(14),
    gen_dp_bd_profile(15),
];

const fn gen_dp_bd_profile(task: u8) -> TaskProfile {
    TaskProfile {
        task,
        drd_offsets: DRD_GEN_DP_BD,
        pragma: PRAGMA_DEFAULT,
        auto_start: -2,
        initiator: InitiatorPolicy::Runtime,
        size: SizePolicy::Flex,
        src: Side {
            addr_slot: None,
            incr: IncrPolicy::Runtime { slot: 2 },
            ma_slot: None,
        },
        dst: Side {
            addr_slot: None,
            incr: IncrPolicy::Runtime { slot: 1 },
            ma_slot: None,
        },
        misaligned: false,
        bytes_slot: 4,
        completion: Completion::Ring {
            max_bd: 32,
            base_slot: 1,
            last_slot: 2,
            start_slot: 3,
            enable_slot: 0,
            num_ptr: 2,
            flag_drd: None,
        },
        default_incr_bytes: 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MAX_DRD;

    #[test]
    fn profiles_are_in_task_order() {
        for (i, p) in PROFILES.iter().enumerate() {
            assert_eq!(usize::from(p.task), i);
        }
    }

    #[test]
    fn drd_lists_fit_reflection_capacity() {
        for p in &PROFILES {
            assert!(p.drd_offsets.len() <= MAX_DRD, "task {}", p.task);
        }
    }

    #[test]
    fn ring_slots_are_distinct() {
        for p in &PROFILES {
            if let Completion::Ring {
                base_slot,
                last_slot,
                start_slot,
                enable_slot,
                ..
            } = p.completion
            {
                let slots = [base_slot, last_slot, start_slot, enable_slot];
                for (i, a) in slots.iter().enumerate() {
                    for b in &slots[i + 1..] {
                        assert_ne!(a, b, "task {}", p.task);
                    }
                }
            }
        }
    }
}
