// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task image loading and per-task reflection.
//!
//! The microcode image is an opaque blob produced by Freescale's task
//! builder. The only structure we interpret is the task descriptor table
//! (TDT) at a fixed offset inside it: one 32-byte entry per task whose
//! pointer fields are image-relative until we relocate them to the device
//! address the image ends up at in SRAM.
//!
//! After relocation the TDT is the root of a small reflection tree: each
//! entry points at the task's variable table (24 words, followed by the
//! increment table) and its function descriptor word, whose low byte doubles
//! as the task's pragma control byte. The addresses of the task's data
//! request descriptor (DRD) words are not discoverable from the TDT; the
//! per-task byte offsets from the microcode start are part of the task
//! profile, extracted from the image build.

use heapless::Vec;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::tasks::TaskProfile;
use crate::AddressMap;

/// Upper bound on DRD words per task across the standard image (FEC
/// transmit has 22).
pub const MAX_DRD: usize = 24;

/// Bytes per task descriptor table entry.
pub const TDT_ENTRY_BYTES: usize = core::mem::size_of::<TdtEntry>();

/// Words of the variable table before the increment table begins.
const VAR_TABLE_WORDS: usize = 24;

/// Byte offset of the pragma byte within a TDT entry: byte 3 of the
/// function descriptor pointer word.
const PRAGMA_OFFSET: usize = 0x0F;

/// An opaque compiled task image.
pub struct TaskImage<'a> {
    /// The raw blob, including the TDT.
    pub bytes: &'a [u8],
    /// Tasks described by the TDT.
    pub task_count: usize,
    /// Byte offset of the TDT within the blob.
    pub offset_entry: usize,
}

/// One task descriptor table entry. Values are native-endian: the image is
/// built for the target.
#[derive(Copy, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct TdtEntry {
    /// First microcode word (absolute after relocation).
    pub start: u32,
    /// One past the last microcode word.
    pub stop: u32,
    /// The task's variable table.
    pub var_table: u32,
    /// Function descriptor table pointer; low byte is the pragma.
    pub fdt: u32,
    pub exec_status: u32,
    pub mvtp: u32,
    /// Context save area.
    pub context_save: u32,
    pub literal_base: u32,
}

impl TdtEntry {
    /// Relocates the absolute-address fields by `base`, the device address
    /// the image was placed at.
    fn relocate(mut self, base: u32) -> Self {
        self.start = self.start.wrapping_add(base);
        self.stop = self.stop.wrapping_add(base);
        self.var_table = self.var_table.wrapping_add(base);
        self.fdt = self.fdt.wrapping_add(base);
        self.context_save = self.context_save.wrapping_add(base);
        self
    }
}

/// Copies `image` into the SRAM window at `dst` and relocates every TDT
/// entry to `device_base`, the device address of `dst`.
///
/// # Safety
///
/// `dst` must be valid for `image.bytes.len()` bytes of writes and nothing
/// else may reference that memory.
pub unsafe fn load(image: &TaskImage<'_>, dst: *mut u8, device_base: u32) {
    for (i, &b) in image.bytes.iter().enumerate() {
        dst.add(i).write_volatile(b);
    }
    relocate_in_place(dst, image, device_base);
}

/// Relocates the TDT of an image already present at `sram` (placed there by
/// a boot loader) to `device_base`.
///
/// # Safety
///
/// `sram` must hold a valid, un-relocated image matching `image`'s geometry.
pub unsafe fn attach(image: &TaskImage<'_>, sram: *mut u8, device_base: u32) {
    relocate_in_place(sram, image, device_base);
}

unsafe fn relocate_in_place(sram: *mut u8, image: &TaskImage<'_>, device_base: u32) {
    for task in 0..image.task_count {
        let entry_ptr = sram
            .add(image.offset_entry + task * TDT_ENTRY_BYTES)
            .cast::<u32>();
        let mut words = [0u32; TDT_ENTRY_BYTES / 4];
        for (i, w) in words.iter_mut().enumerate() {
            *w = entry_ptr.add(i).read_volatile();
        }
        let entry = TdtEntry::read_from_bytes(words.as_bytes())
            .unwrap_or_else(|_| unreachable!())
            .relocate(device_base);
        let mut out = [0u32; TDT_ENTRY_BYTES / 4];
        out.as_mut_bytes().copy_from_slice(entry.as_bytes());
        for (i, w) in out.iter().enumerate() {
            entry_ptr.add(i).write_volatile(*w);
        }
    }
}

/// Resolved reflection for one task: CPU pointers into its relocated tables.
/// Rebuilt on every setup call; building it is idempotent.
pub struct TaskRef {
    var: *mut u32,
    inc: *mut u32,
    pragma: *mut u8,
    pub drd: Vec<*mut u32, MAX_DRD>,
    /// Start of the task's microcode, device address.
    pub code_base: u32,
}

unsafe impl Send for TaskRef {}

impl TaskRef {
    /// Reads task `profile`'s relocated TDT entry out of the SRAM window and
    /// resolves every address the setup engine pokes.
    pub fn resolve(
        profile: &TaskProfile,
        sram: *mut u8,
        offset_entry: usize,
        map: &AddressMap,
    ) -> Self {
        let entry_base = unsafe {
            sram.add(offset_entry + usize::from(profile.task) * TDT_ENTRY_BYTES)
        };
        let read_word = |byte: usize| unsafe {
            entry_base.add(byte).cast::<u32>().read_volatile()
        };

        let start = read_word(0x00);
        let var_table = read_word(0x08);

        let var = map.cpu_addr(var_table).cast::<u32>();
        let inc = var.wrapping_add(VAR_TABLE_WORDS);
        let pragma = unsafe { entry_base.add(PRAGMA_OFFSET) };

        let mut drd = Vec::new();
        for &off in profile.drd_offsets {
            // The profile's DRD list is bounded by MAX_DRD by construction.
            let _ = drd.push(map.cpu_addr(start + u32::from(off)).cast::<u32>());
        }

        Self {
            var,
            inc,
            pragma,
            drd,
            code_base: start,
        }
    }

    pub fn write_var(&self, slot: u8, value: u32) {
        unsafe { self.var.add(usize::from(slot)).write_volatile(value) }
    }

    pub fn read_var(&self, slot: u8) -> u32 {
        unsafe { self.var.add(usize::from(slot)).read_volatile() }
    }

    /// Writes an increment-table halfword, preserving the control bits in
    /// the upper half of the word.
    pub fn write_inc(&self, slot: u8, value: i16) {
        unsafe {
            let p = self.inc.add(usize::from(slot));
            let cur = p.read_volatile();
            p.write_volatile((cur & 0xFFFF_0000) | u32::from(value as u16));
        }
    }

    pub fn read_inc(&self, slot: u8) -> i16 {
        unsafe { (self.inc.add(usize::from(slot)).read_volatile() & 0xFFFF) as u16 as i16 }
    }

    pub fn write_pragma(&self, value: u8) {
        unsafe { self.pragma.write_volatile(value) }
    }

    pub fn read_pragma(&self) -> u8 {
        unsafe { self.pragma.read_volatile() }
    }

    /// Iterates the task's DRD words as `(pointer, is_continuation)`.
    ///
    /// A word whose predecessor carried the extension flag is the tail of a
    /// chained pair: it holds no initiator field of its own and must be
    /// skipped by the initiator patch pass.
    pub fn drd_words(&self) -> DrdWords<'_> {
        DrdWords {
            words: &self.drd,
            next: 0,
            prev_extended: false,
        }
    }
}

/// Iterator over DRD words; see [`TaskRef::drd_words`].
pub struct DrdWords<'a> {
    words: &'a [*mut u32],
    next: usize,
    prev_extended: bool,
}

impl Iterator for DrdWords<'_> {
    type Item = (*mut u32, bool);

    fn next(&mut self) -> Option<Self::Item> {
        let ptr = *self.words.get(self.next)?;
        self.next += 1;
        let is_continuation = self.prev_extended;
        let word = unsafe { ptr.read_volatile() };
        self.prev_extended = word & crate::regs::DRD_EXTENDED != 0;
        Some((ptr, is_continuation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::DRD_EXTENDED;
    use crate::testutil;

    #[test]
    fn load_relocates_every_entry() {
        let fix = testutil::Fixture::new();
        // Entry 0 of the synthetic image places microcode at
        // CODE_OFFSET; after load it must read back shifted by the
        // device base.
        let entry_ptr = fix.sram.cast::<u32>();
        let start = unsafe { entry_ptr.read_volatile() };
        assert_eq!(start, fix.device_base + testutil::CODE_OFFSET as u32);
        let var = unsafe { entry_ptr.add(2).read_volatile() };
        assert_eq!(var, fix.device_base + testutil::VAR_OFFSET as u32);
    }

    #[test]
    fn reflection_resolves_var_inc_and_pragma() {
        let fix = testutil::Fixture::new();
        let r = fix.resolve(0);
        r.write_var(3, 0x1234_5678);
        assert_eq!(r.read_var(3), 0x1234_5678);

        // Increment writes only touch the low halfword.
        unsafe {
            r.inc.add(1).write_volatile(0xAAAA_0000);
        }
        r.write_inc(1, -4);
        assert_eq!(r.read_inc(1), -4);
        assert_eq!(unsafe { r.inc.add(1).read_volatile() } & 0xFFFF_0000, 0xAAAA_0000);

        r.write_pragma(0x5A);
        assert_eq!(r.read_pragma(), 0x5A);
    }

    #[test]
    fn drd_iterator_flags_continuations() {
        let fix = testutil::Fixture::new();
        // Task 8 carries exactly four requestor words.
        let r = fix.resolve(8);
        // Word layout from the fixture: plain, extended, continuation,
        // plain.
        unsafe {
            r.drd[0].write_volatile(0);
            r.drd[1].write_volatile(DRD_EXTENDED);
            r.drd[2].write_volatile(0);
            r.drd[3].write_volatile(0);
        }
        let conts: Vec<bool, 8> = r.drd_words().map(|(_, c)| c).collect();
        assert_eq!(&conts[..], &[false, false, true, false]);
    }
}
