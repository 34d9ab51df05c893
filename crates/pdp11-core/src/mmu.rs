//! Memory management: virtual-to-physical translation with page protection.

use crate::fault::{CpuResult, Fault};
use crate::memory::{
    is_mmu_register, validate_word_alignment, AccessIntent, VirtualAddress, IO_PAGE_18BIT,
    IO_PAGE_BASE, IO_PAGE_VIRTUAL, MMR0_ADDRESS, PHYSICAL_MASK_18BIT, PHYSICAL_MASK_22BIT,
    UNIBUS_WINDOW_BASE,
};
use crate::state::{Mode, PC};
use crate::trap::DeferredTrap;
use crate::Cpu;

/// Number of page register pairs (4 modes x 2 spaces x 8 pages).
pub const PAGE_COUNT: usize = 64;
/// Number of Unibus map registers.
pub const UNIBUS_MAP_COUNT: usize = 32;

/// MMR0: abort, page not resident.
pub const MMR0_ABORT_NON_RESIDENT: u16 = 0o100000;
/// MMR0: abort, page length error.
pub const MMR0_ABORT_LENGTH: u16 = 0o40000;
/// MMR0: abort, read-only access violation.
pub const MMR0_ABORT_READ_ONLY: u16 = 0o20000;
/// MMR0: memory management trap recorded.
pub const MMR0_TRAPPED: u16 = 0o10000;
/// MMR0: memory management trap enable.
pub const MMR0_TRAP_ENABLE: u16 = 0o1000;
/// MMR0: maintenance mode, destination accesses only are relocated.
pub const MMR0_MAINTENANCE: u16 = 0o400;
/// MMR0: instruction completed before the abort.
pub const MMR0_INSTRUCTION_COMPLETE: u16 = 0o200;
/// MMR0: relocation enable.
pub const MMR0_ENABLE: u16 = 0o1;
/// MMR0 bits any abort sets; while one is set MMR0..MMR2 are frozen.
pub const MMR0_ABORTS: u16 = MMR0_ABORT_NON_RESIDENT | MMR0_ABORT_LENGTH | MMR0_ABORT_READ_ONLY;
/// MMR0 bits stored on a register write.
pub const MMR0_WRITE_MASK: u16 = 0o171601;

/// MMR3: 22-bit mapping.
pub const MMR3_MAPPING_22BIT: u16 = 0o20;
/// MMR3: Unibus map relocation.
pub const MMR3_UNIBUS_MAP: u16 = 0o40;
/// MMR3 bits stored on a register write.
pub const MMR3_WRITE_MASK: u16 = 0o77;

/// PDR: page accessed.
pub const PDR_ACCESSED: u16 = 0o200;
/// PDR: page written.
pub const PDR_WRITTEN: u16 = 0o100;
/// PDR: page expands downward.
pub const PDR_EXPAND_DOWN: u16 = 0o10;
/// PDR bits stored on a register write.
pub const PDR_WRITE_MASK: u16 = 0o77417;

/// Page address/descriptor registers and the MMR status registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mmu {
    par: [u16; PAGE_COUNT],
    pdr: [u16; PAGE_COUNT],
    mmr0: u16,
    mmr1: u16,
    mmr2: u16,
    mmr3: u16,
    mode: Mode,
    last_page: u16,
    unibus_map: [u32; UNIBUS_MAP_COUNT],
}

impl Default for Mmu {
    fn default() -> Self {
        Self {
            par: [0; PAGE_COUNT],
            pdr: [0; PAGE_COUNT],
            mmr0: 0,
            mmr1: 0,
            mmr2: 0,
            mmr3: 0,
            mode: Mode::Kernel,
            last_page: 0,
            unibus_map: [0; UNIBUS_MAP_COUNT],
        }
    }
}

impl Mmu {
    /// Clears the status registers (RESET instruction and console reset).
    ///
    /// Page registers survive, as on the real machine.
    pub fn reset(&mut self) {
        self.mmr0 = 0;
        self.mmr3 = 0;
    }

    /// Mode used for translation; differs from the PSW mode during MFPx/MTPx.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// MMR0 as software reads it.
    #[must_use]
    pub const fn mmr0(&self) -> u16 {
        if self.is_frozen() {
            self.mmr0
        } else {
            (self.mmr0 & MMR0_WRITE_MASK) | (self.last_page << 1)
        }
    }

    /// Writes MMR0.
    pub fn write_mmr0(&mut self, value: u16) {
        self.mmr0 = value & MMR0_WRITE_MASK;
    }

    /// MMR1: register auto-increment/decrement record.
    #[must_use]
    pub const fn mmr1(&self) -> u16 {
        self.mmr1
    }

    /// MMR2: virtual PC of the current instruction.
    #[must_use]
    pub const fn mmr2(&self) -> u16 {
        self.mmr2
    }

    /// MMR3: D-space enables and mapping width.
    #[must_use]
    pub const fn mmr3(&self) -> u16 {
        self.mmr3
    }

    /// Writes MMR3.
    pub fn write_mmr3(&mut self, value: u16) {
        self.mmr3 = value & MMR3_WRITE_MASK;
    }

    /// Page address register `page` (`mode * 16 + space * 8 + page`).
    #[must_use]
    pub const fn par(&self, page: usize) -> u16 {
        self.par[page % PAGE_COUNT]
    }

    /// Page descriptor register `page`.
    #[must_use]
    pub const fn pdr(&self, page: usize) -> u16 {
        self.pdr[page % PAGE_COUNT]
    }

    /// Writes a page address register; the page's A and W bits clear.
    pub fn write_par(&mut self, page: usize, value: u16) {
        let page = page % PAGE_COUNT;
        self.par[page] = value;
        self.pdr[page] &= !(PDR_ACCESSED | PDR_WRITTEN);
    }

    /// Writes a page descriptor register; the page's A and W bits clear.
    pub fn write_pdr(&mut self, page: usize, value: u16) {
        self.pdr[page % PAGE_COUNT] = value & PDR_WRITE_MASK;
    }

    /// Unibus map register `index` (22-bit base address).
    #[must_use]
    pub const fn unibus_map(&self, index: usize) -> u32 {
        self.unibus_map[index % UNIBUS_MAP_COUNT]
    }

    /// Writes the low (`high == false`) or high half of a Unibus map register.
    pub fn write_unibus_map(&mut self, index: usize, high: bool, value: u16) {
        let entry = &mut self.unibus_map[index % UNIBUS_MAP_COUNT];
        *entry = if high {
            (*entry & 0xfffe) | (u32::from(value & 0o177) << 16)
        } else {
            (*entry & 0o17600000) | u32::from(value & 0xfffe)
        };
    }

    /// Returns `true` while an abort has frozen MMR0..MMR2.
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.mmr0 & MMR0_ABORTS != 0
    }

    const fn relocates(&self, intent: AccessIntent) -> bool {
        self.mmr0 & MMR0_ENABLE != 0 || (self.mmr0 & MMR0_MAINTENANCE != 0 && intent.is_write())
    }

    const fn mapping_22bit(&self) -> bool {
        self.mmr3 & MMR3_MAPPING_22BIT != 0
    }

    const fn data_space_enabled(&self, mode: Mode) -> bool {
        match mode {
            Mode::Kernel => self.mmr3 & 0o4 != 0,
            Mode::Supervisor => self.mmr3 & 0o2 != 0,
            Mode::User => self.mmr3 & 0o1 != 0,
            Mode::Illegal => false,
        }
    }

    /// Page register index for `va` in the current translation mode.
    #[must_use]
    pub const fn page_index(&self, va: VirtualAddress) -> usize {
        let space = if va.is_data() && self.data_space_enabled(self.mode) {
            8
        } else {
            0
        };
        self.mode.index() * 16 + space + (va.offset() >> 13) as usize
    }

    pub(crate) fn begin_instruction(&mut self, pc: u16) {
        if !self.is_frozen() {
            self.mmr1 = 0;
            self.mmr2 = pc;
        }
    }

    pub(crate) fn record_register_change(&mut self, reg: usize, delta: i16) {
        if !self.is_frozen() {
            let amount = ((delta as u16) << 3) & 0o370;
            self.mmr1 = (self.mmr1 << 8) | amount | (reg as u16 & 7);
        }
    }

    pub(crate) fn record_trap(&mut self, vector: u16) {
        if !self.is_frozen() {
            self.mmr1 = 0o173366;
            self.mmr2 = vector;
        }
    }
}

impl Cpu {
    /// Translates a virtual address for the given access.
    ///
    /// # Errors
    ///
    /// Aborting faults have already trapped when they are returned.
    pub fn translate(&mut self, va: VirtualAddress, intent: AccessIntent) -> CpuResult<u32> {
        if !self.mmu.relocates(intent) {
            let mut physical = u32::from(va.offset());
            if validate_word_alignment(physical, intent).is_err() {
                return Err(self.raise(Fault::OddAddress));
            }
            if va.offset() >= IO_PAGE_VIRTUAL {
                physical |= IO_PAGE_BASE;
            }
            self.mmu.last_page = va.offset() >> 13;
            return Ok(physical);
        }

        let page = self.mmu.page_index(va);
        let mut physical = ((u32::from(self.mmu.par[page]) << 6)
            + u32::from(va.offset() & 0o17777))
            & PHYSICAL_MASK_22BIT;
        if !self.mmu.mapping_22bit() {
            physical &= PHYSICAL_MASK_18BIT;
            if physical >= IO_PAGE_18BIT {
                physical |= IO_PAGE_BASE;
            }
        }
        if validate_word_alignment(physical, intent).is_err() {
            return Err(self.raise(Fault::OddAddress));
        }

        let ceiling = self.memory.len_bytes();
        if physical >= ceiling && physical < IO_PAGE_BASE {
            if physical < UNIBUS_WINDOW_BASE {
                return Err(self.raise(Fault::NonExistentMemory));
            }
            if self.mmu.mmr3 & MMR3_UNIBUS_MAP != 0 {
                let offset = physical & PHYSICAL_MASK_18BIT;
                physical = (self.mmu.unibus_map[(offset >> 13) as usize] + (offset & 0o17777))
                    & PHYSICAL_MASK_22BIT;
                if physical >= ceiling && physical < IO_PAGE_BASE {
                    return Err(self.raise(Fault::BusTimeout));
                }
            }
        }
        if physical != MMR0_ADDRESS {
            self.mmu.last_page = page as u16;
        }

        self.check_page_access(page, va, intent, physical)?;
        Ok(physical)
    }

    fn check_page_access(
        &mut self,
        page: usize,
        va: VirtualAddress,
        intent: AccessIntent,
        physical: u32,
    ) -> CpuResult<()> {
        let mut pdr = self.mmu.pdr[page];
        let touched = if intent.is_write() {
            PDR_ACCESSED | PDR_WRITTEN
        } else {
            PDR_ACCESSED
        };
        let mut error = 0;
        match pdr & 0o7 {
            1 | 2 => {
                pdr |= PDR_ACCESSED;
                if intent.is_write() {
                    error = MMR0_ABORT_READ_ONLY;
                } else if pdr & 0o7 == 1 {
                    error = MMR0_TRAPPED;
                }
            }
            4 => {
                error = MMR0_TRAPPED;
                pdr |= touched;
            }
            5 => {
                if intent.is_write() {
                    error = MMR0_TRAPPED;
                }
                pdr |= touched;
            }
            6 => pdr |= touched,
            _ => error = MMR0_ABORT_NON_RESIDENT,
        }

        let block = (va.offset() >> 6) & 0o177;
        let length = (pdr >> 8) & 0o177;
        let outside = if pdr & PDR_EXPAND_DOWN != 0 {
            block < length
        } else {
            block > length
        };
        if outside {
            error |= MMR0_ABORT_LENGTH;
        }

        if error & MMR0_ABORTS == 0 {
            self.mmu.pdr[page] = pdr;
        }
        if error == 0 {
            return Ok(());
        }

        if error & MMR0_ABORTS != 0 {
            let error = error & MMR0_ABORTS;
            if !self.mmu.is_frozen() {
                let complete = if self.traps.in_progress() {
                    MMR0_INSTRUCTION_COMPLETE
                } else {
                    0
                };
                // Trap enable and maintenance are software's; keep them.
                let recorded = MMR0_ABORTS | MMR0_INSTRUCTION_COMPLETE | 0o176;
                self.mmu.mmr0 =
                    (self.mmu.mmr0 & !recorded) | error | complete | ((page as u16) << 1);
            }
            let fault = if error & MMR0_ABORT_NON_RESIDENT != 0 {
                Fault::PageNotResident
            } else if error & MMR0_ABORT_LENGTH != 0 {
                Fault::PageLengthAbort
            } else {
                Fault::ReadOnlyAbort
            };
            log::debug!(
                "mmu abort {fault} at {:#o} page {page} mmr0 {:#o}",
                va.offset(),
                self.mmu.mmr0
            );
            return Err(self.raise(fault));
        }

        if self.mmu.mmr0 & (MMR0_ABORTS | MMR0_TRAPPED) == 0 && !is_mmu_register(physical) {
            self.mmu.mmr0 |= MMR0_TRAPPED;
            if self.mmu.mmr0 & MMR0_TRAP_ENABLE != 0 {
                self.traps.defer(DeferredTrap::Mmu);
            }
        }
        Ok(())
    }

    /// Reads a word through translation.
    ///
    /// # Errors
    ///
    /// Translation and bus faults, already trapped.
    pub fn read_word(&mut self, va: VirtualAddress) -> CpuResult<u16> {
        let physical = self.translate(va, AccessIntent::READ_WORD)?;
        self.read_physical_word(physical)
    }

    /// Reads a byte through translation.
    ///
    /// # Errors
    ///
    /// Translation and bus faults, already trapped.
    pub fn read_byte(&mut self, va: VirtualAddress) -> CpuResult<u8> {
        let physical = self.translate(va, AccessIntent::READ_BYTE)?;
        self.read_physical_byte(physical)
    }

    /// Writes a word through translation.
    ///
    /// # Errors
    ///
    /// Translation and bus faults, already trapped.
    pub fn write_word(&mut self, va: VirtualAddress, value: u16) -> CpuResult<()> {
        let physical = self.translate(va, AccessIntent::WRITE_WORD)?;
        self.write_physical_word(physical, value)
    }

    /// Writes a byte through translation.
    ///
    /// # Errors
    ///
    /// Translation and bus faults, already trapped.
    pub fn write_byte(&mut self, va: VirtualAddress, value: u8) -> CpuResult<()> {
        let physical = self.translate(va, AccessIntent::WRITE_BYTE)?;
        self.write_physical_byte(physical, value)
    }

    /// Fetches the word at PC from instruction space and advances PC.
    pub(crate) fn fetch_word(&mut self) -> CpuResult<u16> {
        let pc = self.regs.pc();
        let word = self.read_word(VirtualAddress::instruction(pc))?;
        self.regs.set(PC, pc.wrapping_add(2));
        Ok(word)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Mmu, MMR0_ABORT_NON_RESIDENT, MMR0_ABORT_READ_ONLY, MMR0_ENABLE, MMR0_MAINTENANCE,
        MMR0_TRAPPED, MMR0_TRAP_ENABLE, PDR_ACCESSED, PDR_WRITTEN,
    };
    use crate::memory::{AccessIntent, VirtualAddress, IO_PAGE_BASE};
    use crate::state::Mode;
    use crate::{CoreConfig, Cpu, Fault};
    use proptest::prelude::*;

    fn cpu() -> Cpu {
        let mut cpu = Cpu::new(CoreConfig {
            memory_bytes: 0o200000,
            ..CoreConfig::default()
        })
        .expect("config must be valid");
        cpu.regs.set_sp(0o1000);
        cpu.memory.write_word(0o250, 0o2000);
        cpu.memory.write_word(0o4, 0o3000);
        cpu
    }

    fn identity_map(cpu: &mut Cpu, acf: u16) {
        for page in 0..8 {
            let access = if page == 0 || page == 7 { 6 } else { acf };
            cpu.mmu.write_par(page, (page as u16) * 0o200);
            cpu.mmu.write_pdr(page, 0o77400 | access);
        }
        cpu.mmu.write_par(7, 0o177600);
        cpu.mmu.write_mmr0(MMR0_ENABLE);
    }

    #[test]
    fn direct_map_redirects_top_page_to_io_page() {
        let mut cpu = cpu();
        assert_eq!(
            cpu.translate(VirtualAddress::data(0o1234), AccessIntent::READ_WORD),
            Ok(0o1234)
        );
        assert_eq!(
            cpu.translate(VirtualAddress::data(0o177570), AccessIntent::READ_WORD),
            Ok(IO_PAGE_BASE | 0o17570)
        );
    }

    #[test]
    fn relocation_adds_page_base() {
        let mut cpu = cpu();
        identity_map(&mut cpu, 6);
        cpu.mmu.write_par(1, 0o1000);
        assert_eq!(
            cpu.translate(VirtualAddress::data(0o20004), AccessIntent::READ_WORD),
            Ok(0o100004)
        );
        assert_eq!(cpu.mmu.pdr(1) & PDR_ACCESSED, PDR_ACCESSED);
        assert_eq!(cpu.mmu.pdr(1) & PDR_WRITTEN, 0);

        cpu.translate(VirtualAddress::data(0o20004), AccessIntent::WRITE_WORD)
            .expect("read-write page must accept writes");
        assert_eq!(cpu.mmu.pdr(1) & PDR_WRITTEN, PDR_WRITTEN);
    }

    #[test]
    fn eighteen_bit_mode_folds_top_of_space_into_io_page() {
        let mut cpu = cpu();
        identity_map(&mut cpu, 6);
        assert_eq!(
            cpu.translate(VirtualAddress::data(0o177776), AccessIntent::READ_WORD),
            Ok(0o17777776)
        );
    }

    #[test]
    fn read_only_page_aborts_writes_and_freezes_mmr0() {
        let mut cpu = cpu();
        identity_map(&mut cpu, 2);
        cpu.memory.write_word(0o20000, 0o777);

        assert_eq!(
            cpu.write_word(VirtualAddress::data(0o20000), 1),
            Err(Fault::ReadOnlyAbort)
        );
        assert_eq!(cpu.memory.read_word(0o20000), 0o777);
        assert!(cpu.mmu.is_frozen());
        assert_eq!(cpu.mmu.mmr0() & MMR0_ABORT_READ_ONLY, MMR0_ABORT_READ_ONLY);
        assert_eq!((cpu.mmu.mmr0() >> 1) & 0o77, 1);
        assert_eq!(cpu.regs.pc(), 0o2000);
    }

    #[test]
    fn length_check_honours_expansion_direction() {
        let mut cpu = cpu();
        identity_map(&mut cpu, 6);
        cpu.mmu.write_pdr(1, (0o10 << 8) | 6);
        assert!(cpu
            .translate(VirtualAddress::data(0o20000 + 0o10 * 0o100), AccessIntent::READ_WORD)
            .is_ok());
        assert_eq!(
            cpu.translate(VirtualAddress::data(0o20000 + 0o11 * 0o100), AccessIntent::READ_WORD),
            Err(Fault::PageLengthAbort)
        );

        cpu.mmu.write_mmr0(MMR0_ENABLE);
        cpu.mmu.write_pdr(2, (0o170 << 8) | 0o10 | 6);
        assert!(cpu
            .translate(VirtualAddress::data(0o40000 + 0o170 * 0o100), AccessIntent::READ_WORD)
            .is_ok());
        assert_eq!(
            cpu.translate(VirtualAddress::data(0o40000), AccessIntent::READ_WORD),
            Err(Fault::PageLengthAbort)
        );
    }

    #[test]
    fn trap_on_access_defers_mmu_trap_when_enabled() {
        let mut cpu = cpu();
        identity_map(&mut cpu, 4);
        cpu.mmu.write_mmr0(MMR0_ENABLE | MMR0_TRAP_ENABLE);

        assert!(cpu
            .translate(VirtualAddress::data(0o20000), AccessIntent::READ_WORD)
            .is_ok());
        assert_eq!(cpu.mmu.mmr0() & MMR0_TRAPPED, MMR0_TRAPPED);
        assert!(cpu.traps.pending().contains(crate::trap::DeferredTrap::Mmu));
    }

    #[test]
    fn non_resident_page_aborts_through_vector_250() {
        let mut cpu = cpu();
        identity_map(&mut cpu, 6);
        cpu.mmu.write_pdr(3, 0);
        assert_eq!(
            cpu.read_word(VirtualAddress::data(0o60000)),
            Err(Fault::PageNotResident)
        );
        assert_eq!(cpu.regs.pc(), 0o2000);
    }

    #[test]
    fn abort_keeps_trap_enable_and_maintenance_bits() {
        let mut cpu = cpu();
        identity_map(&mut cpu, 6);
        cpu.mmu.write_pdr(3, 0);
        cpu.mmu
            .write_mmr0(MMR0_ENABLE | MMR0_TRAP_ENABLE | MMR0_MAINTENANCE);

        assert_eq!(
            cpu.read_word(VirtualAddress::data(0o60000)),
            Err(Fault::PageNotResident)
        );
        assert_eq!(
            cpu.mmu.mmr0(),
            MMR0_ABORT_NON_RESIDENT | MMR0_TRAP_ENABLE | MMR0_MAINTENANCE | (3 << 1) | MMR0_ENABLE
        );
    }

    #[test]
    fn data_space_selects_upper_page_bank_when_enabled() {
        let mut mmu = Mmu::default();
        assert_eq!(mmu.page_index(VirtualAddress::data(0o20000)), 1);
        mmu.write_mmr3(0o4);
        assert_eq!(mmu.page_index(VirtualAddress::data(0o20000)), 9);
        assert_eq!(mmu.page_index(VirtualAddress::instruction(0o20000)), 1);
        mmu.set_mode(Mode::User);
        assert_eq!(mmu.page_index(VirtualAddress::data(0o20000)), 49);
    }

    #[test]
    fn register_changes_are_recorded_until_frozen() {
        let mut mmu = Mmu::default();
        mmu.begin_instruction(0o1000);
        mmu.record_register_change(2, 2);
        mmu.record_register_change(6, -2);
        assert_eq!(mmu.mmr1(), (0o22 << 8) | 0o366);
        assert_eq!(mmu.mmr2(), 0o1000);

        mmu.write_mmr0(MMR0_ABORT_READ_ONLY);
        mmu.begin_instruction(0o2000);
        assert_eq!(mmu.mmr2(), 0o1000);
    }

    #[test]
    fn page_register_writes_clear_access_bits() {
        let mut mmu = Mmu::default();
        mmu.write_pdr(0, 0o77406 | PDR_ACCESSED | PDR_WRITTEN);
        assert_eq!(mmu.pdr(0), 0o77406);
        mmu.pdr[0] |= PDR_WRITTEN;
        mmu.write_par(0, 0o1234);
        assert_eq!(mmu.pdr(0) & PDR_WRITTEN, 0);
        assert_eq!(mmu.par(0), 0o1234);
    }

    proptest! {
        #[test]
        fn odd_addresses_fault_only_for_words(
            addr in (0o2000_u16..0o160000).prop_map(|a| a | 1),
            relocate in any::<bool>(),
        ) {
            let mut cpu = cpu();
            if relocate {
                identity_map(&mut cpu, 6);
            }
            let va = VirtualAddress::data(addr);
            for intent in [AccessIntent::READ_BYTE, AccessIntent::WRITE_BYTE, AccessIntent::MODIFY_BYTE] {
                prop_assert_eq!(cpu.translate(va, intent), Ok(u32::from(addr)));
            }
            prop_assert_eq!(cpu.translate(va, AccessIntent::READ_WORD), Err(Fault::OddAddress));
            prop_assert_eq!(cpu.regs.pc(), 0o3000);
        }
    }
}
