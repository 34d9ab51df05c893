//! CPU registers that live in the I/O page ahead of the device dispatcher.

use crate::bus::{apply_cycle, BusCycle};
use crate::memory::MMR0_ADDRESS;
use crate::state::{Mode, PSW_T};
use crate::Cpu;

/// Processor status word.
pub const PSW_ADDRESS: u32 = 0o17777776;
/// Stack limit register.
pub const STACK_LIMIT_ADDRESS: u32 = 0o17777774;
/// Program interrupt request register.
pub const PIR_ADDRESS: u32 = 0o17777772;
/// Microprogram break register.
pub const MICROPROGRAM_BREAK_ADDRESS: u32 = 0o17777770;
/// CPU error register.
pub const CPU_ERROR_ADDRESS: u32 = 0o17777766;
/// System identification register.
pub const SYSTEM_ID_ADDRESS: u32 = 0o17777764;
/// Memory size, upper word.
pub const MEMORY_SIZE_UPPER_ADDRESS: u32 = 0o17777762;
/// Memory size, lower word (in 64-byte blocks, minus one).
pub const MEMORY_SIZE_LOWER_ADDRESS: u32 = 0o17777760;
/// Cache hit/miss register.
pub const HIT_MISS_ADDRESS: u32 = 0o17777752;
/// Cache control register.
pub const CACHE_CONTROL_ADDRESS: u32 = 0o17777746;
/// Memory system error register.
pub const MEMORY_ERROR_ADDRESS: u32 = 0o17777744;
/// Console switch (read) and display (write) register.
pub const SWITCH_DISPLAY_ADDRESS: u32 = 0o17777570;
/// Memory management register 1.
pub const MMR1_ADDRESS: u32 = 0o17777574;
/// Memory management register 2.
pub const MMR2_ADDRESS: u32 = 0o17777576;
/// Memory management register 3.
pub const MMR3_ADDRESS: u32 = 0o17772516;
/// Supervisor PDR bank; the PAR bank follows 32 bytes later.
pub const SUPERVISOR_PDR_BASE: u32 = 0o17772200;
/// Kernel PDR bank.
pub const KERNEL_PDR_BASE: u32 = 0o17772300;
/// User PDR bank.
pub const USER_PDR_BASE: u32 = 0o17777600;
/// First Unibus map register.
pub const UNIBUS_MAP_BASE: u32 = 0o17770200;
/// General register aliases (`R0..R5` set 0, KSP, PC, `R0..R5` set 1, SSP, USP).
pub const GENERAL_REGISTER_BASE: u32 = 0o17777700;

const SYSTEM_ID: u16 = 0o1;

/// A CPU-owned register in the I/O page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuRegister {
    /// Processor status word.
    Psw,
    /// Stack limit.
    StackLimit,
    /// Program interrupt request.
    Pir,
    /// Microprogram break.
    MicroprogramBreak,
    /// CPU error.
    CpuError,
    /// System identification.
    SystemId,
    /// Memory size, upper word.
    MemorySizeUpper,
    /// Memory size, lower word.
    MemorySizeLower,
    /// Cache and memory-system registers, which read as zero.
    Cache,
    /// Console switch/display.
    SwitchDisplay,
    /// MMR0.
    Mmr0,
    /// MMR1.
    Mmr1,
    /// MMR2.
    Mmr2,
    /// MMR3.
    Mmr3,
    /// Page descriptor register by page index.
    Pdr(usize),
    /// Page address register by page index.
    Par(usize),
    /// Unibus map register half.
    UnibusMap {
        /// Map register number.
        index: usize,
        /// High-order half.
        high: bool,
    },
    /// General register alias `0..=15`.
    General(usize),
}

impl CpuRegister {
    /// Decodes a physical address, or `None` when a device must answer.
    #[must_use]
    pub const fn decode(addr: u32) -> Option<Self> {
        if addr >= GENERAL_REGISTER_BASE && addr < GENERAL_REGISTER_BASE + 0o20 {
            return Some(Self::General((addr - GENERAL_REGISTER_BASE) as usize));
        }
        let word = addr & !1;
        let register = match word {
            PSW_ADDRESS => Self::Psw,
            STACK_LIMIT_ADDRESS => Self::StackLimit,
            PIR_ADDRESS => Self::Pir,
            MICROPROGRAM_BREAK_ADDRESS => Self::MicroprogramBreak,
            CPU_ERROR_ADDRESS => Self::CpuError,
            SYSTEM_ID_ADDRESS => Self::SystemId,
            MEMORY_SIZE_UPPER_ADDRESS => Self::MemorySizeUpper,
            MEMORY_SIZE_LOWER_ADDRESS => Self::MemorySizeLower,
            HIT_MISS_ADDRESS | CACHE_CONTROL_ADDRESS | MEMORY_ERROR_ADDRESS => Self::Cache,
            SWITCH_DISPLAY_ADDRESS => Self::SwitchDisplay,
            MMR0_ADDRESS => Self::Mmr0,
            MMR1_ADDRESS => Self::Mmr1,
            MMR2_ADDRESS => Self::Mmr2,
            MMR3_ADDRESS => Self::Mmr3,
            _ => {
                if let Some(page) = page_register(word, KERNEL_PDR_BASE, Mode::Kernel) {
                    return Some(page);
                }
                if let Some(page) = page_register(word, SUPERVISOR_PDR_BASE, Mode::Supervisor) {
                    return Some(page);
                }
                if let Some(page) = page_register(word, USER_PDR_BASE, Mode::User) {
                    return Some(page);
                }
                if word >= UNIBUS_MAP_BASE && word < UNIBUS_MAP_BASE + 0o200 {
                    return Some(Self::UnibusMap {
                        index: ((word - UNIBUS_MAP_BASE) >> 2) as usize,
                        high: word & 2 != 0,
                    });
                }
                return None;
            }
        };
        Some(register)
    }
}

const fn page_register(word: u32, base: u32, mode: Mode) -> Option<CpuRegister> {
    if word < base || word >= base + 0o100 {
        return None;
    }
    let offset = word - base;
    let page = mode.index() * 16 + ((offset & 0o36) >> 1) as usize;
    if offset < 0o40 {
        Some(CpuRegister::Pdr(page))
    } else {
        Some(CpuRegister::Par(page))
    }
}

impl Cpu {
    /// Services a transfer to a CPU register; `None` when the address belongs to a device.
    pub(crate) fn cpu_register_access(&mut self, addr: u32, cycle: BusCycle) -> Option<u16> {
        let register = CpuRegister::decode(addr)?;
        let current = self.read_cpu_register(register);
        if !cycle.is_write() {
            return Some(current);
        }
        let value = apply_cycle(current, addr, cycle);
        self.write_cpu_register(register, value);
        Some(value)
    }

    /// Reads a CPU register.
    #[must_use]
    pub fn read_cpu_register(&self, register: CpuRegister) -> u16 {
        match register {
            CpuRegister::Psw => self.regs.psw(),
            CpuRegister::StackLimit => self.traps.stack_limit(),
            CpuRegister::Pir => self.traps.pir(),
            CpuRegister::MicroprogramBreak => self.microprogram_break,
            CpuRegister::CpuError => self.traps.cpu_error(),
            CpuRegister::SystemId => SYSTEM_ID,
            CpuRegister::MemorySizeUpper => (((self.memory.len_bytes() >> 6) - 1) >> 16) as u16,
            CpuRegister::MemorySizeLower => ((self.memory.len_bytes() >> 6) - 1) as u16,
            CpuRegister::Cache => 0,
            CpuRegister::SwitchDisplay => self.console.switches,
            CpuRegister::Mmr0 => self.mmu.mmr0(),
            CpuRegister::Mmr1 => self.mmu.mmr1(),
            CpuRegister::Mmr2 => self.mmu.mmr2(),
            CpuRegister::Mmr3 => self.mmu.mmr3(),
            CpuRegister::Pdr(page) => self.mmu.pdr(page),
            CpuRegister::Par(page) => self.mmu.par(page),
            CpuRegister::UnibusMap { index, high } => {
                let entry = self.mmu.unibus_map(index);
                if high {
                    (entry >> 16) as u16
                } else {
                    (entry & 0xffff) as u16
                }
            }
            CpuRegister::General(index) => match index {
                0..=5 => self.regs.banked(0, index),
                6 => self.regs.stack_pointer(Mode::Kernel),
                7 => self.regs.pc(),
                8..=13 => self.regs.banked(1, index - 8),
                14 => self.regs.stack_pointer(Mode::Supervisor),
                _ => self.regs.stack_pointer(Mode::User),
            },
        }
    }

    /// Writes a CPU register with register-specific masking and side effects.
    pub fn write_cpu_register(&mut self, register: CpuRegister, value: u16) {
        match register {
            CpuRegister::Psw => {
                let psw = (value & !PSW_T) | (self.regs.psw() & PSW_T);
                self.write_psw(psw);
                self.psw_written = true;
            }
            CpuRegister::StackLimit => self.traps.write_stack_limit(value),
            CpuRegister::Pir => self.traps.write_pir(value),
            CpuRegister::MicroprogramBreak => self.microprogram_break = value,
            CpuRegister::CpuError => self.traps.cpu_error = 0,
            CpuRegister::SwitchDisplay => self.console.display = value,
            CpuRegister::Mmr0 => self.mmu.write_mmr0(value),
            CpuRegister::Mmr3 => self.mmu.write_mmr3(value),
            CpuRegister::Pdr(page) => self.mmu.write_pdr(page, value),
            CpuRegister::Par(page) => self.mmu.write_par(page, value),
            CpuRegister::UnibusMap { index, high } => {
                self.mmu.write_unibus_map(index, high, value);
            }
            CpuRegister::General(index) => match index {
                0..=5 => self.regs.set_banked(0, index, value),
                6 => self.regs.set_stack_pointer(Mode::Kernel, value),
                7 => self.regs.set_pc(value),
                8..=13 => self.regs.set_banked(1, index - 8, value),
                14 => self.regs.set_stack_pointer(Mode::Supervisor, value),
                _ => self.regs.set_stack_pointer(Mode::User, value),
            },
            CpuRegister::SystemId
            | CpuRegister::MemorySizeUpper
            | CpuRegister::MemorySizeLower
            | CpuRegister::Cache
            | CpuRegister::Mmr1
            | CpuRegister::Mmr2 => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CpuRegister, KERNEL_PDR_BASE, SUPERVISOR_PDR_BASE, USER_PDR_BASE};
    use crate::bus::BusCycle;
    use crate::{CoreConfig, Cpu};
    use rstest::rstest;

    #[rstest]
    #[case(0o17777776, CpuRegister::Psw)]
    #[case(0o17777777, CpuRegister::Psw)]
    #[case(0o17777572, CpuRegister::Mmr0)]
    #[case(0o17772516, CpuRegister::Mmr3)]
    #[case(KERNEL_PDR_BASE + 0o2, CpuRegister::Pdr(1))]
    #[case(KERNEL_PDR_BASE + 0o42, CpuRegister::Par(1))]
    #[case(KERNEL_PDR_BASE + 0o20, CpuRegister::Pdr(8))]
    #[case(SUPERVISOR_PDR_BASE + 0o76, CpuRegister::Par(31))]
    #[case(USER_PDR_BASE, CpuRegister::Pdr(48))]
    #[case(0o17770204, CpuRegister::UnibusMap { index: 1, high: false })]
    #[case(0o17770206, CpuRegister::UnibusMap { index: 1, high: true })]
    #[case(0o17777707, CpuRegister::General(7))]
    fn addresses_decode_to_cpu_registers(#[case] addr: u32, #[case] register: CpuRegister) {
        assert_eq!(CpuRegister::decode(addr), Some(register));
    }

    #[test]
    fn device_addresses_are_not_cpu_registers() {
        assert_eq!(CpuRegister::decode(0o17777560), None);
        assert_eq!(CpuRegister::decode(0o17777546), None);
    }

    #[test]
    fn byte_write_merges_into_psw_and_preserves_trace() {
        let mut cpu = Cpu::new(CoreConfig::default()).expect("default config must be valid");
        cpu.write_psw(0o20);
        cpu.cpu_register_access(0o17777776, BusCycle::WriteByte(0o357));
        assert_eq!(cpu.regs.psw(), 0o357);
        assert!(cpu.psw_written);
        cpu.cpu_register_access(0o17777777, BusCycle::WriteByte(0o140));
        assert_eq!(cpu.regs.psw() >> 8, 0o140);
    }

    #[test]
    fn cpu_error_clears_on_any_write() {
        let mut cpu = Cpu::new(CoreConfig::default()).expect("default config must be valid");
        cpu.traps.cpu_error = 0o144;
        assert_eq!(
            cpu.cpu_register_access(0o17777766, BusCycle::Read),
            Some(0o144)
        );
        cpu.cpu_register_access(0o17777766, BusCycle::Write(0o777));
        assert_eq!(cpu.traps.cpu_error(), 0);
    }

    #[test]
    fn memory_size_reports_last_block() {
        let cpu = Cpu::new(CoreConfig {
            memory_bytes: 0o1000000,
            ..CoreConfig::default()
        })
        .expect("config must be valid");
        assert_eq!(cpu.read_cpu_register(CpuRegister::MemorySizeLower), 0o7777);
        assert_eq!(cpu.read_cpu_register(CpuRegister::MemorySizeUpper), 0);
    }

    #[test]
    fn unibus_map_halves_combine() {
        let mut cpu = Cpu::new(CoreConfig::default()).expect("default config must be valid");
        cpu.write_cpu_register(CpuRegister::UnibusMap { index: 3, high: false }, 0o123457);
        cpu.write_cpu_register(CpuRegister::UnibusMap { index: 3, high: true }, 0o77);
        assert_eq!(cpu.mmu.unibus_map(3), (0o77 << 16) | 0o123456);
    }
}
