//! Integer operand access: a register or a resolved memory location.

use crate::decoder::Specifier;
use crate::fault::CpuResult;
use crate::memory::{AccessIntent, VirtualAddress};
use crate::Cpu;

/// Location of an integer operand after specifier resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// General register.
    Register(usize),
    /// Memory word or byte.
    Memory(VirtualAddress),
}

impl Cpu {
    /// Resolves a specifier to an operand location, applying its side effects.
    pub(crate) fn operand(&mut self, specifier: Specifier, intent: AccessIntent) -> CpuResult<Operand> {
        if specifier.is_register() {
            return Ok(Operand::Register(specifier.reg()));
        }
        self.resolve(specifier, intent).map(Operand::Memory)
    }

    /// Reads an operand; byte reads are zero-extended.
    pub(crate) fn load(&mut self, operand: Operand, byte: bool) -> CpuResult<u16> {
        match operand {
            Operand::Register(reg) if byte => Ok(self.regs.get(reg) & 0xff),
            Operand::Register(reg) => Ok(self.regs.get(reg)),
            Operand::Memory(va) if byte => self.read_byte(va).map(u16::from),
            Operand::Memory(va) => self.read_word(va),
        }
    }

    /// Writes an operand; byte writes to a register keep its high byte.
    pub(crate) fn store(&mut self, operand: Operand, byte: bool, value: u16) -> CpuResult<()> {
        match operand {
            Operand::Register(reg) if byte => {
                let merged = (self.regs.get(reg) & 0xff00) | (value & 0xff);
                self.regs.set(reg, merged);
                Ok(())
            }
            Operand::Register(reg) => {
                self.regs.set(reg, value);
                Ok(())
            }
            Operand::Memory(va) if byte => self.write_byte(va, (value & 0xff) as u8),
            Operand::Memory(va) => self.write_word(va, value),
        }
    }

    /// Resolves and reads a source operand.
    pub(crate) fn read_operand(&mut self, specifier: Specifier, byte: bool) -> CpuResult<u16> {
        let operand = self.operand(specifier, AccessIntent::operand(byte, true, false))?;
        self.load(operand, byte)
    }
}
