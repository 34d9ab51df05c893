//! Operand specifier resolution: the eight addressing modes.

use crate::decoder::{AddressingMode, Specifier};
use crate::fault::{CpuResult, Fault};
use crate::memory::{AccessIntent, VirtualAddress};
use crate::state::{PC, SP};
use crate::Cpu;

/// Register step for an auto-increment or auto-decrement of `reg`.
///
/// The PC always steps one word; the SP steps by an even count; any other
/// register steps by the operand length.
#[must_use]
pub const fn register_step(reg: usize, intent: AccessIntent) -> u16 {
    let length = intent.length() as u16;
    match reg {
        PC => 2,
        SP => (length + 1) & !1,
        _ => length,
    }
}

impl Cpu {
    /// Resolves a memory operand specifier to a virtual address.
    ///
    /// Auto-increment and auto-decrement side effects are applied to the
    /// register and recorded in MMR1 before any pointer or operand access.
    ///
    /// # Errors
    ///
    /// Register mode has no address and raises [`Fault::IllegalAddressingMode`].
    /// Pointer fetches propagate translation faults; kernel stack writes
    /// below the red zone raise [`Fault::RedZone`].
    pub fn resolve(&mut self, specifier: Specifier, intent: AccessIntent) -> CpuResult<VirtualAddress> {
        let reg = specifier.reg();
        match specifier.mode() {
            AddressingMode::Register => Err(self.raise(Fault::IllegalAddressingMode)),
            AddressingMode::RegisterDeferred => {
                let addr = self.regs.get(reg);
                self.check_stack_operand(reg, addr, intent)?;
                Ok(VirtualAddress::for_register(reg, addr))
            }
            AddressingMode::Autoincrement => {
                let addr = self.regs.get(reg);
                let step = register_step(reg, intent);
                self.step_register(reg, step as i16);
                self.check_stack_operand(reg, addr, intent)?;
                Ok(VirtualAddress::for_register(reg, addr))
            }
            AddressingMode::AutoincrementDeferred => {
                let addr = self.regs.get(reg);
                self.step_register(reg, 2);
                let pointer = self.read_word(VirtualAddress::for_register(reg, addr))?;
                Ok(VirtualAddress::data(pointer))
            }
            AddressingMode::Autodecrement => {
                let step = register_step(reg, intent);
                self.step_register(reg, -(step as i16));
                let addr = self.regs.get(reg);
                self.check_stack_operand(reg, addr, intent)?;
                Ok(VirtualAddress::for_register(reg, addr))
            }
            AddressingMode::AutodecrementDeferred => {
                self.step_register(reg, -2);
                let addr = self.regs.get(reg);
                let pointer = self.read_word(VirtualAddress::for_register(reg, addr))?;
                Ok(VirtualAddress::data(pointer))
            }
            AddressingMode::Index => {
                let index = self.fetch_word()?;
                Ok(VirtualAddress::data(index.wrapping_add(self.regs.get(reg))))
            }
            AddressingMode::IndexDeferred => {
                let index = self.fetch_word()?;
                let addr = index.wrapping_add(self.regs.get(reg));
                let pointer = self.read_word(VirtualAddress::data(addr))?;
                Ok(VirtualAddress::data(pointer))
            }
        }
    }

    fn step_register(&mut self, reg: usize, delta: i16) {
        let value = self.regs.get(reg).wrapping_add(delta as u16);
        self.regs.set(reg, value);
        self.mmu.record_register_change(reg, delta);
    }
}
