//! Single-operand instructions and the previous-space moves.

use super::flags::{sign_bit, width_mask, FlagsUpdate};
use super::Operand;
use crate::decoder::DecodedInstruction;
use crate::encoding::Opcode;
use crate::fault::{CpuResult, Fault};
use crate::memory::{AccessIntent, VirtualAddress};
use crate::state::{PSW_C, PSW_N, PSW_V, PSW_Z, SP};
use crate::trap::StackCheck;
use crate::Cpu;

impl Cpu {
    pub(super) fn execute_single_operand(&mut self, ins: DecodedInstruction) -> CpuResult<()> {
        let byte = ins.is_byte();
        let sign = sign_bit(byte);
        let mask = width_mask(byte);
        let carry_in = self.regs.flag(PSW_C);

        match ins.opcode {
            Opcode::Clr => {
                let dst = self.operand(ins.dst(), AccessIntent::operand(byte, false, true))?;
                self.store(dst, byte, 0)?;
                self.commit_flags(FlagsUpdate::from_bits(PSW_N | PSW_Z | PSW_V | PSW_C, PSW_Z));
                return Ok(());
            }
            Opcode::Sxt => {
                let dst = self.operand(ins.dst(), AccessIntent::WRITE_WORD)?;
                let negative = self.regs.flag(PSW_N);
                self.store(dst, false, if negative { 0xffff } else { 0 })?;
                let zero = if negative { 0 } else { PSW_Z };
                self.commit_flags(FlagsUpdate::from_bits(PSW_Z | PSW_V, zero));
                return Ok(());
            }
            Opcode::Tst => {
                let value = self.read_operand(ins.dst(), byte)?;
                self.commit_flags(FlagsUpdate::nzvc(value, byte, false, false));
                return Ok(());
            }
            _ => {}
        }

        let dst = self.operand(ins.dst(), AccessIntent::operand(byte, true, true))?;
        let value = self.load(dst, byte)?;
        let (result, update) = match ins.opcode {
            Opcode::Com => {
                let result = !value & mask;
                (result, FlagsUpdate::nzvc(result, byte, false, true))
            }
            Opcode::Inc => {
                let result = value.wrapping_add(1) & mask;
                (result, FlagsUpdate::nzv(result, byte, result == sign))
            }
            Opcode::Dec => {
                let result = value.wrapping_sub(1) & mask;
                (result, FlagsUpdate::nzv(result, byte, value == sign))
            }
            Opcode::Neg => {
                let result = value.wrapping_neg() & mask;
                (result, FlagsUpdate::nzvc(result, byte, result == sign, result != 0))
            }
            Opcode::Adc => {
                let result = value.wrapping_add(u16::from(carry_in)) & mask;
                let overflow = carry_in && value == sign - 1;
                let carry = carry_in && value == mask;
                (result, FlagsUpdate::nzvc(result, byte, overflow, carry))
            }
            Opcode::Sbc => {
                let result = value.wrapping_sub(u16::from(carry_in)) & mask;
                let overflow = carry_in && value == sign;
                let carry = carry_in && value == 0;
                (result, FlagsUpdate::nzvc(result, byte, overflow, carry))
            }
            Opcode::Ror | Opcode::Rol | Opcode::Asr | Opcode::Asl => {
                let (result, carry) = match ins.opcode {
                    Opcode::Ror => ((value >> 1) | if carry_in { sign } else { 0 }, value & 1 != 0),
                    Opcode::Rol => (((value << 1) & mask) | u16::from(carry_in), value & sign != 0),
                    Opcode::Asr => ((value >> 1) | (value & sign), value & 1 != 0),
                    _ => ((value << 1) & mask, value & sign != 0),
                };
                let negative = result & sign != 0;
                (result, FlagsUpdate::nzvc(result, byte, negative != carry, carry))
            }
            Opcode::Swab => {
                let result = value.rotate_left(8);
                (result, FlagsUpdate::nzvc(result & 0xff, true, false, false))
            }
            _ => return Err(self.raise(Fault::IllegalInstruction)),
        };
        self.store(dst, byte, result)?;
        self.commit_flags(update);
        Ok(())
    }

    /// MFPI/MFPD: push a word read from the previous mode's space.
    pub(super) fn execute_move_from_previous(&mut self, ins: DecodedInstruction) -> CpuResult<()> {
        let data_space = ins.word & 0o100000 != 0;
        let previous = self.regs.previous_mode();
        let value = match self.operand(ins.dst(), AccessIntent::READ_WORD)? {
            Operand::Register(SP) => self.regs.stack_pointer(previous),
            Operand::Register(reg) => self.regs.get(reg),
            Operand::Memory(va) => {
                let va = previous_space(va, data_space);
                self.mmu.set_mode(previous);
                let read = self.read_word(va);
                self.mmu.set_mode(self.regs.current_mode());
                read?
            }
        };
        self.push(value, StackCheck::Full)?;
        self.commit_flags(FlagsUpdate::nzv(value, false, false));
        Ok(())
    }

    /// MTPI/MTPD: pop a word and store it into the previous mode's space.
    pub(super) fn execute_move_to_previous(&mut self, ins: DecodedInstruction) -> CpuResult<()> {
        let data_space = ins.word & 0o100000 != 0;
        let previous = self.regs.previous_mode();
        let value = self.pop()?;
        match self.operand(ins.dst(), AccessIntent::WRITE_WORD)? {
            Operand::Register(SP) => self.regs.set_stack_pointer(previous, value),
            Operand::Register(reg) => self.regs.set(reg, value),
            Operand::Memory(va) => {
                let va = previous_space(va, data_space);
                self.mmu.set_mode(previous);
                let written = self.write_word(va, value);
                self.mmu.set_mode(self.regs.current_mode());
                written?;
            }
        }
        self.commit_flags(FlagsUpdate::nzv(value, false, false));
        Ok(())
    }
}

fn previous_space(va: VirtualAddress, data_space: bool) -> VirtualAddress {
    if data_space {
        VirtualAddress::data(va.offset())
    } else {
        VirtualAddress::instruction(va.offset())
    }
}
