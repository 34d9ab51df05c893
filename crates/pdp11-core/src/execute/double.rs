//! Double-operand instructions: MOV, CMP, BIT, BIC, BIS, ADD, SUB.

use super::flags::{sign_bit, width_mask, FlagsUpdate};
use super::Operand;
use crate::decoder::DecodedInstruction;
use crate::encoding::Opcode;
use crate::fault::{CpuResult, Fault};
use crate::memory::AccessIntent;
use crate::Cpu;

impl Cpu {
    pub(super) fn execute_double_operand(&mut self, ins: DecodedInstruction) -> CpuResult<()> {
        let byte = ins.is_byte();
        let sign = sign_bit(byte);
        let mask = width_mask(byte);
        let src = self.read_operand(ins.src(), byte)?;

        match ins.opcode {
            Opcode::Mov => {
                let dst = self.operand(ins.dst(), AccessIntent::operand(byte, false, true))?;
                match dst {
                    // MOVB to a register sign-extends into the high byte.
                    Operand::Register(reg) if byte => {
                        self.regs.set(reg, src as u8 as i8 as i16 as u16);
                    }
                    _ => self.store(dst, byte, src)?,
                }
                self.commit_flags(FlagsUpdate::nzv(src, byte, false));
            }
            Opcode::Cmp => {
                let dst = self.read_operand(ins.dst(), byte)?;
                let result = src.wrapping_sub(dst) & mask;
                let overflow = (src ^ dst) & (src ^ result) & sign != 0;
                self.commit_flags(FlagsUpdate::nzvc(result, byte, overflow, dst > src));
            }
            Opcode::Bit => {
                let dst = self.read_operand(ins.dst(), byte)?;
                self.commit_flags(FlagsUpdate::nzv(src & dst, byte, false));
            }
            Opcode::Bic | Opcode::Bis => {
                let dst = self.operand(ins.dst(), AccessIntent::operand(byte, true, true))?;
                let value = self.load(dst, byte)?;
                let result = if ins.opcode == Opcode::Bic {
                    value & !src
                } else {
                    value | src
                };
                self.store(dst, byte, result)?;
                self.commit_flags(FlagsUpdate::nzv(result, byte, false));
            }
            Opcode::Add | Opcode::Sub => {
                let dst = self.operand(ins.dst(), AccessIntent::MODIFY_WORD)?;
                let value = self.load(dst, false)?;
                let (result, carry, overflow) = if ins.opcode == Opcode::Add {
                    let (result, carry) = value.overflowing_add(src);
                    (result, carry, !(src ^ value) & (src ^ result) & 0x8000 != 0)
                } else {
                    let (result, borrow) = value.overflowing_sub(src);
                    (result, borrow, (src ^ value) & (value ^ result) & 0x8000 != 0)
                };
                self.store(dst, false, result)?;
                self.commit_flags(FlagsUpdate::nzvc(result, false, overflow, carry));
            }
            _ => return Err(self.raise(Fault::IllegalInstruction)),
        }
        Ok(())
    }
}
