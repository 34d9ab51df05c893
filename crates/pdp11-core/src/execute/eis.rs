//! Extended instruction set: MUL, DIV, ASH, ASHC and XOR.

use super::flags::FlagsUpdate;
use crate::decoder::DecodedInstruction;
use crate::encoding::Opcode;
use crate::fault::{CpuResult, Fault};
use crate::memory::AccessIntent;
use crate::state::{PSW_C, PSW_FLAGS, PSW_N, PSW_V, PSW_Z};
use crate::Cpu;

/// Sign-extends a 6-bit shift count.
const fn shift_count(src: u16) -> i32 {
    ((src & 0o77) as i32 ^ 0o40) - 0o40
}

const fn bit(set: bool, flag: u16) -> u16 {
    if set {
        flag
    } else {
        0
    }
}

impl Cpu {
    pub(super) fn execute_extended(&mut self, ins: DecodedInstruction) -> CpuResult<()> {
        let reg = ins.reg();
        let pair = reg | 1;

        if ins.opcode == Opcode::Xor {
            let src = self.regs.get(reg);
            let dst = self.operand(ins.dst(), AccessIntent::MODIFY_WORD)?;
            let result = self.load(dst, false)? ^ src;
            self.store(dst, false, result)?;
            self.commit_flags(FlagsUpdate::nzv(result, false, false));
            return Ok(());
        }

        let src = self.read_operand(ins.dst(), false)?;
        let flags = match ins.opcode {
            Opcode::Mul => {
                let product = i32::from(self.regs.get(reg) as i16) * i32::from(src as i16);
                let product = product as u32;
                if reg == pair {
                    self.regs.set(reg, product as u16);
                } else {
                    self.regs.set(reg, (product >> 16) as u16);
                    self.regs.set(pair, product as u16);
                }
                let signed = product as i32;
                bit(signed < 0, PSW_N)
                    | bit(signed == 0, PSW_Z)
                    | bit(signed < i32::from(i16::MIN) || signed > i32::from(i16::MAX), PSW_C)
            }
            Opcode::Div => {
                let dividend =
                    ((u32::from(self.regs.get(reg)) << 16) | u32::from(self.regs.get(pair))) as i32;
                let divisor = i32::from(src as i16);
                if divisor == 0 {
                    PSW_V | PSW_C
                } else {
                    match dividend.checked_div(divisor) {
                        Some(quotient) if i16::try_from(quotient).is_ok() => {
                            let remainder = dividend % divisor;
                            self.regs.set(reg, quotient as u16);
                            self.regs.set(pair, remainder as u16);
                            bit(quotient < 0, PSW_N) | bit(quotient == 0, PSW_Z)
                        }
                        _ => PSW_V,
                    }
                }
            }
            Opcode::Ash => {
                let value = i64::from(self.regs.get(reg) as i16);
                let (result, carry, overflow) = shift(value, shift_count(src), 16);
                self.regs.set(reg, result as u16);
                let result = result as i16;
                bit(result < 0, PSW_N)
                    | bit(result == 0, PSW_Z)
                    | bit(overflow, PSW_V)
                    | bit(carry, PSW_C)
            }
            Opcode::Ashc => {
                let value = (u32::from(self.regs.get(reg)) << 16) | u32::from(self.regs.get(pair));
                let (result, carry, overflow) =
                    shift(i64::from(value as i32), shift_count(src), 32);
                let result = result as u32;
                self.regs.set(reg, (result >> 16) as u16);
                self.regs.set(pair, result as u16);
                let result = result as i32;
                bit(result < 0, PSW_N)
                    | bit(result == 0, PSW_Z)
                    | bit(overflow, PSW_V)
                    | bit(carry, PSW_C)
            }
            _ => return Err(self.raise(Fault::IllegalInstruction)),
        };
        self.commit_flags(FlagsUpdate::from_bits(PSW_FLAGS, flags));
        Ok(())
    }
}

/// Arithmetic shift of a `width`-bit signed value.
///
/// Returns the shifted value, the last bit shifted out and whether the sign
/// changed at any point of a left shift.
fn shift(value: i64, count: i32, width: u32) -> (i64, bool, bool) {
    if count == 0 {
        return (value, false, false);
    }
    if count > 0 {
        let shifted = value << count;
        let carry = (shifted >> width) & 1 != 0;
        let truncated = (shifted << (64 - width)) >> (64 - width);
        (truncated, carry, truncated != shifted)
    } else {
        let count = (-count) as u32;
        let carry = (value >> (count - 1)) & 1 != 0;
        (value >> count, carry, false)
    }
}
