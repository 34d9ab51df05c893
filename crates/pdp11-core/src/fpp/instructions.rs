//! Decoding and execution of the floating-point instruction range.
//!
//! Bits 11..8 select the operation. Groups 0 and 1 carry a 6-bit operand
//! only; the rest name an accumulator in bits 7..6 (AC0..AC3) and a 6-bit
//! floating or integer operand. Register mode addresses AC0..AC5.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use std::cmp::Ordering;

use super::arith;
use super::convert;
use super::float::{self, is_undefined, pack, Packed, Precision, Unpacked};
use super::{
    FppException, ACCUMULATORS, FPS_C, FPS_CC, FPS_FD, FPS_FIUV, FPS_FL, FPS_FT, FPS_N, FPS_Z,
};
use crate::decoder::{AddressingMode, DecodedInstruction, Specifier};
use crate::execute::FlagsUpdate;
use crate::fault::Fault;
use crate::memory::{AccessIntent, VirtualAddress};
use crate::state::{PC, PSW_FLAGS};
use crate::trap::DeferredTrap;
use crate::{Cpu, CpuResult};

/// Why a floating instruction stopped before completing.
enum Abort {
    /// Processor fault; the trap has been taken.
    Fault(Fault),
    /// Floating exception to record once the instruction ends.
    Exception(FppException),
}

impl From<Fault> for Abort {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

impl From<FppException> for Abort {
    fn from(exception: FppException) -> Self {
        Self::Exception(exception)
    }
}

type FppResult<T> = Result<T, Abort>;

/// Where a floating operand lives.
#[derive(Debug, Clone, Copy)]
enum Location {
    Accumulator(usize),
    Memory { va: VirtualAddress, words: usize },
}

/// Where an integer operand lives.
#[derive(Debug, Clone, Copy)]
enum IntegerLocation {
    Register(usize),
    Memory { va: VirtualAddress, words: usize },
}

const fn is_immediate(spec: Specifier) -> bool {
    matches!(spec.mode(), AddressingMode::Autoincrement) && spec.reg() == PC
}

/// FPS condition codes for an integer result.
const fn integer_codes(value: i32, long: bool, conversion_error: bool) -> u16 {
    let value = if long { value } else { value as i16 as i32 };
    let mut cc = 0;
    if value < 0 {
        cc |= FPS_N;
    }
    if value == 0 {
        cc |= FPS_Z;
    }
    if conversion_error {
        cc |= FPS_C;
    }
    cc
}

impl Cpu {
    /// Executes one instruction from the floating-point range.
    ///
    /// Floating exceptions do not abort the processor instruction: they
    /// are recorded in FEC/FEA and, when enabled, serviced as a deferred
    /// trap through vector 244.
    pub(crate) fn execute_fpp(&mut self, ins: DecodedInstruction) -> CpuResult<()> {
        let pc = self.regs.pc().wrapping_sub(2);
        match self.dispatch_fpp(ins) {
            Ok(()) => Ok(()),
            Err(Abort::Fault(fault)) => Err(fault),
            Err(Abort::Exception(exception)) => {
                self.floating_exception(exception, pc);
                Ok(())
            }
        }
    }

    fn floating_exception(&mut self, exception: FppException, pc: u16) {
        let traps = self.fpp.record(exception, pc);
        log::debug!("{exception} at {pc:06o}, trap {traps}");
        if traps {
            self.traps.defer(DeferredTrap::FloatingPoint);
        }
    }

    fn dispatch_fpp(&mut self, ins: DecodedInstruction) -> FppResult<()> {
        let word = ins.word;
        let spec = ins.dst();
        let ac = usize::from((word >> 6) & 3);
        let precision = self.fpp.precision();

        match (word >> 8) & 0o17 {
            0 => self.execute_fpp_control(ins),
            1 => match ac {
                0 => {
                    let dst = self.float_location(spec, precision, AccessIntent::WRITE_WORD)?;
                    self.write_float(dst, [0; 4], precision)?;
                    self.fpp.set_condition_codes(FPS_Z);
                    Ok(())
                }
                1 => {
                    let value = self.load_float(spec, precision)?;
                    self.fpp.set_value_codes(&value, false);
                    Ok(())
                }
                _ => {
                    let dst = self.float_location(spec, precision, AccessIntent::MODIFY_WORD)?;
                    let value = self.read_float(dst)?;
                    self.check_undefined(&value)?;
                    let result = if float::exponent_field(&value) == 0 {
                        [0; 4]
                    } else if ac == 2 {
                        [value[0] & 0o077777, value[1], value[2], value[3]]
                    } else {
                        [value[0] ^ 0o100000, value[1], value[2], value[3]]
                    };
                    self.write_float(dst, result, precision)?;
                    self.fpp.set_value_codes(&result, false);
                    Ok(())
                }
            },
            2 => self.float_arithmetic(ac, spec, |a, b, p, t| Ok(arith::multiply(a, b, p, t))),
            3 => self.execute_modf(ac, spec),
            4 => self.float_arithmetic(ac, spec, |a, b, p, t| Ok(arith::add(a, b, p, t))),
            5 => {
                let value = self.load_float(spec, precision)?;
                let value = if float::exponent_field(&value) == 0 {
                    [0; 4]
                } else {
                    value
                };
                let packed = Packed {
                    words: value,
                    exception: None,
                };
                self.store_accumulator(ac, packed)
            }
            6 => self.float_arithmetic(ac, spec, |a, b, p, t| Ok(arith::subtract(a, b, p, t))),
            7 => {
                let src = self.load_float(spec, precision)?;
                let src = float::unpack(&src, precision);
                let acc = float::unpack(&self.fpp.ac(ac), precision);
                let cc = match float::compare(src, acc) {
                    Ordering::Less => FPS_N,
                    Ordering::Equal => FPS_Z,
                    Ordering::Greater => 0,
                };
                self.fpp.set_condition_codes(cc);
                Ok(())
            }
            8 => {
                let dst = self.float_location(spec, precision, AccessIntent::WRITE_WORD)?;
                self.write_float(dst, self.fpp.ac(ac), precision)
            }
            9 => self.float_arithmetic(ac, spec, arith::divide),
            10 => {
                let exponent = convert::store_exponent(&self.fpp.ac(ac));
                let dst = self.integer_location(spec, false, AccessIntent::WRITE_WORD)?;
                self.write_integer(dst, i32::from(exponent), false)?;
                self.fpp
                    .set_condition_codes(integer_codes(i32::from(exponent), false, false));
                self.copy_condition_codes();
                Ok(())
            }
            11 => self.execute_store_integer(ac, spec),
            12 => {
                let to = precision.other();
                let converted =
                    convert::change_precision(&self.fpp.ac(ac), precision, self.fpp.fps());
                let dst = self.float_location(spec, to, AccessIntent::WRITE_WORD)?;
                self.write_float(dst, converted.words, to)?;
                self.finish_store(&converted)
            }
            13 => {
                let src = self.integer_location(spec, false, AccessIntent::READ_WORD)?;
                let exponent = self.read_integer(src, false)? as i16;
                let packed =
                    convert::load_exponent(&self.fpp.ac(ac), exponent, precision, self.fpp.fps());
                self.store_accumulator(ac, packed)
            }
            14 => {
                let long = self.fpp.long_integers();
                let src = self.integer_location(spec, long, AccessIntent::READ_WORD)?;
                let value = self.read_integer(src, long)?;
                let truncate = self.fpp.fps() & FPS_FT != 0;
                let converted = convert::from_integer(value, precision, truncate);
                self.store_accumulator(ac, pack(converted, precision, self.fpp.fps()))
            }
            _ => {
                let from = precision.other();
                let value = self.load_float(spec, from)?;
                let converted = convert::change_precision(&value, from, self.fpp.fps());
                self.store_accumulator(ac, converted)
            }
        }
    }

    /// Group 0: status operations.
    fn execute_fpp_control(&mut self, ins: DecodedInstruction) -> FppResult<()> {
        let spec = ins.dst();
        match (ins.word >> 6) & 3 {
            0 => {
                let fps = self.fpp.fps();
                match ins.word & 0o77 {
                    0o00 => self.copy_condition_codes(),
                    0o01 => self.fpp.write_fps(fps & !FPS_FD),
                    0o02 => self.fpp.write_fps(fps & !FPS_FL),
                    0o03 => return Err(FppException::Maintenance.into()),
                    0o11 => self.fpp.write_fps(fps | FPS_FD),
                    0o12 => self.fpp.write_fps(fps | FPS_FL),
                    _ => return Err(FppException::IllegalOpcode.into()),
                }
                Ok(())
            }
            1 => {
                let src = self.integer_location(spec, false, AccessIntent::READ_WORD)?;
                let value = self.read_integer(src, false)?;
                self.fpp.write_fps(value as u16);
                Ok(())
            }
            2 => {
                let dst = self.integer_location(spec, false, AccessIntent::WRITE_WORD)?;
                self.write_integer(dst, i32::from(self.fpp.fps()), false)
            }
            _ => {
                // STST stores FEC, then FEA when the destination is memory.
                let status = (i32::from(self.fpp.fec()) << 16) | i32::from(self.fpp.fea());
                let dst = self.integer_location(spec, true, AccessIntent::WRITE_WORD)?;
                match dst {
                    IntegerLocation::Register(reg) => {
                        self.regs.set(reg, self.fpp.fec());
                        Ok(())
                    }
                    IntegerLocation::Memory { .. } => self.write_integer(dst, status, true),
                }
            }
        }
    }

    /// AC <- AC op src for the binary arithmetic operations.
    fn float_arithmetic(
        &mut self,
        ac: usize,
        spec: Specifier,
        op: impl Fn(Unpacked, Unpacked, Precision, bool) -> Result<Unpacked, FppException>,
    ) -> FppResult<()> {
        let precision = self.fpp.precision();
        let src = self.load_float(spec, precision)?;
        let src = float::unpack(&src, precision);
        let acc = float::unpack(&self.fpp.ac(ac), precision);
        let truncate = self.fpp.fps() & FPS_FT != 0;
        let result = op(acc, src, precision, truncate)?;
        self.store_accumulator(ac, pack(result, precision, self.fpp.fps()))
    }

    /// MODF: the integer part goes to AC|1 when AC is even, the fraction to AC.
    fn execute_modf(&mut self, ac: usize, spec: Specifier) -> FppResult<()> {
        let precision = self.fpp.precision();
        let fps = self.fpp.fps();
        let src = self.load_float(spec, precision)?;
        let src = float::unpack(&src, precision);
        let acc = float::unpack(&self.fpp.ac(ac), precision);
        let (integer, fraction) = arith::modf(acc, src, precision, fps & FPS_FT != 0);

        let integer = pack(integer, precision, fps);
        if ac & 1 == 0 {
            self.fpp.set_ac(ac | 1, integer.words, precision);
        }
        let fraction = pack(fraction, precision, fps);
        self.fpp.set_ac(ac, fraction.words, precision);
        let overflow = integer.exception == Some(FppException::Overflow);
        self.fpp.set_value_codes(&fraction.words, overflow);
        match integer.exception.or(fraction.exception) {
            Some(exception) => Err(exception.into()),
            None => Ok(()),
        }
    }

    /// STCFI, STCFL, STCDI, STCDL: truncate AC to an integer.
    fn execute_store_integer(&mut self, ac: usize, spec: Specifier) -> FppResult<()> {
        let long = self.fpp.long_integers();
        let value = float::unpack(&self.fpp.ac(ac), self.fpp.precision());
        let converted = convert::to_integer(value, long);
        let dst = self.integer_location(spec, long, AccessIntent::WRITE_WORD)?;
        let result = converted.unwrap_or(0);
        self.write_integer(dst, result, long)?;
        self.fpp
            .set_condition_codes(integer_codes(result, long, converted.is_err()));
        self.copy_condition_codes();
        converted.map(|_| ()).map_err(Abort::from)
    }

    /// Copies the FPS condition codes to the processor condition codes.
    fn copy_condition_codes(&mut self) {
        let cc = self.fpp.fps() & FPS_CC;
        self.commit_flags(FlagsUpdate::from_bits(PSW_FLAGS, cc));
    }

    fn store_accumulator(&mut self, ac: usize, packed: Packed) -> FppResult<()> {
        self.fpp.set_ac(ac, packed.words, self.fpp.precision());
        self.finish_store(&packed)
    }

    fn finish_store(&mut self, packed: &Packed) -> FppResult<()> {
        let overflow = packed.exception == Some(FppException::Overflow);
        self.fpp.set_value_codes(&packed.words, overflow);
        match packed.exception {
            Some(exception) => Err(exception.into()),
            None => Ok(()),
        }
    }

    fn check_undefined(&self, words: &[u16; 4]) -> FppResult<()> {
        if self.fpp.fps() & FPS_FIUV != 0 && is_undefined(words) {
            return Err(FppException::UndefinedVariable.into());
        }
        Ok(())
    }

    fn float_location(
        &mut self,
        spec: Specifier,
        precision: Precision,
        intent: AccessIntent,
    ) -> FppResult<Location> {
        if spec.is_register() {
            let index = spec.reg();
            if index >= ACCUMULATORS {
                return Err(FppException::IllegalOpcode.into());
            }
            return Ok(Location::Accumulator(index));
        }
        let words = if is_immediate(spec) {
            1
        } else {
            precision.words()
        };
        let length = (precision.words() * 2) as u8;
        let va = self.resolve(spec, intent.with_length(length))?;
        Ok(Location::Memory { va, words })
    }

    fn read_float(&mut self, location: Location) -> FppResult<[u16; 4]> {
        match location {
            Location::Accumulator(index) => Ok(self.fpp.ac(index)),
            Location::Memory { va, words } => {
                let mut value = [0; 4];
                for (i, slot) in value.iter_mut().take(words).enumerate() {
                    *slot = self.read_word(va.wrapping_add(2 * i as u16))?;
                }
                Ok(value)
            }
        }
    }

    fn write_float(
        &mut self,
        location: Location,
        value: [u16; 4],
        precision: Precision,
    ) -> FppResult<()> {
        match location {
            Location::Accumulator(index) => self.fpp.set_ac(index, value, precision),
            Location::Memory { va, words } => {
                for (i, &word) in value.iter().take(words).enumerate() {
                    self.write_word(va.wrapping_add(2 * i as u16), word)?;
                }
            }
        }
        Ok(())
    }

    /// Reads a floating source operand, trapping on the undefined variable
    /// when FIUV is set.
    fn load_float(&mut self, spec: Specifier, precision: Precision) -> FppResult<[u16; 4]> {
        let src = self.float_location(spec, precision, AccessIntent::READ_WORD)?;
        let value = self.read_float(src)?;
        self.check_undefined(&value)?;
        Ok(value)
    }

    fn integer_location(
        &mut self,
        spec: Specifier,
        long: bool,
        intent: AccessIntent,
    ) -> FppResult<IntegerLocation> {
        if spec.is_register() {
            return Ok(IntegerLocation::Register(spec.reg()));
        }
        let words = if long && !is_immediate(spec) { 2 } else { 1 };
        let va = self.resolve(spec, intent.with_length(if long { 4 } else { 2 }))?;
        Ok(IntegerLocation::Memory { va, words })
    }

    /// Reads an integer operand. A long operand held in a register or an
    /// immediate word supplies the high half; the low half is zero.
    fn read_integer(&mut self, location: IntegerLocation, long: bool) -> FppResult<i32> {
        let (high, low) = match location {
            IntegerLocation::Register(reg) => (self.regs.get(reg), None),
            IntegerLocation::Memory { va, words } => {
                let high = self.read_word(va)?;
                let low = if words == 2 {
                    Some(self.read_word(va.wrapping_add(2))?)
                } else {
                    None
                };
                (high, low)
            }
        };
        if !long {
            return Ok(i32::from(high as i16));
        }
        Ok(((u32::from(high) << 16) | u32::from(low.unwrap_or(0))) as i32)
    }

    /// Writes an integer result. Long results written to a register or an
    /// immediate word keep only the high half.
    fn write_integer(&mut self, location: IntegerLocation, value: i32, long: bool) -> FppResult<()> {
        let high = if long { (value >> 16) as u16 } else { value as u16 };
        match location {
            IntegerLocation::Register(reg) => self.regs.set(reg, high),
            IntegerLocation::Memory { va, words } => {
                self.write_word(va, high)?;
                if words == 2 {
                    self.write_word(va.wrapping_add(2), value as u16)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::execute::tests::cpu_with;
    use crate::fpp::{FPS_C, FPS_FD, FPS_FER, FPS_N, FPS_Z};
    use crate::state::{PSW_C, PSW_N, PSW_Z};
    use crate::trap::DeferredTrap;
    use crate::StepOutcome;

    const LDF_IMMEDIATE: u16 = 0o172427;
    const ONE: u16 = 0o040200;

    fn run(program: &[u16], steps: usize) -> crate::Cpu {
        let mut cpu = cpu_with(program);
        for _ in 0..steps {
            assert_eq!(cpu.step(), StepOutcome::Retired);
        }
        cpu
    }

    #[test]
    fn load_and_add_immediates() {
        let cpu = run(&[LDF_IMMEDIATE, ONE, 0o172027, 0o040400], 2);
        assert_eq!(cpu.fpp.ac(0), [0o040500, 0, 0, 0]);
        assert_eq!(cpu.fpp.fps() & 0o17, 0);
    }

    #[test]
    fn divide_by_zero_keeps_accumulator_and_defers_trap() {
        let cpu = run(&[LDF_IMMEDIATE, ONE, 0o174427, 0], 2);
        assert_eq!(cpu.fpp.ac(0), [ONE, 0, 0, 0]);
        assert_eq!((cpu.fpp.fec(), cpu.fpp.fea()), (4, 0o1004));
        assert_ne!(cpu.fpp.fps() & FPS_FER, 0);
        assert!(cpu.traps.pending().contains(DeferredTrap::FloatingPoint));
    }

    #[test]
    fn deferred_floating_trap_enters_vector_244() {
        let mut cpu = run(&[LDF_IMMEDIATE, ONE, 0o174427, 0], 2);
        cpu.memory.write_word(0o244, 0o3200);
        cpu.memory.write_word(0o246, 0o340);
        cpu.step();
        assert_eq!(cpu.regs.pc(), 0o3202);
        assert_eq!(cpu.memory.read_word(0o774), 0o1006);
    }

    #[test]
    fn store_integer_out_of_range_stores_zero_and_sets_carry() {
        let mut cpu = cpu_with(&[LDF_IMMEDIATE, 0o044000, 0o175401]);
        cpu.regs.set(1, 0o7777);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.regs.get(1), 0);
        assert_eq!(cpu.fpp.fps() & 0o17, FPS_Z | FPS_C);
        assert_eq!(cpu.regs.flags(), PSW_Z | PSW_C);
        assert_eq!(cpu.fpp.fec(), 6);
        assert!(cpu.traps.pending().is_empty());
    }

    #[test]
    fn compare_then_copy_condition_codes() {
        let cpu = run(&[LDF_IMMEDIATE, ONE, 0o173427, 0o040000, 0o170000], 3);
        assert_eq!(cpu.fpp.fps() & 0o17, FPS_N);
        assert_eq!(cpu.regs.flags(), PSW_N);
    }

    #[test]
    fn accumulators_above_five_are_opcode_errors() {
        let cpu = run(&[0o172406], 1);
        assert_eq!(cpu.fpp.fec(), 2);
        assert!(cpu.traps.pending().contains(DeferredTrap::FloatingPoint));
    }

    #[test]
    fn double_precision_integer_round_trip_through_memory() {
        let mut cpu = cpu_with(&[0o170011, 0o177001, 0o175402, 0o174037, 0o4000]);
        cpu.regs.set(1, 5);
        for _ in 0..4 {
            cpu.step();
        }
        assert_eq!(cpu.fpp.ac(0), [0o040640, 0, 0, 0]);
        assert_eq!(cpu.regs.get(2), 5);
        assert_eq!(cpu.regs.flags(), 0);
        let stored: Vec<u16> = (0..4).map(|i| cpu.memory.read_word(0o4000 + 2 * i)).collect();
        assert_eq!(stored, [0o040640, 0, 0, 0]);
    }

    #[test]
    fn status_word_loads_and_stores() {
        let cpu = run(&[0o170127, FPS_FD, 0o170203], 2);
        assert_eq!(cpu.regs.get(3), FPS_FD);
    }

    #[test]
    fn undefined_variable_traps_when_enabled() {
        let cpu = run(&[0o170127, 0o004000, LDF_IMMEDIATE, 0o100000], 2);
        assert_eq!(cpu.fpp.fec(), 12);
        assert_eq!(cpu.fpp.ac(0), [0; 4]);
        assert!(cpu.traps.pending().contains(DeferredTrap::FloatingPoint));
    }

    #[test]
    fn negate_and_absolute_value_in_place() {
        let cpu = run(&[LDF_IMMEDIATE, ONE, 0o170700, 0o170600], 2);
        assert_eq!(cpu.fpp.ac(0)[0], 0o140200);
        assert_eq!(cpu.fpp.fps() & 0o17, FPS_N);
        let cpu = run(&[LDF_IMMEDIATE, ONE, 0o170700, 0o170600], 3);
        assert_eq!(cpu.fpp.ac(0)[0], ONE);
        assert_eq!(cpu.regs.flags() & PSW_C, 0);
    }
}
