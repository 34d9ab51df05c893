//! Floating-point processor: status, accumulators, arithmetic and the
//! instruction range 170000..177777.

pub mod arith;
pub mod convert;
pub mod float;
mod instructions;

use thiserror::Error;

pub use float::{Precision, Unpacked};

/// FPS: floating error.
pub const FPS_FER: u16 = 0o100000;
/// FPS: disable all floating interrupts.
pub const FPS_FID: u16 = 0o040000;
/// FPS: interrupt on undefined variable.
pub const FPS_FIUV: u16 = 0o004000;
/// FPS: interrupt on underflow.
pub const FPS_FIU: u16 = 0o002000;
/// FPS: interrupt on overflow.
pub const FPS_FIV: u16 = 0o001000;
/// FPS: interrupt on integer conversion error.
pub const FPS_FIC: u16 = 0o000400;
/// FPS: double precision mode.
pub const FPS_FD: u16 = 0o000200;
/// FPS: long integer mode.
pub const FPS_FL: u16 = 0o000100;
/// FPS: truncate instead of rounding.
pub const FPS_FT: u16 = 0o000040;
/// FPS: maintenance mode.
pub const FPS_FMM: u16 = 0o000020;
/// FPS: negative.
pub const FPS_N: u16 = 0o000010;
/// FPS: zero.
pub const FPS_Z: u16 = 0o000004;
/// FPS: overflow.
pub const FPS_V: u16 = 0o000002;
/// FPS: carry (integer conversion error).
pub const FPS_C: u16 = 0o000001;
/// FPS condition code bits.
pub const FPS_CC: u16 = 0o000017;
/// Bits LDFPS may load; bits 13 and 12 are unused.
pub const FPS_WRITABLE: u16 = 0o147777;

/// Number of accumulators.
pub const ACCUMULATORS: usize = 6;

/// Exceptions reported in the floating error code register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FppException {
    /// Unassigned opcode or an accumulator above AC5.
    #[error("floating opcode error")]
    IllegalOpcode,
    /// Division by zero.
    #[error("floating divide by zero")]
    DivideByZero,
    /// Float to integer conversion out of range.
    #[error("floating to integer conversion error")]
    IntegerConversion,
    /// Exponent above the representable range.
    #[error("floating overflow")]
    Overflow,
    /// Exponent below the representable range.
    #[error("floating underflow")]
    Underflow,
    /// Operand was the undefined variable (minus zero).
    #[error("floating undefined variable")]
    UndefinedVariable,
    /// Maintenance trap.
    #[error("floating maintenance trap")]
    Maintenance,
}

impl FppException {
    /// Value stored in the floating error code register.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::IllegalOpcode => 2,
            Self::DivideByZero => 4,
            Self::IntegerConversion => 6,
            Self::Overflow => 8,
            Self::Underflow => 10,
            Self::UndefinedVariable => 12,
            Self::Maintenance => 14,
        }
    }

    /// FPS bit that enables the trap, or `None` when it always traps.
    #[must_use]
    pub const fn enable_bit(self) -> Option<u16> {
        match self {
            Self::IntegerConversion => Some(FPS_FIC),
            Self::Overflow => Some(FPS_FIV),
            Self::Underflow => Some(FPS_FIU),
            Self::UndefinedVariable => Some(FPS_FIUV),
            Self::IllegalOpcode | Self::DivideByZero | Self::Maintenance => None,
        }
    }

    /// Returns `true` when `fps` lets this exception request a trap.
    #[must_use]
    pub const fn traps(self, fps: u16) -> bool {
        if fps & FPS_FID != 0 {
            return false;
        }
        match self.enable_bit() {
            Some(bit) => fps & bit != 0,
            None => true,
        }
    }
}

/// Floating-point processor state.
///
/// The accumulators survive a bus reset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Fpp {
    fps: u16,
    fec: u16,
    fea: u16,
    ac: [[u16; 4]; ACCUMULATORS],
}

impl Fpp {
    /// Floating status word.
    #[must_use]
    pub const fn fps(&self) -> u16 {
        self.fps
    }

    /// Replaces the status word; unused bits stay clear.
    pub fn write_fps(&mut self, value: u16) {
        self.fps = value & FPS_WRITABLE;
    }

    /// Floating error code of the last exception.
    #[must_use]
    pub const fn fec(&self) -> u16 {
        self.fec
    }

    /// Address of the instruction that raised the last exception.
    #[must_use]
    pub const fn fea(&self) -> u16 {
        self.fea
    }

    /// Precision the FD bit selects.
    #[must_use]
    pub const fn precision(&self) -> Precision {
        Precision::from_fps(self.fps)
    }

    /// Returns `true` in long integer mode.
    #[must_use]
    pub const fn long_integers(&self) -> bool {
        self.fps & FPS_FL != 0
    }

    /// Raw words of an accumulator.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`ACCUMULATORS`].
    #[must_use]
    pub const fn ac(&self, index: usize) -> [u16; 4] {
        self.ac[index]
    }

    /// Stores an accumulator in `precision`; a single precision value
    /// clears the low two words.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`ACCUMULATORS`].
    pub fn set_ac(&mut self, index: usize, words: [u16; 4], precision: Precision) {
        let mut words = words;
        if precision == Precision::Single {
            words[2] = 0;
            words[3] = 0;
        }
        self.ac[index] = words;
    }

    /// Replaces the condition codes.
    pub fn set_condition_codes(&mut self, cc: u16) {
        self.fps = (self.fps & !FPS_CC) | (cc & FPS_CC);
    }

    /// Condition codes describing a stored value: N and Z from the value,
    /// V when the store overflowed.
    pub fn set_value_codes(&mut self, words: &[u16; 4], overflow: bool) {
        let mut cc = 0;
        if words[0] & 0o077600 == 0 {
            cc |= FPS_Z;
        } else if words[0] & 0o100000 != 0 {
            cc |= FPS_N;
        }
        if overflow {
            cc |= FPS_V;
        }
        self.set_condition_codes(cc);
    }

    /// Records an exception raised by the instruction at `pc`.
    ///
    /// Returns `true` when the exception requests a floating-point trap.
    pub fn record(&mut self, exception: FppException, pc: u16) -> bool {
        self.fec = exception.code();
        self.fea = pc;
        let traps = exception.traps(self.fps);
        if traps {
            self.fps |= FPS_FER;
        }
        traps
    }
}

#[cfg(test)]
mod tests {
    use super::{Fpp, FppException, Precision, FPS_FER, FPS_FID, FPS_FIV, FPS_N, FPS_V, FPS_Z};
    use rstest::rstest;

    #[rstest]
    #[case::opcode(FppException::IllegalOpcode, 0, true)]
    #[case::divide(FppException::DivideByZero, 0, true)]
    #[case::overflow_masked(FppException::Overflow, 0, false)]
    #[case::overflow_enabled(FppException::Overflow, FPS_FIV, true)]
    #[case::all_disabled(FppException::DivideByZero, FPS_FID, false)]
    #[case::disabled_overrides_enable(FppException::Overflow, FPS_FID | FPS_FIV, false)]
    fn trap_enables(#[case] exception: FppException, #[case] fps: u16, #[case] traps: bool) {
        assert_eq!(exception.traps(fps), traps);
    }

    #[test]
    fn record_latches_code_and_address() {
        let mut fpp = Fpp::default();
        assert!(!fpp.record(FppException::Underflow, 0o1234));
        assert_eq!((fpp.fec(), fpp.fea()), (10, 0o1234));
        assert_eq!(fpp.fps() & FPS_FER, 0);
        assert!(fpp.record(FppException::DivideByZero, 0o2000));
        assert_eq!(fpp.fec(), 4);
        assert_ne!(fpp.fps() & FPS_FER, 0);
    }

    #[test]
    fn single_precision_store_clears_low_words() {
        let mut fpp = Fpp::default();
        fpp.set_ac(2, [1, 2, 3, 4], Precision::Double);
        fpp.set_ac(2, [5, 6, 7, 8], Precision::Single);
        assert_eq!(fpp.ac(2), [5, 6, 0, 0]);
    }

    #[test]
    fn value_codes_follow_sign_and_exponent() {
        let mut fpp = Fpp::default();
        fpp.set_value_codes(&[0o140200, 0, 0, 0], false);
        assert_eq!(fpp.fps() & 0o17, FPS_N);
        fpp.set_value_codes(&[0o100000, 0, 0, 0], true);
        assert_eq!(fpp.fps() & 0o17, FPS_Z | FPS_V);
    }

    #[test]
    fn unused_status_bits_are_not_writable() {
        let mut fpp = Fpp::default();
        fpp.write_fps(0o177777);
        assert_eq!(fpp.fps(), 0o147777);
    }
}
