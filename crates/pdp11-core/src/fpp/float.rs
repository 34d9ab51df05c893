//! Storage format of floating values: pack, unpack, normalise and round.
//!
//! A value occupies two (single) or four (double) words. Word 0 holds the
//! sign in bit 15, the excess-128 exponent in bits 14..7 and the seven
//! fraction bits that follow the hidden leading one. An exponent field of
//! zero is an exact zero, or the undefined variable when the sign is set.
//!
//! Arithmetic works on [`Unpacked`] values whose fraction is left-aligned in
//! a `u64` (hidden bit at bit 63). Intermediate results are carried in a
//! `u128` and rounded on the bit below the kept precision.

use std::cmp::Ordering;

use super::{FppException, FPS_FD, FPS_FIU, FPS_FIV, FPS_FT};

/// Exponent bias of the storage format.
pub const EXPONENT_BIAS: i32 = 128;
/// Largest biased exponent that fits the 8-bit field.
pub const EXPONENT_MAX: i32 = 255;

const HIDDEN_BIT: u64 = 1 << 63;

/// Operand precision selected by the FD bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Precision {
    /// Two words, 24 significant bits.
    Single,
    /// Four words, 56 significant bits.
    Double,
}

impl Precision {
    /// Precision selected by a floating-point status word.
    #[must_use]
    pub const fn from_fps(fps: u16) -> Self {
        if fps & FPS_FD != 0 {
            Self::Double
        } else {
            Self::Single
        }
    }

    /// The other precision.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Single => Self::Double,
            Self::Double => Self::Single,
        }
    }

    /// Storage words.
    #[must_use]
    pub const fn words(self) -> usize {
        match self {
            Self::Single => 2,
            Self::Double => 4,
        }
    }

    /// Significant bits including the hidden bit.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Single => 24,
            Self::Double => 56,
        }
    }
}

/// Sign, biased exponent and left-aligned fraction of a floating value.
///
/// A zero fraction means exact zero regardless of the other fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Unpacked {
    /// Sign.
    pub negative: bool,
    /// Biased exponent; may leave `1..=255` before packing.
    pub exponent: i32,
    /// Fraction with the hidden bit at bit 63.
    pub fraction: u64,
}

impl Unpacked {
    /// Exact positive zero.
    pub const ZERO: Self = Self {
        negative: false,
        exponent: 0,
        fraction: 0,
    };

    /// Returns `true` for zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.fraction == 0
    }

    /// Same magnitude, opposite sign; zero stays positive.
    #[must_use]
    pub const fn negated(self) -> Self {
        if self.is_zero() {
            Self::ZERO
        } else {
            Self {
                negative: !self.negative,
                ..self
            }
        }
    }

    /// Normalises and rounds a wide fraction.
    ///
    /// `exponent` is the biased exponent the value would have if the leading
    /// one of `wide` were at bit 127. Rounding adds one at the bit below the
    /// kept precision unless `truncate` is set; a carry out renormalises.
    #[must_use]
    pub const fn from_wide(
        negative: bool,
        exponent: i32,
        wide: u128,
        precision: Precision,
        truncate: bool,
    ) -> Self {
        if wide == 0 {
            return Self::ZERO;
        }
        let shift = wide.leading_zeros();
        let mut wide = wide << shift;
        let mut exponent = exponent - shift as i32;
        let bits = precision.bits();
        if !truncate {
            let (sum, carry) = wide.overflowing_add(1 << (127 - bits));
            if carry {
                wide = 1 << 127;
                exponent += 1;
            } else {
                wide = sum;
            }
        }
        wide &= !((1 << (128 - bits)) - 1);
        Self {
            negative,
            exponent,
            fraction: (wide >> 64) as u64,
        }
    }

    /// Fraction widened with the hidden bit at bit 127.
    #[must_use]
    pub const fn wide(self) -> u128 {
        (self.fraction as u128) << 64
    }
}

/// Result of packing: the storage words and any range exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packed {
    /// Storage words; unused low words are zero.
    pub words: [u16; 4],
    /// Overflow or underflow raised while packing.
    pub exception: Option<FppException>,
}

/// Returns `true` for the undefined variable (sign set, exponent zero).
#[must_use]
pub const fn is_undefined(words: &[u16; 4]) -> bool {
    words[0] & 0o177600 == 0o100000
}

/// Exponent field of word 0, still biased.
#[must_use]
pub const fn exponent_field(words: &[u16; 4]) -> i32 {
    ((words[0] >> 7) & 0o377) as i32
}

/// Fraction bits with the hidden bit restored, whatever the exponent.
#[must_use]
pub const fn fraction_bits(words: &[u16; 4], precision: Precision) -> u64 {
    let mut fraction = ((((words[0] & 0o177) | 0o200) as u64) << 56) | ((words[1] as u64) << 40);
    if matches!(precision, Precision::Double) {
        fraction |= ((words[2] as u64) << 24) | ((words[3] as u64) << 8);
    }
    fraction
}

/// Splits storage words into sign, exponent and fraction.
#[must_use]
pub const fn unpack(words: &[u16; 4], precision: Precision) -> Unpacked {
    let exponent = exponent_field(words);
    if exponent == 0 {
        return Unpacked::ZERO;
    }
    Unpacked {
        negative: words[0] & 0o100000 != 0,
        exponent,
        fraction: fraction_bits(words, precision),
    }
}

/// Joins sign, exponent and fraction into storage words.
///
/// An exponent outside `1..=255` raises underflow or overflow. When the
/// matching trap is enabled the exponent is stored modulo 256; otherwise
/// the result is exact zero.
#[must_use]
pub const fn pack(value: Unpacked, precision: Precision, fps: u16) -> Packed {
    if value.is_zero() {
        return Packed {
            words: [0; 4],
            exception: None,
        };
    }
    let exception = if value.exponent <= 0 {
        Some(FppException::Underflow)
    } else if value.exponent > EXPONENT_MAX {
        Some(FppException::Overflow)
    } else {
        None
    };
    let trapping = match exception {
        Some(FppException::Underflow) => fps & FPS_FIU != 0,
        Some(_) => fps & FPS_FIV != 0,
        None => true,
    };
    if !trapping {
        return Packed {
            words: [0; 4],
            exception,
        };
    }

    let sign = if value.negative { 0o100000 } else { 0 };
    let exponent = (value.exponent & 0o377) as u16;
    let fraction = value.fraction & !HIDDEN_BIT;
    let mut words = [
        sign | (exponent << 7) | ((fraction >> 56) as u16 & 0o177),
        (fraction >> 40) as u16,
        0,
        0,
    ];
    if matches!(precision, Precision::Double) {
        words[2] = (fraction >> 24) as u16;
        words[3] = (fraction >> 8) as u16;
    }
    Packed { words, exception }
}

/// Rounds or truncates a value to `precision`, as the FT bit selects.
#[must_use]
pub const fn round_to(value: Unpacked, precision: Precision, fps: u16) -> Unpacked {
    Unpacked::from_wide(
        value.negative,
        value.exponent,
        value.wide(),
        precision,
        fps & FPS_FT != 0,
    )
}

/// Orders two values numerically; both zeros compare equal.
#[must_use]
pub fn compare(a: Unpacked, b: Unpacked) -> Ordering {
    match (a.is_zero(), b.is_zero()) {
        (true, true) => return Ordering::Equal,
        (true, false) => {
            return if b.negative {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, true) => {
            return if a.negative {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, false) => {}
    }
    if a.negative != b.negative {
        return if a.negative {
            Ordering::Less
        } else {
            Ordering::Greater
        };
    }
    let magnitude = a
        .exponent
        .cmp(&b.exponent)
        .then(a.fraction.cmp(&b.fraction));
    if a.negative {
        magnitude.reverse()
    } else {
        magnitude
    }
}
