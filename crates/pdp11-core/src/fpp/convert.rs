//! Integer, precision and exponent conversions.

use super::float::{
    exponent_field, fraction_bits, pack, round_to, unpack, Packed, Precision, Unpacked,
    EXPONENT_BIAS,
};
use super::FppException;

/// Converts a two's complement integer, normalising by leading-zero count.
///
/// Only a 32-bit integer converted to single precision can lose bits; they
/// are rounded unless `truncate` is set.
#[must_use]
pub const fn from_integer(value: i32, precision: Precision, truncate: bool) -> Unpacked {
    if value == 0 {
        return Unpacked::ZERO;
    }
    // An integer is a fraction whose binary point lies 128 bits to the
    // right of bit 127.
    Unpacked::from_wide(
        value < 0,
        2 * EXPONENT_BIAS,
        value.unsigned_abs() as u128,
        precision,
        truncate,
    )
}

/// Converts to a 16-bit (`long == false`) or 32-bit integer, truncating
/// toward zero.
///
/// # Errors
///
/// Returns [`FppException::IntegerConversion`] when the integer part does
/// not fit the destination width.
pub const fn to_integer(value: Unpacked, long: bool) -> Result<i32, FppException> {
    let integer_bits = value.exponent - EXPONENT_BIAS;
    if value.is_zero() || integer_bits <= 0 {
        return Ok(0);
    }
    let width = if long { 32 } else { 16 };
    if integer_bits > width {
        return Err(FppException::IntegerConversion);
    }
    let magnitude = value.fraction >> (64 - integer_bits);
    let limit = 1_u64 << (width - 1);
    if value.negative {
        if magnitude > limit {
            return Err(FppException::IntegerConversion);
        }
        Ok((magnitude as i64).wrapping_neg() as i32)
    } else {
        if magnitude >= limit {
            return Err(FppException::IntegerConversion);
        }
        Ok(magnitude as i32)
    }
}

/// Re-encodes `words` from `from` into the other precision.
///
/// Widening appends zero fraction bits; narrowing rounds as `fps` selects
/// and may overflow.
#[must_use]
pub const fn change_precision(words: &[u16; 4], from: Precision, fps: u16) -> Packed {
    let value = unpack(words, from);
    let to = from.other();
    let value = match to {
        Precision::Single => round_to(value, to, fps),
        Precision::Double => value,
    };
    pack(value, to, fps)
}

/// Replaces the exponent of `words` with the unbiased `exponent`.
///
/// The sign and fraction bits are kept even when the old exponent was zero.
#[must_use]
pub const fn load_exponent(
    words: &[u16; 4],
    exponent: i16,
    precision: Precision,
    fps: u16,
) -> Packed {
    let value = Unpacked {
        negative: words[0] & 0o100000 != 0,
        exponent: exponent as i32 + EXPONENT_BIAS,
        fraction: fraction_bits(words, precision),
    };
    pack(value, precision, fps)
}

/// Unbiased exponent of `words`; zero values report -128.
#[must_use]
pub const fn store_exponent(words: &[u16; 4]) -> i16 {
    (exponent_field(words) - EXPONENT_BIAS) as i16
}
