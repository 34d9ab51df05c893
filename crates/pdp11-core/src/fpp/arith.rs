//! Fraction arithmetic on unpacked values.
//!
//! Sums align the smaller operand at the stored precision and keep one guard
//! bit, the last bit shifted out. Products and quotients are formed exactly
//! in 128 bits. [`Unpacked::from_wide`] then normalises and rounds on the bit
//! below the kept precision.

use super::float::{Precision, Unpacked, EXPONENT_BIAS};
use super::FppException;

/// Sum of `a` and `b`.
#[must_use]
pub const fn add(a: Unpacked, b: Unpacked, precision: Precision, truncate: bool) -> Unpacked {
    if b.is_zero() {
        return a;
    }
    if a.is_zero() {
        return b;
    }
    let (large, small) = if a.exponent >= b.exponent { (a, b) } else { (b, a) };
    let delta = (large.exponent - small.exponent) as u32;
    let bits = precision.bits();

    // Fractions at the stored precision, one guard bit below the last kept
    // bit. Only the final bit shifted out of the smaller operand survives.
    let x = ((large.fraction >> (64 - bits)) as u128) << 1;
    let y = if delta > bits {
        0
    } else {
        (((small.fraction >> (64 - bits)) as u128) << 1) >> delta
    };

    let (negative, sum) = if large.negative == small.negative {
        (large.negative, x + y)
    } else if x >= y {
        (large.negative, x - y)
    } else {
        (small.negative, y - x)
    };
    if sum == 0 {
        return Unpacked::ZERO;
    }
    // Hidden bit of the larger operand at bit 126 leaves room for a carry.
    Unpacked::from_wide(
        negative,
        large.exponent + 1,
        sum << (126 - bits),
        precision,
        truncate,
    )
}

/// Difference `a - b`.
#[must_use]
pub const fn subtract(a: Unpacked, b: Unpacked, precision: Precision, truncate: bool) -> Unpacked {
    add(a, b.negated(), precision, truncate)
}

/// Product of `a` and `b`.
#[must_use]
pub const fn multiply(a: Unpacked, b: Unpacked, precision: Precision, truncate: bool) -> Unpacked {
    if a.is_zero() || b.is_zero() {
        return Unpacked::ZERO;
    }
    let product = (a.fraction as u128) * (b.fraction as u128);
    Unpacked::from_wide(
        a.negative != b.negative,
        a.exponent + b.exponent - EXPONENT_BIAS,
        product,
        precision,
        truncate,
    )
}

/// Quotient `a / b`.
///
/// # Errors
///
/// Returns [`FppException::DivideByZero`] when `b` is zero.
pub const fn divide(
    a: Unpacked,
    b: Unpacked,
    precision: Precision,
    truncate: bool,
) -> Result<Unpacked, FppException> {
    if b.is_zero() {
        return Err(FppException::DivideByZero);
    }
    if a.is_zero() {
        return Ok(Unpacked::ZERO);
    }
    // 64 quotient bits below the binary point of a/b; at least 63 of them
    // are significant, well past the 57 needed to round a double.
    let quotient = ((a.fraction as u128) << 64) / (b.fraction as u128);
    Ok(Unpacked::from_wide(
        a.negative != b.negative,
        a.exponent - b.exponent + EXPONENT_BIAS + 64,
        quotient,
        precision,
        truncate,
    ))
}

/// Product of `a` and `b` split into its integer and fractional parts.
///
/// The fraction is rounded to `precision`; the integer part is exact.
#[must_use]
pub const fn modf(
    a: Unpacked,
    b: Unpacked,
    precision: Precision,
    truncate: bool,
) -> (Unpacked, Unpacked) {
    if a.is_zero() || b.is_zero() {
        return (Unpacked::ZERO, Unpacked::ZERO);
    }
    let negative = a.negative != b.negative;
    let product = (a.fraction as u128) * (b.fraction as u128);
    let shift = product.leading_zeros();
    let wide = product << shift;
    let exponent = a.exponent + b.exponent - EXPONENT_BIAS - shift as i32;
    let integer_bits = exponent - EXPONENT_BIAS;

    if integer_bits <= 0 {
        let fraction = Unpacked::from_wide(negative, exponent, wide, precision, truncate);
        return (Unpacked::ZERO, fraction);
    }
    if integer_bits >= precision.bits() as i32 {
        let integer = Unpacked::from_wide(negative, exponent, wide, precision, true);
        return (integer, Unpacked::ZERO);
    }

    let kept = integer_bits as u32;
    let integer_mask = !(u128::MAX >> kept);
    let integer = Unpacked {
        negative,
        exponent,
        fraction: ((wide & integer_mask) >> 64) as u64,
    };
    let rest = wide << kept;
    let fraction = Unpacked::from_wide(negative, exponent - integer_bits, rest, precision, truncate);
    (integer, fraction)
}
