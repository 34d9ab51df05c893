//! Condition-code updates produced by integer instructions.

use crate::state::{PSW_C, PSW_FLAGS, PSW_N, PSW_V, PSW_Z};

/// Describes how N, Z, V and C change after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagsUpdate {
    mask: u16,
    value: u16,
}

impl FlagsUpdate {
    /// No change.
    pub const NONE: Self = Self { mask: 0, value: 0 };

    /// Replaces the flags in `mask` with the matching bits of `value`.
    #[must_use]
    pub const fn from_bits(mask: u16, value: u16) -> Self {
        Self {
            mask: mask & PSW_FLAGS,
            value: value & mask & PSW_FLAGS,
        }
    }

    /// Sets all four flags: N and Z from `result`, V and C as given.
    #[must_use]
    pub const fn nzvc(result: u16, byte: bool, overflow: bool, carry: bool) -> Self {
        let value = nz_bits(result, byte) | bit(overflow, PSW_V) | bit(carry, PSW_C);
        Self::from_bits(PSW_FLAGS, value)
    }

    /// Sets N, Z and V, leaving C alone.
    #[must_use]
    pub const fn nzv(result: u16, byte: bool, overflow: bool) -> Self {
        let value = nz_bits(result, byte) | bit(overflow, PSW_V);
        Self::from_bits(PSW_N | PSW_Z | PSW_V, value)
    }

    /// Flags selected by this update.
    #[must_use]
    pub const fn mask(self) -> u16 {
        self.mask
    }

    /// New values of the selected flags.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.value
    }
}

/// Sign bit for the operand width.
#[must_use]
pub const fn sign_bit(byte: bool) -> u16 {
    if byte {
        0x80
    } else {
        0x8000
    }
}

/// Value mask for the operand width.
#[must_use]
pub const fn width_mask(byte: bool) -> u16 {
    if byte {
        0xff
    } else {
        0xffff
    }
}

const fn nz_bits(result: u16, byte: bool) -> u16 {
    let result = result & width_mask(byte);
    bit(result & sign_bit(byte) != 0, PSW_N) | bit(result == 0, PSW_Z)
}

const fn bit(set: bool, flag: u16) -> u16 {
    if set {
        flag
    } else {
        0
    }
}
