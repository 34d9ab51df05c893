//! Instruction decoder: a precomputed opcode lookup plus field extraction.

use std::fmt;

use crate::encoding::{classify_opcode, Opcode};

/// The eight operand addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum AddressingMode {
    Register,
    RegisterDeferred,
    Autoincrement,
    AutoincrementDeferred,
    Autodecrement,
    AutodecrementDeferred,
    Index,
    IndexDeferred,
}

impl AddressingMode {
    /// Converts a 3-bit mode field.
    #[must_use]
    pub const fn from_u3(value: u16) -> Self {
        match value & 7 {
            0 => Self::Register,
            1 => Self::RegisterDeferred,
            2 => Self::Autoincrement,
            3 => Self::AutoincrementDeferred,
            4 => Self::Autodecrement,
            5 => Self::AutodecrementDeferred,
            6 => Self::Index,
            _ => Self::IndexDeferred,
        }
    }
}

/// A 6-bit operand specifier: mode in bits 5..3, register in bits 2..0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Specifier(u16);

impl Specifier {
    /// Wraps the low six bits of `bits`.
    #[must_use]
    pub const fn new(bits: u16) -> Self {
        Self(bits & 0o77)
    }

    /// Addressing mode.
    #[must_use]
    pub const fn mode(self) -> AddressingMode {
        AddressingMode::from_u3(self.0 >> 3)
    }

    /// Register number.
    #[must_use]
    pub const fn reg(self) -> usize {
        (self.0 & 7) as usize
    }

    /// Returns `true` for register mode (no memory address).
    #[must_use]
    pub const fn is_register(self) -> bool {
        self.0 >> 3 == 0
    }

    /// Raw six bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }
}

/// A decoded instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodedInstruction {
    /// Operation.
    pub opcode: Opcode,
    /// Raw instruction word.
    pub word: u16,
}

impl DecodedInstruction {
    /// Byte variant (bit 15 on an instruction with a byte form).
    #[must_use]
    pub const fn is_byte(self) -> bool {
        self.opcode.has_byte_form() && self.word & 0o100000 != 0
    }

    /// Source specifier (bits 11..6).
    #[must_use]
    pub const fn src(self) -> Specifier {
        Specifier::new(self.word >> 6)
    }

    /// Destination specifier (bits 5..0).
    #[must_use]
    pub const fn dst(self) -> Specifier {
        Specifier::new(self.word)
    }

    /// Register field of JSR, XOR, SOB and the EIS group (bits 8..6).
    #[must_use]
    pub const fn reg(self) -> usize {
        ((self.word >> 6) & 7) as usize
    }

    /// Low register field (RTS, bits 2..0).
    #[must_use]
    pub const fn low_reg(self) -> usize {
        (self.word & 7) as usize
    }

    /// Signed branch displacement in bytes.
    #[must_use]
    pub const fn branch_offset(self) -> u16 {
        (((self.word & 0o377) as u8 as i8 as i16) << 1) as u16
    }
}

impl fmt::Display for DecodedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:06o}", self.opcode, self.word)
    }
}

/// Decoder backed by a 64K-entry opcode table built once from [`crate::encoding::OPCODE_TABLE`].
#[derive(Clone)]
pub struct Decoder {
    table: Box<[Opcode]>,
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder").finish_non_exhaustive()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Builds the lookup table.
    #[must_use]
    pub fn new() -> Self {
        let table = (0..=u16::MAX).map(classify_opcode).collect();
        Self { table }
    }

    /// Decodes one instruction word.
    #[must_use]
    pub fn decode(&self, word: u16) -> DecodedInstruction {
        DecodedInstruction {
            opcode: self.table[usize::from(word)],
            word,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AddressingMode, Decoder, Specifier};
    use crate::encoding::{classify_opcode, Opcode};

    #[test]
    fn lookup_table_agrees_with_priority_scan() {
        let decoder = Decoder::new();
        for word in (0..=u16::MAX).step_by(7) {
            assert_eq!(decoder.decode(word).opcode, classify_opcode(word));
        }
    }

    #[test]
    fn fields_extract_from_double_operand_word() {
        let decoded = Decoder::new().decode(0o112704);
        assert_eq!(decoded.opcode, Opcode::Mov);
        assert!(decoded.is_byte());
        assert_eq!(decoded.src().mode(), AddressingMode::Autoincrement);
        assert_eq!(decoded.src().reg(), 7);
        assert!(decoded.dst().is_register());
        assert_eq!(decoded.dst().reg(), 4);
    }

    #[test]
    fn branch_offsets_sign_extend_and_double() {
        let decoder = Decoder::new();
        assert_eq!(decoder.decode(0o000401).branch_offset(), 2);
        assert_eq!(decoder.decode(0o000777).branch_offset(), 0o177776);
        assert_eq!(decoder.decode(0o001200).branch_offset(), 0o177400);
    }

    #[test]
    fn specifier_modes_cover_all_encodings() {
        assert_eq!(Specifier::new(0o27).mode(), AddressingMode::Autoincrement);
        assert_eq!(Specifier::new(0o77).mode(), AddressingMode::IndexDeferred);
        assert_eq!(Specifier::new(0o177).bits(), 0o77);
    }

    #[test]
    fn word_only_instructions_never_report_bytes() {
        let decoder = Decoder::new();
        assert!(!decoder.decode(0o160102).is_byte());
        assert!(!decoder.decode(0o106500).is_byte());
        assert!(decoder.decode(0o105000).is_byte());
    }
}
