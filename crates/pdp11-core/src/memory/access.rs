//! Access descriptors shared by the resolver, MMU and bus.

use crate::Fault;

/// Byte width of a word access.
pub const WORD_ACCESS_BYTES: u8 = 2;

/// How an operand is going to be touched.
///
/// `length` is the byte count of the operand (1, 2, 4 or 8); the autoincrement
/// step derives from it. Memory is always transferred a word or a byte at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessIntent {
    length: u8,
    read: bool,
    write: bool,
}

impl AccessIntent {
    /// Word read.
    pub const READ_WORD: Self = Self::new(2, true, false);
    /// Byte read.
    pub const READ_BYTE: Self = Self::new(1, true, false);
    /// Word write.
    pub const WRITE_WORD: Self = Self::new(2, false, true);
    /// Byte write.
    pub const WRITE_BYTE: Self = Self::new(1, false, true);
    /// Word read-modify-write.
    pub const MODIFY_WORD: Self = Self::new(2, true, true);
    /// Byte read-modify-write.
    pub const MODIFY_BYTE: Self = Self::new(1, true, true);

    /// Builds an intent from its parts.
    #[must_use]
    pub const fn new(length: u8, read: bool, write: bool) -> Self {
        Self {
            length,
            read,
            write,
        }
    }

    /// Intent for an integer operand of byte or word width.
    #[must_use]
    pub const fn operand(byte: bool, read: bool, write: bool) -> Self {
        Self::new(if byte { 1 } else { 2 }, read, write)
    }

    /// Operand length in bytes.
    #[must_use]
    pub const fn length(self) -> u8 {
        self.length
    }

    /// Returns `true` for single-byte operands.
    #[must_use]
    pub const fn is_byte(self) -> bool {
        self.length == 1
    }

    /// Returns `true` when the operand is read.
    #[must_use]
    pub const fn is_read(self) -> bool {
        self.read
    }

    /// Returns `true` when the operand is written.
    #[must_use]
    pub const fn is_write(self) -> bool {
        self.write
    }

    /// Same direction, different operand length.
    #[must_use]
    pub const fn with_length(self, length: u8) -> Self {
        Self { length, ..self }
    }
}

/// Instruction or data space selector for a virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Space {
    /// Instruction space.
    Instruction,
    /// Data space.
    Data,
}

/// A 16-bit virtual offset tagged with the space it is resolved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VirtualAddress {
    offset: u16,
    space: Space,
}

impl VirtualAddress {
    /// Instruction-space address.
    #[must_use]
    pub const fn instruction(offset: u16) -> Self {
        Self {
            offset,
            space: Space::Instruction,
        }
    }

    /// Data-space address.
    #[must_use]
    pub const fn data(offset: u16) -> Self {
        Self {
            offset,
            space: Space::Data,
        }
    }

    /// Address through register `reg`: the PC always lives in instruction space.
    #[must_use]
    pub const fn for_register(reg: usize, offset: u16) -> Self {
        if reg == crate::PC {
            Self::instruction(offset)
        } else {
            Self::data(offset)
        }
    }

    /// 16-bit offset.
    #[must_use]
    pub const fn offset(self) -> u16 {
        self.offset
    }

    /// Space tag.
    #[must_use]
    pub const fn space(self) -> Space {
        self.space
    }

    /// Returns `true` for data-space addresses.
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self.space, Space::Data)
    }

    /// The same space at `offset + delta`.
    #[must_use]
    pub const fn wrapping_add(self, delta: u16) -> Self {
        Self {
            offset: self.offset.wrapping_add(delta),
            space: self.space,
        }
    }
}

/// Validates alignment for a physical access of the given intent.
///
/// # Errors
///
/// Returns [`Fault::OddAddress`] when a word access targets an odd address.
pub const fn validate_word_alignment(addr: u32, intent: AccessIntent) -> Result<(), Fault> {
    if addr & 1 == 0 || intent.is_byte() {
        Ok(())
    } else {
        Err(Fault::OddAddress)
    }
}
