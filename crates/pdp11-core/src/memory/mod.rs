//! Physical memory store and address-space layout.

/// Access intents, virtual addresses and alignment policy.
pub mod access;
/// Physical address-space layout and region decoder.
pub mod map;

pub use access::{
    validate_word_alignment, AccessIntent, Space, VirtualAddress, WORD_ACCESS_BYTES,
};
pub use map::{
    decode_physical_region, is_mmu_register, PhysicalRegion, IO_PAGE_18BIT, IO_PAGE_BASE,
    IO_PAGE_END, IO_PAGE_VIRTUAL, MAX_MEMORY_BYTES, MMR0_ADDRESS, MMU_REGISTERS_END,
    MMU_REGISTERS_START, PHYSICAL_MASK_18BIT, PHYSICAL_MASK_22BIT, UNIBUS_WINDOW_BASE,
};

/// Word-organised main memory.
///
/// Callers check addresses against [`PhysicalMemory::len_bytes`] before
/// accessing; out-of-range indices are treated as zero on read and ignored on
/// write so a bad caller cannot panic the emulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalMemory {
    words: Vec<u16>,
}

impl PhysicalMemory {
    /// Allocates `bytes` of zeroed memory (rounded down to a whole word).
    #[must_use]
    pub fn new(bytes: u32) -> Self {
        Self {
            words: vec![0; (bytes / 2) as usize],
        }
    }

    /// Installed size in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> u32 {
        u32::try_from(self.words.len() * 2).unwrap_or(u32::MAX)
    }

    /// Reads the word containing `addr`.
    #[must_use]
    pub fn read_word(&self, addr: u32) -> u16 {
        self.words.get((addr >> 1) as usize).copied().unwrap_or(0)
    }

    /// Writes the word containing `addr`.
    pub fn write_word(&mut self, addr: u32, value: u16) {
        if let Some(word) = self.words.get_mut((addr >> 1) as usize) {
            *word = value;
        }
    }

    /// Reads a byte; odd addresses select the high byte.
    #[must_use]
    pub fn read_byte(&self, addr: u32) -> u8 {
        let word = self.read_word(addr);
        if addr & 1 == 0 {
            (word & 0xff) as u8
        } else {
            (word >> 8) as u8
        }
    }

    /// Writes a byte, leaving the other half of the word intact.
    pub fn write_byte(&mut self, addr: u32, value: u8) {
        if let Some(word) = self.words.get_mut((addr >> 1) as usize) {
            *word = crate::bus::merge_byte(*word, addr, value);
        }
    }

    /// Copies `words` into memory starting at the even byte address `base`.
    ///
    /// Returns `false` without writing anything when the image does not fit.
    pub fn load_words(&mut self, base: u32, words: &[u16]) -> bool {
        let start = (base >> 1) as usize;
        let Some(end) = start.checked_add(words.len()) else {
            return false;
        };
        match self.words.get_mut(start..end) {
            Some(slot) => {
                slot.copy_from_slice(words);
                true
            }
            None => false,
        }
    }

    /// Zeroes every word.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }
}
