//! Physical address-space layout and region decoding.

/// First virtual address that maps to the I/O page when relocation is off.
pub const IO_PAGE_VIRTUAL: u16 = 0o160000;
/// First I/O page address in an 18-bit physical space.
pub const IO_PAGE_18BIT: u32 = 0o760000;
/// First I/O page address in the 22-bit physical space.
pub const IO_PAGE_BASE: u32 = 0o17760000;
/// Last I/O page address in the 22-bit physical space.
pub const IO_PAGE_END: u32 = 0o17777777;
/// Start of the Unibus window just below the I/O page.
pub const UNIBUS_WINDOW_BASE: u32 = 0o17000000;
/// Mask of a 22-bit physical address.
pub const PHYSICAL_MASK_22BIT: u32 = 0o17777777;
/// Mask of an 18-bit physical address.
pub const PHYSICAL_MASK_18BIT: u32 = 0o777777;
/// Largest supported memory size (everything below the Unibus window).
pub const MAX_MEMORY_BYTES: u32 = UNIBUS_WINDOW_BASE;
/// Physical address of MMR0, excluded from last-page bookkeeping.
pub const MMR0_ADDRESS: u32 = 0o17777572;
/// First address of the memory-management register block.
pub const MMU_REGISTERS_START: u32 = 0o17772200;
/// Last address of the memory-management register block.
pub const MMU_REGISTERS_END: u32 = 0o17777677;

/// Region classification for a 22-bit physical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalRegion {
    /// Installed main memory.
    Memory,
    /// Above installed memory and below the Unibus window.
    NonExistent,
    /// Unibus window below the I/O page.
    UnibusWindow,
    /// Device and CPU registers.
    IoPage,
}

/// Decodes a physical address against the installed memory size.
#[must_use]
pub const fn decode_physical_region(addr: u32, memory_bytes: u32) -> PhysicalRegion {
    if addr < memory_bytes {
        PhysicalRegion::Memory
    } else if addr >= IO_PAGE_BASE {
        PhysicalRegion::IoPage
    } else if addr >= UNIBUS_WINDOW_BASE {
        PhysicalRegion::UnibusWindow
    } else {
        PhysicalRegion::NonExistent
    }
}

/// Returns `true` when `addr` lies in the memory-management register block.
#[must_use]
pub const fn is_mmu_register(addr: u32) -> bool {
    addr >= MMU_REGISTERS_START && addr <= MMU_REGISTERS_END
}

#[cfg(test)]
mod tests {
    use super::{
        decode_physical_region, is_mmu_register, PhysicalRegion, IO_PAGE_BASE, IO_PAGE_END,
        MMR0_ADDRESS, UNIBUS_WINDOW_BASE,
    };

    const MEMORY: u32 = 0o1000000;

    #[test]
    fn region_decode_is_correct_at_boundaries() {
        assert_eq!(decode_physical_region(0, MEMORY), PhysicalRegion::Memory);
        assert_eq!(
            decode_physical_region(MEMORY - 1, MEMORY),
            PhysicalRegion::Memory
        );
        assert_eq!(
            decode_physical_region(MEMORY, MEMORY),
            PhysicalRegion::NonExistent
        );
        assert_eq!(
            decode_physical_region(UNIBUS_WINDOW_BASE, MEMORY),
            PhysicalRegion::UnibusWindow
        );
        assert_eq!(
            decode_physical_region(IO_PAGE_BASE - 1, MEMORY),
            PhysicalRegion::UnibusWindow
        );
        assert_eq!(
            decode_physical_region(IO_PAGE_BASE, MEMORY),
            PhysicalRegion::IoPage
        );
        assert_eq!(
            decode_physical_region(IO_PAGE_END, MEMORY),
            PhysicalRegion::IoPage
        );
    }

    #[test]
    fn full_memory_leaves_no_non_existent_gap() {
        assert_eq!(
            decode_physical_region(UNIBUS_WINDOW_BASE - 2, UNIBUS_WINDOW_BASE),
            PhysicalRegion::Memory
        );
    }

    #[test]
    fn mmr0_sits_inside_the_mmu_register_block() {
        assert!(is_mmu_register(MMR0_ADDRESS));
        assert!(!is_mmu_register(IO_PAGE_END - 1));
    }
}
