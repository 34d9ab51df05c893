//! Host-facing configuration and outcome types for embedding the processor.

use std::time::Duration;

use thiserror::Error;

use crate::memory::MAX_MEMORY_BYTES;
use crate::Fault;

/// Default installed memory: everything below the Unibus window.
pub const DEFAULT_MEMORY_BYTES: u32 = MAX_MEMORY_BYTES;
/// Smallest memory the processor can boot with (seven 8 KiB pages).
pub const MIN_MEMORY_BYTES: u32 = 0o160000;
/// Memory sizes are whole 8 KiB pages.
pub const MEMORY_GRANULE_BYTES: u32 = 0o20000;
/// Default instructions executed per scheduler batch.
pub const DEFAULT_BATCH_INSTRUCTIONS: u32 = 20_000;
/// Default duration of the RESET run state in milliseconds.
pub const DEFAULT_RESET_MILLIS: u64 = 10;
/// Default boot address.
pub const DEFAULT_BOOT_ADDRESS: u16 = 0o1000;

/// Invalid configuration, device registration or boot image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Memory size is not a whole number of pages or is out of range.
    #[error("memory size {bytes:#o} must be a multiple of 8 KiB between 56 KiB and 3.75 MiB")]
    MemorySize {
        /// Requested memory size in bytes.
        bytes: u32,
    },
    /// A batch must execute at least one instruction.
    #[error("batch size must be at least one instruction")]
    EmptyBatch,
    /// Boot address must be even.
    #[error("boot address {addr:#o} is odd")]
    OddBootAddress {
        /// Requested boot address.
        addr: u16,
    },
    /// Boot image does not fit in installed memory.
    #[error("image of {words} words at {base:#o} does not fit in memory")]
    ImageTooLarge {
        /// Physical load address.
        base: u32,
        /// Image length in words.
        words: usize,
    },
    /// Device range leaves the I/O page.
    #[error("device range {start:#o}..={end:#o} is outside the I/O page")]
    DeviceOutsideIoPage {
        /// First register address.
        start: u32,
        /// Last register address.
        end: u32,
    },
    /// Device range does not start on an 8-byte boundary.
    #[error("device range starting at {start:#o} is not 8-byte aligned")]
    DeviceMisaligned {
        /// First register address.
        start: u32,
    },
    /// Device range overlaps a registered device.
    #[error("device range {start:#o}..={end:#o} overlaps {existing}")]
    DeviceOverlap {
        /// First register address.
        start: u32,
        /// Last register address.
        end: u32,
        /// Name of the device already registered there.
        existing: String,
    },
}

/// Top-level configuration for a processor instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CoreConfig {
    /// Installed main memory in bytes.
    pub memory_bytes: u32,
    /// Instructions executed per scheduler batch in the RUN state.
    pub batch_instructions: u32,
    /// Time spent in the RESET run state after a RESET instruction, in milliseconds.
    pub reset_millis: u64,
    /// Initial console switch register value.
    pub switch_register: u16,
    /// Address the boot image is loaded at and started from.
    pub boot_address: u16,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            memory_bytes: DEFAULT_MEMORY_BYTES,
            batch_instructions: DEFAULT_BATCH_INSTRUCTIONS,
            reset_millis: DEFAULT_RESET_MILLIS,
            switch_register: 0,
            boot_address: DEFAULT_BOOT_ADDRESS,
        }
    }
}

impl CoreConfig {
    /// Duration of the RESET run state.
    #[must_use]
    pub const fn reset_duration(&self) -> Duration {
        Duration::from_millis(self.reset_millis)
    }

    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_bytes % MEMORY_GRANULE_BYTES != 0
            || self.memory_bytes < MIN_MEMORY_BYTES
            || self.memory_bytes > MAX_MEMORY_BYTES
        {
            return Err(ConfigError::MemorySize {
                bytes: self.memory_bytes,
            });
        }
        if self.batch_instructions == 0 {
            return Err(ConfigError::EmptyBatch);
        }
        if self.boot_address & 1 != 0 {
            return Err(ConfigError::OddBootAddress {
                addr: self.boot_address,
            });
        }
        Ok(())
    }
}

/// Status of one instruction-boundary step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// An instruction (or a trap/interrupt entry) completed.
    Retired,
    /// The instruction was aborted by a fault; the trap has been taken.
    Faulted(Fault),
    /// The processor is waiting for an interrupt.
    Waiting,
    /// The processor is halted.
    Halted,
    /// The processor is in the timed RESET state.
    Resetting,
}

/// Summary of one scheduler batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchOutcome {
    /// Instruction boundaries stepped during the batch.
    pub steps: u32,
    /// Faults taken during the batch.
    pub faults: u32,
    /// The driver may sleep until an interrupt or console request (WAIT/HALT).
    pub idle: bool,
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, DEFAULT_BATCH_INSTRUCTIONS, MIN_MEMORY_BYTES};
    use rstest::rstest;
    use std::time::Duration;

    #[test]
    fn default_core_config_is_valid() {
        let config = CoreConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.batch_instructions, DEFAULT_BATCH_INSTRUCTIONS);
        assert_eq!(config.reset_duration(), Duration::from_millis(10));
        assert_eq!(config.boot_address, 0o1000);
    }

    #[rstest]
    #[case(MIN_MEMORY_BYTES - 0o20000)]
    #[case(MIN_MEMORY_BYTES + 2)]
    #[case(0o17020000)]
    fn memory_size_outside_limits_is_rejected(#[case] bytes: u32) {
        let config = CoreConfig {
            memory_bytes: bytes,
            ..CoreConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MemorySize { bytes }));
    }

    #[test]
    fn zero_batch_and_odd_boot_are_rejected() {
        let empty = CoreConfig {
            batch_instructions: 0,
            ..CoreConfig::default()
        };
        assert_eq!(empty.validate(), Err(ConfigError::EmptyBatch));

        let odd = CoreConfig {
            boot_address: 0o1001,
            ..CoreConfig::default()
        };
        assert_eq!(
            odd.validate(),
            Err(ConfigError::OddBootAddress { addr: 0o1001 })
        );
    }
}
