use thiserror::Error;

/// Bus error / odd address / non-existent memory / stack violations.
pub const VEC_BUS_ERROR: u16 = 0o004;
/// Reserved (illegal) instruction.
pub const VEC_RESERVED_INSTRUCTION: u16 = 0o010;
/// Breakpoint instruction and trace trap.
pub const VEC_BPT: u16 = 0o014;
/// IOT instruction.
pub const VEC_IOT: u16 = 0o020;
/// EMT instruction.
pub const VEC_EMT: u16 = 0o030;
/// TRAP instruction.
pub const VEC_TRAP: u16 = 0o034;
/// Program interrupt request (PIR) register.
pub const VEC_PIRQ: u16 = 0o240;
/// Floating-point exception.
pub const VEC_FPP: u16 = 0o244;
/// Memory management abort and soft trap.
pub const VEC_MMU: u16 = 0o250;

/// CPU error register: HALT executed outside kernel mode.
pub const CPU_ERROR_ILLEGAL_HALT: u16 = 0o200;
/// CPU error register: odd address.
pub const CPU_ERROR_ODD_ADDRESS: u16 = 0o100;
/// CPU error register: non-existent memory.
pub const CPU_ERROR_NON_EXISTENT_MEMORY: u16 = 0o040;
/// CPU error register: Unibus timeout.
pub const CPU_ERROR_UNIBUS_TIMEOUT: u16 = 0o020;
/// CPU error register: kernel stack yellow zone.
pub const CPU_ERROR_YELLOW_STACK: u16 = 0o010;
/// CPU error register: kernel stack red zone, also raised by a double trap.
pub const CPU_ERROR_RED_STACK: u16 = 0o004;

/// Broad fault categories used for logging and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Address translation or bus access failure.
    Address,
    /// Instruction decode or privilege failure.
    Instruction,
    /// Kernel stack limit violation.
    Stack,
    /// Trap dispatch could not complete normally.
    Dispatch,
}

/// Processor faults that abort the current instruction.
///
/// A function returning `Err(Fault)` has already handed the fault to the
/// trap coordinator; callers only unwind the rest of the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Fault {
    /// Word access to an odd address.
    #[error("odd address")]
    OddAddress,
    /// Physical address beyond installed memory and outside the Unibus window.
    #[error("non-existent memory")]
    NonExistentMemory,
    /// No device answered, or the Unibus map pointed at missing memory.
    #[error("bus timeout")]
    BusTimeout,
    /// Page access-control field marks the page non-resident.
    #[error("page not resident")]
    PageNotResident,
    /// Write to a read-only page.
    #[error("write to read-only page")]
    ReadOnlyAbort,
    /// Offset outside the page length for its expansion direction.
    #[error("page length violation")]
    PageLengthAbort,
    /// Reserved or unimplemented opcode.
    #[error("illegal instruction")]
    IllegalInstruction,
    /// Register mode used where a memory address is required.
    #[error("illegal addressing mode")]
    IllegalAddressingMode,
    /// HALT executed outside kernel mode.
    #[error("halt outside kernel mode")]
    IllegalHalt,
    /// Kernel stack pushed into the red zone.
    #[error("kernel stack red zone violation")]
    RedZone,
    /// A fault occurred while kernel mode was already servicing a fault.
    #[error("fault occurred while already servicing a fault")]
    DoubleTrap,
}

impl Fault {
    /// Trap vector the fault is serviced through.
    #[must_use]
    pub const fn vector(self) -> u16 {
        match self {
            Self::PageNotResident | Self::ReadOnlyAbort | Self::PageLengthAbort => VEC_MMU,
            Self::IllegalInstruction => VEC_RESERVED_INSTRUCTION,
            Self::OddAddress
            | Self::NonExistentMemory
            | Self::BusTimeout
            | Self::IllegalAddressingMode
            | Self::IllegalHalt
            | Self::RedZone
            | Self::DoubleTrap => VEC_BUS_ERROR,
        }
    }

    /// CPU error register bits latched when the fault is raised.
    #[must_use]
    pub const fn cpu_error_bits(self) -> u16 {
        match self {
            Self::OddAddress => CPU_ERROR_ODD_ADDRESS,
            Self::NonExistentMemory => CPU_ERROR_NON_EXISTENT_MEMORY,
            Self::BusTimeout => CPU_ERROR_UNIBUS_TIMEOUT,
            Self::IllegalHalt => CPU_ERROR_ILLEGAL_HALT,
            Self::RedZone | Self::DoubleTrap => CPU_ERROR_RED_STACK,
            Self::PageNotResident
            | Self::ReadOnlyAbort
            | Self::PageLengthAbort
            | Self::IllegalInstruction
            | Self::IllegalAddressingMode => 0,
        }
    }

    /// Returns the fault category.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::OddAddress
            | Self::NonExistentMemory
            | Self::BusTimeout
            | Self::PageNotResident
            | Self::ReadOnlyAbort
            | Self::PageLengthAbort => FaultClass::Address,
            Self::IllegalInstruction | Self::IllegalAddressingMode | Self::IllegalHalt => {
                FaultClass::Instruction
            }
            Self::RedZone => FaultClass::Stack,
            Self::DoubleTrap => FaultClass::Dispatch,
        }
    }
}

/// Result of any processor operation that can abort an instruction.
pub type CpuResult<T> = Result<T, Fault>;
