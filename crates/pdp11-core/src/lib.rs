//! Instruction-level PDP-11/70 processor core.

/// Physical memory store, address-space layout and access intents.
pub mod memory;
pub use memory::{
    AccessIntent, PhysicalMemory, PhysicalRegion, Space, VirtualAddress, IO_PAGE_BASE,
    IO_PAGE_END, MAX_MEMORY_BYTES, UNIBUS_WINDOW_BASE,
};

/// Peripheral bus contract and I/O page dispatcher.
pub mod bus;
pub use bus::{BusCycle, BusError, Device, DeviceId, Dispatcher, InterruptSignal};

/// Public host-facing configuration and outcome types.
pub mod api;
pub use api::{
    BatchOutcome, ConfigError, CoreConfig, StepOutcome, DEFAULT_BATCH_INSTRUCTIONS,
    DEFAULT_BOOT_ADDRESS, DEFAULT_MEMORY_BYTES, DEFAULT_RESET_MILLIS, MIN_MEMORY_BYTES,
};

/// Registers, PSW and run state.
pub mod state;
pub use state::{Mode, RegisterFile, RunRequest, RunState, PC, SP};

/// Opcode classification table.
pub mod encoding;
pub use encoding::{classify_opcode, Opcode};

/// Instruction decode and operand specifiers.
pub mod decoder;
pub use decoder::{AddressingMode, DecodedInstruction, Decoder, Specifier};

/// Processor fault taxonomy, trap vectors and CPU error bits.
pub mod fault;
pub use fault::{
    CpuResult, Fault, FaultClass, CPU_ERROR_ILLEGAL_HALT, CPU_ERROR_NON_EXISTENT_MEMORY,
    CPU_ERROR_ODD_ADDRESS, CPU_ERROR_RED_STACK, CPU_ERROR_UNIBUS_TIMEOUT,
    CPU_ERROR_YELLOW_STACK, VEC_BPT, VEC_BUS_ERROR, VEC_EMT, VEC_FPP, VEC_IOT, VEC_MMU,
    VEC_PIRQ, VEC_RESERVED_INSTRUCTION, VEC_TRAP,
};

/// Memory management unit.
pub mod mmu;
pub use mmu::Mmu;

/// Trap and interrupt coordination.
pub mod trap;
pub use trap::{DeferredTrap, DeferredTraps, TrapState};

/// Processor registers visible in the I/O page.
pub mod iopage;
pub use iopage::CpuRegister;

/// The processor context.
pub mod cpu;
pub use cpu::{Console, Cpu};

/// Addressing-mode resolution.
pub mod addressing;

/// Instruction execution pipeline.
pub mod execute;
pub use execute::{FlagsUpdate, Operand};

/// Floating-point processor.
pub mod fpp;
pub use fpp::{Fpp, FppException, Precision};

/// Batch scheduling for host driver loops.
pub mod scheduler;
pub use scheduler::Scheduler;

#[cfg(test)]
use proptest as _;
