//! Architectural processor state primitives.

/// Register banks, stack pointers and PSW.
pub mod registers;
/// Run-state machine.
pub mod run_state;

pub use registers::{
    Mode, PswChange, RegisterFile, GENERAL_REGISTER_COUNT, PC, PSW_C, PSW_CURRENT_MODE,
    PSW_FLAGS, PSW_N, PSW_PREVIOUS_MODE, PSW_PRIORITY, PSW_REGISTER_SET, PSW_T, PSW_V, PSW_Z,
    SP,
};
pub use run_state::{RunRequest, RunState};
