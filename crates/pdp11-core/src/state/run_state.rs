/// Run state of the processor, driven by instruction semantics and console requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Executing continuously.
    Run,
    /// Execute exactly one instruction, then halt.
    Step,
    /// Transient state after a RESET instruction.
    Reset,
    /// Idle until an interrupt is accepted.
    Wait,
    /// Stopped until resumed from the console.
    #[default]
    Halt,
}

impl RunState {
    /// Returns `true` when instructions can be fetched in this state.
    #[must_use]
    pub const fn is_executing(self) -> bool {
        matches!(self, Self::Run | Self::Step)
    }

    /// Returns `true` when the host driver may suspend batch execution.
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Wait | Self::Halt)
    }
}

/// Run-state transitions requested from outside the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunRequest {
    /// Resume continuous execution.
    Run,
    /// Execute a single instruction.
    Step,
    /// Perform a console reset of devices and memory management.
    Reset,
    /// Stop execution.
    Halt,
}

#[cfg(test)]
mod tests {
    use super::RunState;

    #[test]
    fn run_state_default_is_halt() {
        assert_eq!(RunState::default(), RunState::Halt);
    }

    #[test]
    fn executing_and_idle_states_are_disjoint() {
        for state in [
            RunState::Run,
            RunState::Step,
            RunState::Reset,
            RunState::Wait,
            RunState::Halt,
        ] {
            assert!(!(state.is_executing() && state.is_idle()));
        }
        assert!(RunState::Run.is_executing());
        assert!(RunState::Wait.is_idle());
        assert!(!RunState::Reset.is_executing());
    }
}
