//! Bounded execution batches for a host driver loop.

use std::time::{Duration, Instant};

use crate::api::{BatchOutcome, CoreConfig, StepOutcome};
use crate::state::RunState;
use crate::Cpu;

/// Runs the processor in batches and times the RESET state.
#[derive(Debug, Clone)]
pub struct Scheduler {
    batch_instructions: u32,
    reset_duration: Duration,
    reset_deadline: Option<Instant>,
}

impl Scheduler {
    /// Creates a scheduler using the batch size and reset time of `config`.
    #[must_use]
    pub const fn new(config: &CoreConfig) -> Self {
        Self {
            batch_instructions: config.batch_instructions,
            reset_duration: config.reset_duration(),
            reset_deadline: None,
        }
    }

    /// Executes one batch at host time `now`.
    ///
    /// Devices are ticked first. A processor in RESET stays there until the
    /// reset time has elapsed, then resumes in the same batch. RUN and WAIT
    /// step until the batch is used up or the processor stops; STEP runs a
    /// single instruction.
    pub fn run_batch(&mut self, cpu: &mut Cpu, now: Instant) -> BatchOutcome {
        if cpu.bus.tick(now) {
            cpu.traps.request_review(1);
        }
        let mut outcome = BatchOutcome {
            steps: 0,
            faults: 0,
            idle: false,
        };

        if cpu.run_state() == RunState::Reset {
            let deadline = *self
                .reset_deadline
                .get_or_insert_with(|| now + self.reset_duration);
            if now < deadline {
                return outcome;
            }
            self.reset_deadline = None;
            cpu.finish_reset();
        }

        let limit = if cpu.run_state() == RunState::Step {
            1
        } else {
            self.batch_instructions
        };
        while outcome.steps < limit && !matches!(cpu.run_state(), RunState::Halt | RunState::Reset)
        {
            match cpu.step() {
                StepOutcome::Waiting => break,
                StepOutcome::Faulted(fault) => {
                    outcome.steps += 1;
                    outcome.faults += 1;
                    log::debug!("{fault} at {:06o}", cpu.regs.pc());
                }
                StepOutcome::Resetting => {
                    outcome.steps += 1;
                    self.reset_deadline = Some(now + self.reset_duration);
                }
                StepOutcome::Retired | StepOutcome::Halted => outcome.steps += 1,
            }
        }
        outcome.idle = cpu.run_state().is_idle();
        outcome
    }
}
