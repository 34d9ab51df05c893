//! Instruction execution pipeline.
//!
//! Each [`Cpu::step`] crosses one instruction boundary:
//! 1. Fold an asynchronous interrupt signal into the priority review
//! 2. Arbitrate interrupts when a review is due (or while waiting)
//! 3. Service one deferred trap left by the previous instruction
//! 4. Snapshot the trace bit and fetch the instruction word
//! 5. Decode and execute; a failing operand access aborts the rest
//!
//! Effects completed before a fault are not rolled back. MMR1 records
//! register side effects so that system software can restart the instruction.

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]

mod control;
mod double;
mod eis;
mod flags;
mod operand;
mod single;

pub use flags::{sign_bit, width_mask, FlagsUpdate};
pub use operand::Operand;

use crate::decoder::DecodedInstruction;
use crate::encoding::Opcode;
use crate::fault::{CpuResult, Fault};
use crate::state::{RunState, PSW_T};
use crate::trap::DeferredTrap;
use crate::{Cpu, StepOutcome};

/// How the trace trap behaves after an instruction retires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TraceRule {
    /// Trace if T was set when the instruction was fetched.
    Snapshot,
    /// Trace if the PSW just installed has T set (RTI).
    Installed,
    /// Do not trace this instruction (RTT).
    Suppress,
}

impl Cpu {
    /// Crosses one instruction boundary.
    pub fn step(&mut self) -> StepOutcome {
        match self.run_state {
            RunState::Halt => return StepOutcome::Halted,
            RunState::Reset => return StepOutcome::Resetting,
            RunState::Run | RunState::Step | RunState::Wait => {}
        }

        if self.take_interrupt_signal() {
            self.traps.request_review(1);
        }
        if self.run_state == RunState::Wait {
            self.traps.review_due();
            if !self.check_interrupts() {
                return StepOutcome::Waiting;
            }
        } else if self.traps.review_due() {
            self.check_interrupts();
        }

        if !self.traps.pending().is_empty() {
            self.service_deferred_traps();
        }
        if !self.run_state.is_executing() {
            return StepOutcome::Halted;
        }

        let traced = self.regs.psw() & PSW_T != 0;
        self.psw_written = false;
        let pc = self.regs.pc();
        self.mmu.begin_instruction(pc);

        let result = self.fetch_word().and_then(|word| {
            let instruction = self.decoder.decode(word);
            if log::log_enabled!(log::Level::Trace) {
                log::trace!(
                    "{pc:06o}: {instruction} psw {:06o} sp {:06o}",
                    self.regs.psw(),
                    self.regs.sp()
                );
            }
            self.execute(instruction)
        });

        let outcome = match result {
            Ok(rule) => {
                let trace = match rule {
                    TraceRule::Snapshot => traced,
                    TraceRule::Installed => self.regs.psw() & PSW_T != 0,
                    TraceRule::Suppress => false,
                };
                if trace {
                    self.traps.defer(DeferredTrap::Trace);
                }
                match self.run_state {
                    RunState::Halt => StepOutcome::Halted,
                    RunState::Wait => StepOutcome::Waiting,
                    RunState::Reset => StepOutcome::Resetting,
                    RunState::Run | RunState::Step => StepOutcome::Retired,
                }
            }
            Err(_) if self.run_state == RunState::Halt => StepOutcome::Faulted(Fault::DoubleTrap),
            Err(fault) => StepOutcome::Faulted(fault),
        };

        if self.run_state == RunState::Step {
            self.run_state = RunState::Halt;
            log::info!("single step complete at {:06o}", self.regs.pc());
        }
        outcome
    }

    /// Commits a condition-code update unless the instruction wrote the PSW.
    pub(crate) fn commit_flags(&mut self, update: FlagsUpdate) {
        if !self.psw_written {
            self.regs.set_flags(update.mask(), update.value());
        }
    }

    fn execute(&mut self, instruction: DecodedInstruction) -> CpuResult<TraceRule> {
        match instruction.opcode {
            Opcode::Mov
            | Opcode::Cmp
            | Opcode::Bit
            | Opcode::Bic
            | Opcode::Bis
            | Opcode::Add
            | Opcode::Sub => self.execute_double_operand(instruction)?,
            Opcode::Clr
            | Opcode::Com
            | Opcode::Inc
            | Opcode::Dec
            | Opcode::Neg
            | Opcode::Adc
            | Opcode::Sbc
            | Opcode::Tst
            | Opcode::Ror
            | Opcode::Rol
            | Opcode::Asr
            | Opcode::Asl
            | Opcode::Swab
            | Opcode::Sxt => self.execute_single_operand(instruction)?,
            Opcode::Mfp => self.execute_move_from_previous(instruction)?,
            Opcode::Mtp => self.execute_move_to_previous(instruction)?,
            Opcode::Mul | Opcode::Div | Opcode::Ash | Opcode::Ashc | Opcode::Xor => {
                self.execute_extended(instruction)?;
            }
            Opcode::Fpp => self.execute_fpp(instruction)?,
            Opcode::Rti => return self.execute_return_from_interrupt(TraceRule::Installed),
            Opcode::Rtt => return self.execute_return_from_interrupt(TraceRule::Suppress),
            Opcode::Reserved => return Err(self.raise(Fault::IllegalInstruction)),
            opcode if opcode.is_branch() => self.execute_branch(instruction),
            _ => self.execute_control(instruction)?,
        }
        Ok(TraceRule::Snapshot)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::state::{RunState, PSW_C, PSW_N, PSW_T, PSW_V, PSW_Z};
    use crate::{CoreConfig, Cpu, Fault, StepOutcome};

    pub(crate) fn cpu_with(program: &[u16]) -> Cpu {
        let mut cpu = Cpu::new(CoreConfig {
            memory_bytes: 0o200000,
            ..CoreConfig::default()
        })
        .expect("config must be valid");
        cpu.memory.write_word(0o4, 0o3000);
        cpu.memory.write_word(0o10, 0o3100);
        cpu.memory.write_word(0o14, 0o3200);
        cpu.memory.write_word(0o3000, 0);
        cpu.memory.write_word(0o3100, 0);
        cpu.memory.write_word(0o3200, 0o240);
        cpu.boot_image(program).expect("program must fit");
        cpu
    }

    #[test]
    fn mov_immediate_then_neg_overflows_on_most_negative() {
        let mut cpu = cpu_with(&[0o012700, 0o100000, 0o005400]);
        assert_eq!(cpu.step(), StepOutcome::Retired);
        assert_eq!(cpu.step(), StepOutcome::Retired);
        assert_eq!(cpu.regs.get(0), 0o100000);
        assert_eq!(cpu.regs.flags(), PSW_N | PSW_V | PSW_C);
    }

    #[test]
    fn reserved_word_traps_through_vector_10() {
        let mut cpu = cpu_with(&[0o007000]);
        assert_eq!(cpu.step(), StepOutcome::Faulted(Fault::IllegalInstruction));
        assert_eq!(cpu.regs.pc(), 0o3100);
        assert_eq!(cpu.regs.sp(), 0o774);
    }

    #[test]
    fn step_state_halts_after_one_instruction() {
        let mut cpu = cpu_with(&[0o005000, 0o005000]);
        cpu.request(crate::RunRequest::Step);
        assert_eq!(cpu.step(), StepOutcome::Retired);
        assert_eq!(cpu.run_state(), RunState::Halt);
        assert_eq!(cpu.step(), StepOutcome::Halted);
        assert_eq!(cpu.regs.pc(), 0o1002);
    }

    #[test]
    fn trace_bit_traps_after_the_instruction() {
        let mut cpu = cpu_with(&[0o005000, 0o005000]);
        cpu.write_psw(PSW_T);
        assert_eq!(cpu.step(), StepOutcome::Retired);
        assert_eq!(cpu.regs.flags(), PSW_Z);
        assert_eq!(cpu.regs.pc(), 0o1002);
        assert_eq!(cpu.step(), StepOutcome::Retired);
        assert_eq!(cpu.regs.pc(), 0o3202);
        assert_eq!(cpu.memory.read_word(0o774), 0o1002);
    }

    #[test]
    fn psw_write_suppresses_condition_codes() {
        let mut cpu = cpu_with(&[0o012737, 0o17, 0o177776]);
        assert_eq!(cpu.step(), StepOutcome::Retired);
        assert_eq!(cpu.regs.flags(), 0o17);
    }
}
