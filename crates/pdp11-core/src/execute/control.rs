//! Branches, subroutine linkage, trap instructions and processor control.

use super::TraceRule;
use crate::decoder::DecodedInstruction;
use crate::encoding::Opcode;
use crate::fault::{CpuResult, Fault, VEC_BPT, VEC_EMT, VEC_IOT, VEC_TRAP};
use crate::memory::AccessIntent;
use crate::state::{Mode, RunState, PC, PSW_C, PSW_N, PSW_V, PSW_Z, SP};
use crate::trap::StackCheck;
use crate::Cpu;

/// PSW bits an RTI/RTT outside kernel mode takes from the popped word.
const UNPRIVILEGED_PSW_POPPED: u16 = 0o174037;
/// PSW bits an RTI/RTT outside kernel mode keeps from the current PSW.
const UNPRIVILEGED_PSW_KEPT: u16 = 0o174340;

impl Cpu {
    pub(super) fn execute_branch(&mut self, ins: DecodedInstruction) {
        let n = self.regs.flag(PSW_N);
        let z = self.regs.flag(PSW_Z);
        let v = self.regs.flag(PSW_V);
        let c = self.regs.flag(PSW_C);
        let taken = match ins.opcode {
            Opcode::Br => true,
            Opcode::Bne => !z,
            Opcode::Beq => z,
            Opcode::Bge => n == v,
            Opcode::Blt => n != v,
            Opcode::Bgt => !z && n == v,
            Opcode::Ble => z || n != v,
            Opcode::Bpl => !n,
            Opcode::Bmi => n,
            Opcode::Bhi => !c && !z,
            Opcode::Blos => c || z,
            Opcode::Bvc => !v,
            Opcode::Bvs => v,
            Opcode::Bcc => !c,
            Opcode::Bcs => c,
            _ => false,
        };
        if taken {
            let target = self.regs.pc().wrapping_add(ins.branch_offset());
            self.regs.set_pc(target);
        }
    }

    pub(super) fn execute_control(&mut self, ins: DecodedInstruction) -> CpuResult<()> {
        let kernel = self.regs.current_mode() == Mode::Kernel;
        match ins.opcode {
            Opcode::Halt => {
                if !kernel {
                    return Err(self.raise(Fault::IllegalHalt));
                }
                self.run_state = RunState::Halt;
                log::info!("halt at {:06o}", self.regs.pc().wrapping_sub(2));
            }
            Opcode::Wait => {
                if kernel {
                    self.run_state = RunState::Wait;
                }
            }
            Opcode::Reset => {
                if kernel {
                    self.reset_system();
                    self.enter_reset();
                }
            }
            Opcode::Spl => {
                if kernel {
                    self.set_priority(ins.word & 7);
                }
            }
            Opcode::ConditionCode => {
                let mask = ins.word & 0o17;
                let value = if ins.word & 0o20 != 0 { mask } else { 0 };
                self.regs.set_flags(mask, value);
            }
            Opcode::Bpt => self.trap(VEC_BPT),
            Opcode::Iot => self.trap(VEC_IOT),
            Opcode::Emt => self.trap(VEC_EMT),
            Opcode::Trap => self.trap(VEC_TRAP),
            Opcode::Jmp => {
                let target = self.jump_target(ins)?;
                self.regs.set_pc(target);
            }
            Opcode::Jsr => {
                let target = self.jump_target(ins)?;
                let link = ins.reg();
                self.push(self.regs.get(link), StackCheck::Full)?;
                self.regs.set(link, self.regs.pc());
                self.regs.set_pc(target);
            }
            Opcode::Rts => {
                let link = ins.low_reg();
                self.regs.set_pc(self.regs.get(link));
                let saved = self.pop()?;
                self.regs.set(link, saved);
            }
            Opcode::Mark => {
                let sp = self.regs.pc().wrapping_add((ins.word & 0o77) << 1);
                self.regs.set(SP, sp);
                self.regs.set_pc(self.regs.get(5));
                let saved = self.pop()?;
                self.regs.set(5, saved);
            }
            Opcode::Sob => {
                let reg = ins.reg();
                let count = self.regs.get(reg).wrapping_sub(1);
                self.regs.set(reg, count);
                if count != 0 {
                    let target = self.regs.pc().wrapping_sub((ins.word & 0o77) << 1);
                    self.regs.set(PC, target);
                }
            }
            _ => return Err(self.raise(Fault::IllegalInstruction)),
        }
        Ok(())
    }

    /// RTI and RTT: pop PC and PSW; outside kernel mode the popped PSW
    /// cannot raise privilege or change priority.
    pub(super) fn execute_return_from_interrupt(&mut self, rule: TraceRule) -> CpuResult<TraceRule> {
        let pc = self.pop()?;
        let popped = self.pop()?;
        let psw = if self.regs.current_mode() == Mode::Kernel {
            popped
        } else {
            (popped & UNPRIVILEGED_PSW_POPPED) | (self.regs.psw() & UNPRIVILEGED_PSW_KEPT)
        };
        self.regs.set_pc(pc);
        self.write_psw(psw);
        self.psw_written = true;
        Ok(rule)
    }

    fn jump_target(&mut self, ins: DecodedInstruction) -> CpuResult<u16> {
        let specifier = ins.dst();
        if specifier.is_register() {
            return Err(self.raise(Fault::IllegalAddressingMode));
        }
        self.resolve(specifier, AccessIntent::READ_WORD)
            .map(|va| va.offset())
    }
}
