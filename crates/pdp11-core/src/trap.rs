//! Trap entry, deferred trap bookkeeping and interrupt arbitration.

use crate::fault::{
    Fault, CPU_ERROR_RED_STACK, CPU_ERROR_YELLOW_STACK, VEC_BPT, VEC_BUS_ERROR, VEC_FPP, VEC_MMU,
    VEC_PIRQ,
};
use crate::memory::{AccessIntent, VirtualAddress};
use crate::state::{Mode, RunState, PSW_CURRENT_MODE, PSW_PREVIOUS_MODE};
use crate::{Cpu, CpuResult, SP};

/// Stack addresses at or above this value are always a red-zone violation.
const STACK_TOP_GUARD: u16 = 0o177776;
/// Red zone depth below the yellow limit, in bytes.
const RED_ZONE_BYTES: u32 = 32;
/// Stack pointer installed for double-trap recovery.
const RECOVERY_STACK_POINTER: u16 = 4;

/// Traps raised during an instruction but serviced at the next boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredTrap {
    /// Memory management soft trap.
    Mmu,
    /// Kernel stack yellow zone.
    YellowStack,
    /// Floating-point exception.
    FloatingPoint,
    /// Trace bit.
    Trace,
}

impl DeferredTrap {
    /// Service order, highest priority first.
    pub const PRIORITY: [Self; 4] = [Self::Mmu, Self::YellowStack, Self::FloatingPoint, Self::Trace];

    const fn bit(self) -> u8 {
        match self {
            Self::Mmu => 0b1000,
            Self::YellowStack => 0b0100,
            Self::FloatingPoint => 0b0010,
            Self::Trace => 0b0001,
        }
    }

    /// Vector the trap is serviced through.
    #[must_use]
    pub const fn vector(self) -> u16 {
        match self {
            Self::Mmu => VEC_MMU,
            Self::YellowStack => VEC_BUS_ERROR,
            Self::FloatingPoint => VEC_FPP,
            Self::Trace => VEC_BPT,
        }
    }
}

/// Set of pending deferred traps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeferredTraps(u8);

impl DeferredTraps {
    /// Returns `true` when `trap` is pending.
    #[must_use]
    pub const fn contains(self, trap: DeferredTrap) -> bool {
        self.0 & trap.bit() != 0
    }

    /// Returns `true` when nothing is pending.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Highest-priority pending trap.
    #[must_use]
    pub fn highest(self) -> Option<DeferredTrap> {
        DeferredTrap::PRIORITY
            .into_iter()
            .find(|trap| self.contains(*trap))
    }

    fn insert(&mut self, trap: DeferredTrap) {
        self.0 |= trap.bit();
    }

    fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Trap coordinator state and the CPU registers it owns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrapState {
    trap_psw: Option<u16>,
    double_trap: bool,
    pending: DeferredTraps,
    pub(crate) cpu_error: u16,
    stack_limit: u16,
    pir: u16,
    priority_review: u8,
}

impl TrapState {
    /// Returns `true` between trap entry and completion.
    #[must_use]
    pub const fn in_progress(&self) -> bool {
        self.trap_psw.is_some()
    }

    /// Pending deferred traps.
    #[must_use]
    pub const fn pending(&self) -> DeferredTraps {
        self.pending
    }

    /// Requests a deferred trap.
    pub fn defer(&mut self, trap: DeferredTrap) {
        self.pending.insert(trap);
    }

    /// CPU error register.
    #[must_use]
    pub const fn cpu_error(&self) -> u16 {
        self.cpu_error
    }

    /// Stack limit register as stored (high byte only).
    #[must_use]
    pub const fn stack_limit(&self) -> u16 {
        self.stack_limit
    }

    /// Writes the stack limit register; only the high byte is kept.
    pub fn write_stack_limit(&mut self, value: u16) {
        self.stack_limit = value & 0o177400;
    }

    /// Program interrupt request register.
    #[must_use]
    pub const fn pir(&self) -> u16 {
        self.pir
    }

    /// Writes the request bits of the PIR and recomputes the encoded level.
    pub fn write_pir(&mut self, value: u16) {
        let requests = value & 0o177000;
        let level = if requests == 0 {
            0
        } else {
            15 - requests.leading_zeros() as u16 - 8
        };
        self.pir = requests | (level << 5) | (level << 1);
        self.request_review(1);
    }

    /// Schedules an interrupt review after `delay` instruction boundaries.
    ///
    /// An earlier pending review is never postponed.
    pub fn request_review(&mut self, delay: u8) {
        if self.priority_review == 0 || delay < self.priority_review {
            self.priority_review = delay;
        }
    }

    /// Counts one boundary down; returns `true` when a review is due now.
    pub(crate) fn review_due(&mut self) -> bool {
        if self.priority_review == 0 {
            return false;
        }
        self.priority_review -= 1;
        self.priority_review == 0
    }

    /// Clears the CPU-owned registers on a RESET.
    pub(crate) fn reset(&mut self) {
        self.pir = 0;
        self.cpu_error = 0;
        self.stack_limit = 0;
        self.pending.clear();
    }

    /// Clears all trap bookkeeping on power-up.
    pub(crate) fn power_up(&mut self) {
        *self = Self::default();
    }
}

/// Stack checks applied to a kernel stack push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StackCheck {
    /// Yellow and red zones.
    Full,
    /// Red zone only; used while entering a trap.
    RedOnly,
    /// No check; used during double-trap recovery.
    None,
}

impl Cpu {
    /// Latches the fault's CPU error bits, takes its trap and returns it for `Err`.
    pub(crate) fn raise(&mut self, fault: Fault) -> Fault {
        self.traps.cpu_error |= fault.cpu_error_bits();
        log::debug!(
            "fault {fault} at pc {:#o} psw {:#o}",
            self.regs.pc(),
            self.regs.psw()
        );
        self.trap(fault.vector());
        fault
    }

    /// Enters the trap or interrupt through `vector`.
    ///
    /// Failures while entering are handled internally: a fault during a
    /// kernel trap entry becomes a double trap, and a fault during double-trap
    /// recovery halts the processor.
    pub fn trap(&mut self, vector: u16) {
        let mut vector = vector;
        let mut double = false;
        let trap_psw = match self.traps.trap_psw {
            None => {
                let psw = self.regs.psw();
                self.traps.trap_psw = Some(psw);
                self.traps.pending.clear();
                psw
            }
            Some(psw) => {
                if self.traps.double_trap {
                    log::warn!(
                        "fault during double-trap recovery, halting at {:#o}",
                        self.regs.pc()
                    );
                    self.traps.trap_psw = None;
                    self.traps.double_trap = false;
                    self.run_state = RunState::Halt;
                    return;
                }
                if self.mmu.mode() == Mode::Kernel {
                    log::warn!("double trap at pc {:#o}", self.regs.pc());
                    vector = VEC_BUS_ERROR;
                    double = true;
                    self.traps.double_trap = true;
                }
                psw
            }
        };

        self.mmu.record_trap(vector);
        let old_pc = self.regs.pc();
        self.mmu.set_mode(Mode::Kernel);
        let Ok(new_pc) = self.read_word(VirtualAddress::data(vector)) else {
            self.mmu.set_mode(self.regs.current_mode());
            return;
        };
        let Ok(new_psw) = self.read_word(VirtualAddress::data(vector.wrapping_add(2))) else {
            self.mmu.set_mode(self.regs.current_mode());
            return;
        };

        self.write_psw((new_psw & !PSW_PREVIOUS_MODE) | ((trap_psw & PSW_CURRENT_MODE) >> 2));
        let check = if double {
            self.traps.cpu_error |= CPU_ERROR_RED_STACK;
            self.regs.set_sp(RECOVERY_STACK_POINTER);
            StackCheck::None
        } else {
            StackCheck::RedOnly
        };

        if self.push(trap_psw, check).is_err() || self.push(old_pc, check).is_err() {
            return;
        }
        self.regs.set_pc(new_pc);
        self.traps.trap_psw = None;
        self.traps.double_trap = false;
        log::debug!("trap {vector:#o} -> pc {new_pc:#o} psw {:#o}", self.regs.psw());
    }

    /// Pushes a word onto the current stack.
    pub(crate) fn push(&mut self, value: u16, check: StackCheck) -> CpuResult<()> {
        let sp = self.regs.sp().wrapping_sub(2);
        self.regs.set_sp(sp);
        if check != StackCheck::None {
            self.check_stack_limit(sp, check == StackCheck::Full)?;
        }
        self.write_word(VirtualAddress::data(sp), value)
    }

    /// Pops a word off the current stack.
    pub(crate) fn pop(&mut self) -> CpuResult<u16> {
        let sp = self.regs.sp();
        let value = self.read_word(VirtualAddress::data(sp))?;
        self.regs.set_sp(sp.wrapping_add(2));
        Ok(value)
    }

    /// Checks a kernel stack write address against the stack limit.
    ///
    /// A yellow-zone hit is deferred; a red-zone hit resets SP and aborts.
    pub(crate) fn check_stack_limit(&mut self, addr: u16, report_yellow: bool) -> CpuResult<()> {
        if self.mmu.mode() != Mode::Kernel {
            return Ok(());
        }
        let limit = self.traps.stack_limit | 0o377;
        if addr > limit && addr < STACK_TOP_GUARD {
            return Ok(());
        }
        if u32::from(addr) + RED_ZONE_BYTES <= u32::from(limit) || addr >= STACK_TOP_GUARD {
            log::warn!("kernel stack red zone at {addr:#o}");
            self.traps.cpu_error |= CPU_ERROR_RED_STACK;
            self.regs.set_sp(RECOVERY_STACK_POINTER);
            return Err(self.raise(Fault::RedZone));
        }
        if report_yellow {
            self.traps.cpu_error |= CPU_ERROR_YELLOW_STACK;
            self.traps.defer(DeferredTrap::YellowStack);
        }
        Ok(())
    }

    /// Services the highest-priority deferred trap, if any.
    pub(crate) fn service_deferred_traps(&mut self) -> bool {
        match self.traps.pending.highest() {
            Some(trap) => {
                log::debug!("deferred {trap:?} trap");
                self.trap(trap.vector());
                true
            }
            None => false,
        }
    }

    /// Arbitrates device and PIR requests against the processor priority.
    ///
    /// Returns `true` when an interrupt was taken.
    pub fn check_interrupts(&mut self) -> bool {
        let cpu_priority = self.regs.priority();
        let pir_level = ((self.traps.pir >> 5) & 7) as u8;
        let device = self.bus.highest_request();
        let device_level = device.map_or(0, |(_, level)| level);
        let level = device_level.max(pir_level);
        if level <= cpu_priority {
            return false;
        }

        let vector = match device {
            Some((id, device_level)) if device_level >= pir_level => {
                match self.bus.take_interrupt(id) {
                    Some(vector) => vector,
                    None => return false,
                }
            }
            _ => VEC_PIRQ,
        };
        log::debug!("interrupt level {level} vector {vector:#o}");
        self.trap(vector);
        if self.run_state == RunState::Wait {
            self.run_state = RunState::Run;
        }
        self.traps.request_review(1);
        true
    }

    /// Verifies the stack page is writable before an operand write through SP.
    pub(crate) fn check_stack_operand(
        &mut self,
        reg: usize,
        addr: u16,
        intent: AccessIntent,
    ) -> CpuResult<()> {
        if reg == SP && intent.is_write() {
            self.check_stack_limit(addr, true)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DeferredTrap, DeferredTraps, TrapState};

    #[test]
    fn deferred_traps_are_serviced_in_priority_order() {
        let mut traps = DeferredTraps::default();
        assert_eq!(traps.highest(), None);
        traps.insert(DeferredTrap::Trace);
        traps.insert(DeferredTrap::FloatingPoint);
        assert_eq!(traps.highest(), Some(DeferredTrap::FloatingPoint));
        traps.insert(DeferredTrap::Mmu);
        traps.insert(DeferredTrap::YellowStack);
        assert_eq!(traps.highest(), Some(DeferredTrap::Mmu));
        traps.clear();
        assert!(traps.is_empty());
    }

    #[test]
    fn pir_encodes_highest_request_level() {
        let mut traps = TrapState::default();
        traps.write_pir(0o1000);
        assert_eq!(traps.pir(), 0o1000 | (1 << 5) | (1 << 1));
        traps.write_pir(0o1000 | 0o40000 | 0o377);
        assert_eq!(traps.pir(), 0o41000 | (6 << 5) | (6 << 1));
        traps.write_pir(0);
        assert_eq!(traps.pir(), 0);
    }

    #[test]
    fn review_counter_never_postpones_an_earlier_review() {
        let mut traps = TrapState::default();
        traps.request_review(1);
        traps.request_review(2);
        assert!(traps.review_due());
        assert!(!traps.review_due());

        traps.request_review(2);
        assert!(!traps.review_due());
        assert!(traps.review_due());
    }

    #[test]
    fn stack_limit_keeps_high_byte() {
        let mut traps = TrapState::default();
        traps.write_stack_limit(0o1377);
        assert_eq!(traps.stack_limit(), 0o1000);
    }
}
