/// Number of general registers visible at any time (`R0..R7`).
pub const GENERAL_REGISTER_COUNT: usize = 8;
/// Number of registers duplicated in the alternate register set (`R0..R5`).
pub const BANKED_REGISTER_COUNT: usize = 6;
/// Stack pointer register index.
pub const SP: usize = 6;
/// Program counter register index.
pub const PC: usize = 7;

/// PSW carry flag.
pub const PSW_C: u16 = 0o1;
/// PSW overflow flag.
pub const PSW_V: u16 = 0o2;
/// PSW zero flag.
pub const PSW_Z: u16 = 0o4;
/// PSW negative flag.
pub const PSW_N: u16 = 0o10;
/// Mask of the four condition flags.
pub const PSW_FLAGS: u16 = PSW_N | PSW_Z | PSW_V | PSW_C;
/// PSW trace trap enable.
pub const PSW_T: u16 = 0o20;
/// PSW processor priority field (bits 7..5).
pub const PSW_PRIORITY: u16 = 0o340;
/// PSW general register set selector.
pub const PSW_REGISTER_SET: u16 = 0o4000;
/// PSW previous mode field (bits 13..12).
pub const PSW_PREVIOUS_MODE: u16 = 0o30000;
/// PSW current mode field (bits 15..14).
pub const PSW_CURRENT_MODE: u16 = 0o140000;

/// Processor mode as encoded in the PSW mode fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum Mode {
    /// Most privileged mode.
    Kernel = 0,
    /// Supervisor mode.
    Supervisor = 1,
    /// Reserved encoding; every page in it is unmapped.
    Illegal = 2,
    /// Least privileged mode.
    User = 3,
}

impl Mode {
    /// Decodes a two-bit mode field.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => Self::Kernel,
            1 => Self::Supervisor,
            2 => Self::Illegal,
            _ => Self::User,
        }
    }

    /// Index used for per-mode tables (`0..=3`).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// What changed when a new PSW was installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PswChange {
    /// The current mode differs from the previous PSW.
    pub mode_changed: bool,
    /// The processor priority dropped.
    pub priority_lowered: bool,
}

/// Register banks, per-mode stack pointers and the processor status word.
///
/// Condition flags are stored materialised inside the PSW, so reading the
/// PSW never needs a reconciliation step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    active: [u16; GENERAL_REGISTER_COUNT],
    shadow: [u16; BANKED_REGISTER_COUNT],
    stack_pointers: [u16; 4],
    psw: u16,
}

impl RegisterFile {
    /// Reads an active register (`0..=7`).
    #[must_use]
    pub const fn get(&self, reg: usize) -> u16 {
        self.active[reg & 7]
    }

    /// Writes an active register (`0..=7`).
    pub const fn set(&mut self, reg: usize, value: u16) {
        self.active[reg & 7] = value;
    }

    /// Reads `R7`.
    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.active[PC]
    }

    /// Writes `R7`.
    pub const fn set_pc(&mut self, value: u16) {
        self.active[PC] = value;
    }

    /// Reads the stack pointer of the current mode.
    #[must_use]
    pub const fn sp(&self) -> u16 {
        self.active[SP]
    }

    /// Writes the stack pointer of the current mode.
    pub const fn set_sp(&mut self, value: u16) {
        self.active[SP] = value;
    }

    /// Reads the PSW.
    #[must_use]
    pub const fn psw(&self) -> u16 {
        self.psw
    }

    /// Current processor mode.
    #[must_use]
    pub const fn current_mode(&self) -> Mode {
        Mode::from_bits(self.psw >> 14)
    }

    /// Previous processor mode.
    #[must_use]
    pub const fn previous_mode(&self) -> Mode {
        Mode::from_bits(self.psw >> 12)
    }

    /// Processor priority (`0..=7`).
    #[must_use]
    pub const fn priority(&self) -> u8 {
        ((self.psw & PSW_PRIORITY) >> 5) as u8
    }

    /// Returns the four condition flags as PSW bits.
    #[must_use]
    pub const fn flags(&self) -> u16 {
        self.psw & PSW_FLAGS
    }

    /// Returns `true` when a flag bit is set.
    #[must_use]
    pub const fn flag(&self, flag: u16) -> bool {
        self.psw & flag & PSW_FLAGS != 0
    }

    /// Replaces the flags selected by `mask` with the matching bits of `value`.
    pub const fn set_flags(&mut self, mask: u16, value: u16) {
        let mask = mask & PSW_FLAGS;
        self.psw = (self.psw & !mask) | (value & mask);
    }

    /// Stack pointer belonging to `mode`, whether or not it is active.
    #[must_use]
    pub const fn stack_pointer(&self, mode: Mode) -> u16 {
        if mode.index() == self.current_mode().index() {
            self.active[SP]
        } else {
            self.stack_pointers[mode.index()]
        }
    }

    /// Writes the stack pointer belonging to `mode`.
    pub const fn set_stack_pointer(&mut self, mode: Mode, value: u16) {
        if mode.index() == self.current_mode().index() {
            self.active[SP] = value;
        } else {
            self.stack_pointers[mode.index()] = value;
        }
    }

    /// Reads `R0..R5` of a register set regardless of which set is active.
    #[must_use]
    pub const fn banked(&self, set: usize, reg: usize) -> u16 {
        let active_set = (self.psw & PSW_REGISTER_SET != 0) as usize;
        if set == active_set {
            self.active[reg]
        } else {
            self.shadow[reg]
        }
    }

    /// Writes `R0..R5` of a register set regardless of which set is active.
    pub const fn set_banked(&mut self, set: usize, reg: usize, value: u16) {
        let active_set = (self.psw & PSW_REGISTER_SET != 0) as usize;
        if set == active_set {
            self.active[reg] = value;
        } else {
            self.shadow[reg] = value;
        }
    }

    /// Installs a new PSW, swapping register sets and stack pointers as the
    /// register-set bit and current mode require.
    pub fn install_psw(&mut self, new: u16) -> PswChange {
        let old = self.psw;
        if (old ^ new) & PSW_REGISTER_SET != 0 {
            for (active, shadow) in self.active[..BANKED_REGISTER_COUNT]
                .iter_mut()
                .zip(self.shadow.iter_mut())
            {
                std::mem::swap(active, shadow);
            }
        }

        let old_mode = Mode::from_bits(old >> 14);
        let new_mode = Mode::from_bits(new >> 14);
        if old_mode != new_mode {
            self.stack_pointers[old_mode.index()] = self.active[SP];
            self.active[SP] = self.stack_pointers[new_mode.index()];
        }

        self.psw = new;
        PswChange {
            mode_changed: old_mode != new_mode,
            priority_lowered: (new & PSW_PRIORITY) < (old & PSW_PRIORITY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Mode, RegisterFile, PSW_C, PSW_FLAGS, PSW_N, PSW_REGISTER_SET, PSW_V, PSW_Z, SP,
    };

    #[test]
    fn mode_decode_covers_all_encodings() {
        assert_eq!(Mode::from_bits(0), Mode::Kernel);
        assert_eq!(Mode::from_bits(1), Mode::Supervisor);
        assert_eq!(Mode::from_bits(2), Mode::Illegal);
        assert_eq!(Mode::from_bits(3), Mode::User);
        assert_eq!(Mode::from_bits(7), Mode::User);
    }

    #[test]
    fn register_set_switch_swaps_low_six_registers_only() {
        let mut regs = RegisterFile::default();
        for reg in 0..8 {
            regs.set(reg, 0o100 + reg as u16);
        }

        regs.install_psw(PSW_REGISTER_SET);
        for reg in 0..6 {
            assert_eq!(regs.get(reg), 0);
        }
        assert_eq!(regs.get(6), 0o106);
        assert_eq!(regs.get(7), 0o107);

        regs.set(0, 0o777);
        regs.install_psw(0);
        assert_eq!(regs.get(0), 0o100);
        assert_eq!(regs.banked(1, 0), 0o777);
    }

    #[test]
    fn mode_change_swaps_stack_pointer() {
        let mut regs = RegisterFile::default();
        regs.set(SP, 0o1000);

        let change = regs.install_psw(0o140000);
        assert!(change.mode_changed);
        assert_eq!(regs.sp(), 0);
        regs.set_sp(0o2000);

        regs.install_psw(0);
        assert_eq!(regs.sp(), 0o1000);
        assert_eq!(regs.stack_pointer(Mode::User), 0o2000);
    }

    #[test]
    fn lowering_priority_is_reported() {
        let mut regs = RegisterFile::default();
        assert!(!regs.install_psw(0o340).priority_lowered);
        assert!(regs.install_psw(0o200).priority_lowered);
        assert_eq!(regs.priority(), 4);
    }

    #[test]
    fn flags_are_updated_under_mask() {
        let mut regs = RegisterFile::default();
        regs.set_flags(PSW_FLAGS, PSW_N | PSW_C);
        assert!(regs.flag(PSW_N) && regs.flag(PSW_C));

        regs.set_flags(PSW_C | PSW_Z, PSW_Z);
        assert_eq!(regs.flags(), PSW_N | PSW_Z);

        regs.set_flags(PSW_V, PSW_FLAGS);
        assert_eq!(regs.flags(), PSW_N | PSW_Z | PSW_V);
        assert_eq!(regs.psw(), regs.flags());
    }
}
