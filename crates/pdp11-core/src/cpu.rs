//! The processor context threaded through every component.

use crate::api::{ConfigError, CoreConfig};
use crate::bus::{BusCycle, Device, DeviceId, Dispatcher, InterruptSignal};
use crate::decoder::Decoder;
use crate::fault::{CpuResult, Fault};
use crate::fpp::Fpp;
use crate::memory::{PhysicalMemory, IO_PAGE_BASE};
use crate::mmu::Mmu;
use crate::state::{RegisterFile, RunRequest, RunState, PSW_PRIORITY};
use crate::trap::TrapState;

/// Console switch and display registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Console {
    /// Switch register, read by software at 17777570.
    pub switches: u16,
    /// Display register, written by software at 17777570.
    pub display: u16,
}

/// Complete processor: registers, MMU, trap coordinator, FPP, memory and bus.
#[derive(Debug)]
pub struct Cpu {
    /// General registers and PSW.
    pub regs: RegisterFile,
    /// Memory management unit.
    pub mmu: Mmu,
    /// Trap coordinator and CPU error/limit/PIR registers.
    pub traps: TrapState,
    /// Floating-point processor.
    pub fpp: Fpp,
    /// Main memory.
    pub memory: PhysicalMemory,
    /// Peripheral dispatch table.
    pub bus: Dispatcher,
    /// Console switch and display registers.
    pub console: Console,
    pub(crate) config: CoreConfig,
    pub(crate) decoder: Decoder,
    pub(crate) run_state: RunState,
    pub(crate) reset_resume: RunState,
    pub(crate) psw_written: bool,
    pub(crate) microprogram_break: u16,
    signal: InterruptSignal,
}

impl Cpu {
    /// Creates a halted processor with zeroed memory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` is invalid.
    pub fn new(config: CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        log::info!(
            "processor with {} KiB memory",
            config.memory_bytes / 1024
        );
        Ok(Self {
            regs: RegisterFile::default(),
            mmu: Mmu::default(),
            traps: TrapState::default(),
            fpp: Fpp::default(),
            memory: PhysicalMemory::new(config.memory_bytes),
            bus: Dispatcher::new(),
            console: Console {
                switches: config.switch_register,
                display: 0,
            },
            decoder: Decoder::new(),
            run_state: RunState::Halt,
            reset_resume: RunState::Run,
            psw_written: false,
            microprogram_break: 0,
            signal: InterruptSignal::new(),
            config,
        })
    }

    /// Configuration the processor was built with.
    #[must_use]
    pub const fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Current run state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// A handle peripherals use to request an interrupt review from any thread.
    #[must_use]
    pub fn interrupt_signal(&self) -> InterruptSignal {
        self.signal.clone()
    }

    /// Registers a device on an inclusive I/O page range.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::attach`].
    pub fn attach(
        &mut self,
        start: u32,
        end: u32,
        device: Box<dyn Device>,
    ) -> Result<DeviceId, ConfigError> {
        self.bus.attach(start, end, device)
    }

    /// Copies an image into memory at the physical address `base`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ImageTooLarge`] when it does not fit.
    pub fn load_image(&mut self, base: u32, words: &[u16]) -> Result<(), ConfigError> {
        if base & 1 != 0 || !self.memory.load_words(base, words) {
            return Err(ConfigError::ImageTooLarge {
                base,
                words: words.len(),
            });
        }
        Ok(())
    }

    /// Starts execution at `base`: PC and SP at `base`, PSW and PIR cleared,
    /// devices reset, state RUN.
    pub fn boot(&mut self, base: u16) {
        self.write_psw(0);
        self.regs.set_pc(base);
        self.regs.set_sp(base);
        self.traps.write_pir(0);
        self.bus.reset();
        self.run_state = RunState::Run;
        log::info!("boot at {base:#o}");
    }

    /// Loads `words` at the configured boot address and boots from it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ImageTooLarge`] when the image does not fit.
    pub fn boot_image(&mut self, words: &[u16]) -> Result<(), ConfigError> {
        let base = self.config.boot_address;
        self.load_image(u32::from(base), words)?;
        self.boot(base);
        Ok(())
    }

    /// Applies an external run-state request.
    pub fn request(&mut self, request: RunRequest) {
        let previous = self.run_state;
        match request {
            RunRequest::Run => {
                if self.run_state == RunState::Reset {
                    self.reset_resume = RunState::Run;
                } else {
                    self.run_state = RunState::Run;
                }
            }
            RunRequest::Step => {
                if self.run_state == RunState::Reset {
                    self.reset_resume = RunState::Halt;
                } else {
                    self.run_state = RunState::Step;
                }
            }
            RunRequest::Reset => {
                self.reset_system();
                self.traps.power_up();
                self.run_state = RunState::Halt;
            }
            RunRequest::Halt => self.run_state = RunState::Halt,
        }
        if previous != self.run_state {
            log::info!("run state {previous:?} -> {:?}", self.run_state);
        }
    }

    /// Resets devices, MMR0/MMR3, PIR and the CPU error register.
    pub(crate) fn reset_system(&mut self) {
        self.bus.reset();
        self.mmu.reset();
        self.traps.reset();
        self.signal.take();
    }

    /// Enters the timed RESET state after a RESET instruction.
    pub(crate) fn enter_reset(&mut self) {
        self.reset_resume = if self.run_state == RunState::Step {
            RunState::Halt
        } else {
            RunState::Run
        };
        self.run_state = RunState::Reset;
        log::info!("reset, resuming to {:?}", self.reset_resume);
    }

    /// Leaves the RESET state.
    pub(crate) fn finish_reset(&mut self) {
        if self.run_state == RunState::Reset {
            self.run_state = self.reset_resume;
            log::info!("reset complete, {:?}", self.run_state);
        }
    }

    /// Installs a new PSW, keeping the translation mode in step and
    /// scheduling an interrupt review when priority drops.
    pub fn write_psw(&mut self, psw: u16) {
        let change = self.regs.install_psw(psw);
        self.mmu.set_mode(self.regs.current_mode());
        if change.priority_lowered {
            self.traps.request_review(2);
        }
    }

    /// Sets only the PSW priority field.
    pub(crate) fn set_priority(&mut self, level: u16) {
        let psw = (self.regs.psw() & !PSW_PRIORITY) | ((level & 7) << 5);
        self.write_psw(psw);
    }

    /// Lowers the interrupt signal, returning whether it was raised.
    pub(crate) fn take_interrupt_signal(&self) -> bool {
        self.signal.take()
    }

    /// Reads a word at a physical address.
    ///
    /// # Errors
    ///
    /// [`Fault::BusTimeout`] when nothing answers, already trapped.
    pub fn read_physical_word(&mut self, addr: u32) -> CpuResult<u16> {
        if addr < self.memory.len_bytes() {
            return Ok(self.memory.read_word(addr));
        }
        self.io_access(addr, BusCycle::Read)
    }

    /// Reads a byte at a physical address.
    ///
    /// # Errors
    ///
    /// [`Fault::BusTimeout`] when nothing answers, already trapped.
    pub fn read_physical_byte(&mut self, addr: u32) -> CpuResult<u8> {
        if addr < self.memory.len_bytes() {
            return Ok(self.memory.read_byte(addr));
        }
        let word = self.io_access(addr, BusCycle::ReadByte)?;
        Ok(if addr & 1 == 0 {
            (word & 0xff) as u8
        } else {
            (word >> 8) as u8
        })
    }

    /// Writes a word at a physical address.
    ///
    /// # Errors
    ///
    /// [`Fault::BusTimeout`] when nothing answers, already trapped.
    pub fn write_physical_word(&mut self, addr: u32, value: u16) -> CpuResult<()> {
        if addr < self.memory.len_bytes() {
            self.memory.write_word(addr, value);
            return Ok(());
        }
        self.io_access(addr, BusCycle::Write(value)).map(drop)
    }

    /// Writes a byte at a physical address.
    ///
    /// # Errors
    ///
    /// [`Fault::BusTimeout`] when nothing answers, already trapped.
    pub fn write_physical_byte(&mut self, addr: u32, value: u8) -> CpuResult<()> {
        if addr < self.memory.len_bytes() {
            self.memory.write_byte(addr, value);
            return Ok(());
        }
        self.io_access(addr, BusCycle::WriteByte(value)).map(drop)
    }

    fn io_access(&mut self, addr: u32, cycle: BusCycle) -> CpuResult<u16> {
        if addr < IO_PAGE_BASE {
            return Err(self.raise(Fault::BusTimeout));
        }
        if let Some(value) = self.cpu_register_access(addr, cycle) {
            return Ok(value);
        }
        match self.bus.access(addr, cycle) {
            Ok(value) => {
                if cycle.is_write() {
                    self.traps.request_review(1);
                }
                Ok(value)
            }
            Err(error) => {
                log::debug!("{error}");
                Err(self.raise(Fault::BusTimeout))
            }
        }
    }
}
