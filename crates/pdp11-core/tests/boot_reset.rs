//! Boot, configuration and reset sequencing through the batch scheduler.

#![allow(
    clippy::pedantic,
    clippy::nursery,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::too_many_lines
)]

use std::time::{Duration, Instant};

use log as _;
use pdp11_core::{
    BusCycle, BusError, ConfigError, CoreConfig, Cpu, Device, RunRequest, RunState, Scheduler,
    DEFAULT_BOOT_ADDRESS,
};
use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

struct Inert;

impl Device for Inert {
    fn name(&self) -> &str {
        "inert"
    }

    fn access(&mut self, addr: u32, _cycle: BusCycle) -> Result<u16, BusError> {
        Err(BusError::Rejected { addr })
    }
}

fn config() -> CoreConfig {
    CoreConfig {
        memory_bytes: 0o200000,
        ..CoreConfig::default()
    }
}

#[rstest]
#[case::too_small(0o100000)]
#[case::not_whole_pages(0o210000)]
fn memory_size_is_validated(#[case] bytes: u32) {
    let result = Cpu::new(CoreConfig {
        memory_bytes: bytes,
        ..CoreConfig::default()
    });
    assert_eq!(result.err(), Some(ConfigError::MemorySize { bytes }));
}

#[test]
fn odd_boot_address_is_rejected() {
    let result = Cpu::new(CoreConfig {
        boot_address: 0o1001,
        ..config()
    });
    assert_eq!(result.err(), Some(ConfigError::OddBootAddress { addr: 0o1001 }));
}

#[test]
fn oversized_image_is_rejected() {
    let mut cpu = Cpu::new(config()).expect("config must be valid");
    let image = vec![0; 0o100000];
    assert_eq!(
        cpu.boot_image(&image),
        Err(ConfigError::ImageTooLarge {
            base: u32::from(DEFAULT_BOOT_ADDRESS),
            words: image.len(),
        })
    );
    assert_eq!(cpu.run_state(), RunState::Halt);
}

#[rstest]
#[case::below_io_page(0o1000, 0o1007)]
#[case::misaligned(0o17777542, 0o17777547)]
fn device_ranges_are_validated(#[case] start: u32, #[case] end: u32) {
    let mut cpu = Cpu::new(config()).expect("config must be valid");
    assert!(cpu.attach(start, end, Box::new(Inert)).is_err());
    assert!(cpu.bus.is_empty());
}

#[test]
fn overlapping_devices_are_rejected() {
    let mut cpu = Cpu::new(config()).expect("config must be valid");
    cpu.attach(0o17777560, 0o17777567, Box::new(Inert))
        .expect("first device must attach");
    let overlap = cpu.attach(0o17777560, 0o17777577, Box::new(Inert));
    assert!(matches!(overlap, Err(ConfigError::DeviceOverlap { .. })));
}

#[test]
fn boot_sets_pc_and_sp_to_the_boot_address() {
    let mut cpu = Cpu::new(config()).expect("config must be valid");
    cpu.boot_image(&[0o005200, 0]).expect("program must fit");

    assert_eq!(cpu.run_state(), RunState::Run);
    assert_eq!(cpu.regs.pc(), DEFAULT_BOOT_ADDRESS);
    assert_eq!(cpu.regs.sp(), DEFAULT_BOOT_ADDRESS);
    assert_eq!(cpu.regs.psw(), 0);

    let outcome = Scheduler::new(&config()).run_batch(&mut cpu, Instant::now());
    assert_eq!(outcome.steps, 2);
    assert!(outcome.idle);
    assert_eq!(cpu.regs.get(0), 1);
}

#[test]
fn switch_register_is_visible_to_software() {
    let mut cpu = Cpu::new(CoreConfig {
        switch_register: 0o173030,
        ..config()
    })
    .expect("config must be valid");
    // MOV @#177570,R0; MOV R0,@#177570; HALT
    cpu.boot_image(&[0o013700, 0o177570, 0o010037, 0o177570, 0])
        .expect("program must fit");
    Scheduler::new(&config()).run_batch(&mut cpu, Instant::now());

    assert_eq!(cpu.regs.get(0), 0o173030);
    assert_eq!(cpu.console.display, 0o173030);
}

#[test]
fn reset_instruction_pauses_a_running_program() {
    // INC R0; RESET; INC R0; HALT
    let mut cpu = Cpu::new(config()).expect("config must be valid");
    cpu.boot_image(&[0o005200, 0o000005, 0o005200, 0])
        .expect("program must fit");
    let mut scheduler = Scheduler::new(&config());
    let start = Instant::now();

    let outcome = scheduler.run_batch(&mut cpu, start);
    assert_eq!(outcome.steps, 2);
    assert!(!outcome.idle);
    assert_eq!(cpu.run_state(), RunState::Reset);

    let outcome = scheduler.run_batch(&mut cpu, start + Duration::from_millis(3));
    assert_eq!(outcome.steps, 0);
    assert_eq!(cpu.regs.get(0), 1);

    let outcome = scheduler.run_batch(&mut cpu, start + Duration::from_millis(20));
    assert_eq!(outcome.steps, 2);
    assert_eq!(cpu.regs.get(0), 2);
    assert_eq!(cpu.run_state(), RunState::Halt);
}

#[test]
fn step_through_a_reset_halts_afterwards() {
    // RESET; INC R0
    let mut cpu = Cpu::new(config()).expect("config must be valid");
    cpu.boot_image(&[0o000005, 0o005200]).expect("program must fit");
    cpu.request(RunRequest::Step);
    let mut scheduler = Scheduler::new(&config());
    let start = Instant::now();

    scheduler.run_batch(&mut cpu, start);
    assert_eq!(cpu.run_state(), RunState::Reset);

    let outcome = scheduler.run_batch(&mut cpu, start + Duration::from_millis(20));
    assert_eq!(outcome.steps, 0);
    assert_eq!(cpu.run_state(), RunState::Halt);
    assert_eq!(cpu.regs.get(0), 0);
}

#[test]
fn console_reset_clears_error_state_and_halts() {
    let mut cpu = Cpu::new(config()).expect("config must be valid");
    // MOV @#1001,R0 faults through vector 4 into an empty handler.
    cpu.boot_image(&[0o013700, 0o1001]).expect("program must fit");
    cpu.step();
    assert_ne!(cpu.traps.cpu_error(), 0);

    cpu.request(RunRequest::Reset);

    assert_eq!(cpu.run_state(), RunState::Halt);
    assert_eq!(cpu.traps.cpu_error(), 0);
    assert_eq!(cpu.mmu.mmr0(), 0);
}

#[test]
fn halt_request_stops_a_batch_before_it_starts() {
    let mut cpu = Cpu::new(config()).expect("config must be valid");
    cpu.boot_image(&[0o000777]).expect("program must fit");
    cpu.request(RunRequest::Halt);
    let outcome = Scheduler::new(&config()).run_batch(&mut cpu, Instant::now());
    assert_eq!(outcome.steps, 0);
    assert!(outcome.idle);
}
