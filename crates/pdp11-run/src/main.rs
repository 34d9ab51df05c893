//! Boots a raw memory image on the PDP-11/70 processor core and drives it
//! from the host until it halts.

mod peripherals;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use pdp11_core::{CoreConfig, Cpu, RunRequest, RunState, Scheduler, StepOutcome};

use peripherals::{spawn_stdin_reader, Dl11, Kw11L, CLOCK_BASE, CLOCK_END, CONSOLE_BASE, CONSOLE_END};

#[cfg(test)]
use rstest as _;

/// Host sleep while the processor waits or is halted.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

#[derive(Parser, Debug)]
#[command(name = "pdp11-run", version)]
#[command(about = "Boot a raw little-endian image on a PDP-11/70 processor")]
struct Cli {
    /// Image file: little-endian words loaded at the base address
    #[arg(short, long)]
    image: PathBuf,
    /// Load and start address (octal)
    #[arg(short, long, value_parser = parse_octal, default_value = "1000")]
    base: u16,
    /// JSON processor configuration; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Console switch register (octal)
    #[arg(short, long, value_parser = parse_octal)]
    switches: Option<u16>,
    /// Stop after this many batches even if the processor is still running
    #[arg(long)]
    max_batches: Option<u64>,
    /// Execute one instruction at a time, tracing registers to stderr
    #[arg(long)]
    step: bool,
}

fn parse_octal(text: &str) -> Result<u16, String> {
    let digits = text.strip_prefix("0o").unwrap_or(text);
    u16::from_str_radix(digits, 8).map_err(|error| format!("{text:?} is not an octal word: {error}"))
}

/// Packs image bytes into little-endian words; an odd trailing byte is
/// padded with zero.
fn image_words(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect()
}

fn load_config(cli: &Cli) -> Result<CoreConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading configuration {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing configuration {}", path.display()))?
        }
        None => CoreConfig::default(),
    };
    config.boot_address = cli.base;
    if let Some(switches) = cli.switches {
        config.switch_register = switches;
    }
    Ok(config)
}

/// Runs batches until HALT or the batch limit.
fn run(cpu: &mut Cpu, scheduler: &mut Scheduler, max_batches: Option<u64>) -> u64 {
    let mut batches = 0;
    loop {
        let outcome = scheduler.run_batch(cpu, Instant::now());
        batches += 1;
        if outcome.faults > 0 {
            log::debug!("batch {batches}: {} faults", outcome.faults);
        }
        if cpu.run_state() == RunState::Halt || max_batches.is_some_and(|limit| batches >= limit) {
            return batches;
        }
        if outcome.idle {
            thread::sleep(IDLE_SLEEP);
        }
    }
}

/// Single-steps until a HALT instruction or the step limit.
fn single_step(cpu: &mut Cpu, scheduler: &mut Scheduler, max_steps: Option<u64>) -> u64 {
    let mut steps = 0;
    while max_steps.is_none_or(|limit| steps < limit) {
        if cpu.bus.tick(Instant::now()) {
            cpu.traps.request_review(1);
        }
        cpu.request(RunRequest::Step);
        let outcome = cpu.step();
        steps += 1;
        eprintln!("{}", trace_line(cpu, outcome));
        match outcome {
            StepOutcome::Halted => break,
            StepOutcome::Resetting => {
                while cpu.run_state() == RunState::Reset {
                    thread::sleep(IDLE_SLEEP);
                    scheduler.run_batch(cpu, Instant::now());
                }
            }
            StepOutcome::Retired | StepOutcome::Faulted(_) | StepOutcome::Waiting => {}
        }
    }
    steps
}

fn trace_line(cpu: &Cpu, outcome: StepOutcome) -> String {
    let registers: Vec<String> = (0..8)
        .map(|reg| format!("{:06o}", cpu.regs.get(reg)))
        .collect();
    format!(
        "{} psw {:06o} {outcome:?}",
        registers.join(" "),
        cpu.regs.psw()
    )
}

fn print_registers(cpu: &Cpu) {
    println!();
    for reg in 0..6 {
        println!("R{reg} {:06o}", cpu.regs.get(reg));
    }
    println!("SP {:06o}", cpu.regs.sp());
    println!("PC {:06o}", cpu.regs.pc());
    println!("PSW {:06o}", cpu.regs.psw());
    println!("state {:?}", cpu.run_state());
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let image = fs::read(&cli.image)
        .with_context(|| format!("reading image {}", cli.image.display()))?;
    let mut cpu = Cpu::new(config.clone()).context("invalid processor configuration")?;

    let input = spawn_stdin_reader(cpu.interrupt_signal()).context("starting console input")?;
    cpu.attach(CONSOLE_BASE, CONSOLE_END, Box::new(Dl11::new(input, io::stdout())))?;
    cpu.attach(CLOCK_BASE, CLOCK_END, Box::new(Kw11L::new()))?;
    cpu.boot_image(&image_words(&image))
        .with_context(|| format!("loading {}", cli.image.display()))?;

    let mut scheduler = Scheduler::new(&config);
    let count = if cli.step {
        single_step(&mut cpu, &mut scheduler, cli.max_batches)
    } else {
        run(&mut cpu, &mut scheduler, cli.max_batches)
    };
    log::info!("stopped after {count} batches");
    print_registers(&cpu);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{image_words, parse_octal, run, single_step};
    use pdp11_core::{CoreConfig, Cpu, RunState, Scheduler};

    #[test]
    fn octal_arguments_parse_with_or_without_prefix() {
        assert_eq!(parse_octal("1000"), Ok(0o1000));
        assert_eq!(parse_octal("0o177570"), Ok(0o177570));
        assert!(parse_octal("8").is_err());
        assert!(parse_octal("200000").is_err());
    }

    #[test]
    fn image_bytes_are_little_endian_words() {
        assert_eq!(image_words(&[0o300, 0o025, 0x34, 0x12, 7]), vec![0o012700, 0x1234, 7]);
        assert!(image_words(&[]).is_empty());
    }

    fn booted(program: &[u16]) -> (Cpu, Scheduler) {
        let config = CoreConfig {
            memory_bytes: 0o200000,
            ..CoreConfig::default()
        };
        let mut cpu = Cpu::new(config.clone()).expect("config must be valid");
        cpu.boot_image(program).expect("program must fit");
        (cpu, Scheduler::new(&config))
    }

    #[test]
    fn run_stops_on_halt() {
        // MOV #3,R0; HALT
        let (mut cpu, mut scheduler) = booted(&[0o012700, 3, 0]);
        assert_eq!(run(&mut cpu, &mut scheduler, None), 1);
        assert_eq!(cpu.regs.get(0), 3);
        assert_eq!(cpu.run_state(), RunState::Halt);
    }

    #[test]
    fn run_respects_the_batch_limit() {
        let (mut cpu, mut scheduler) = booted(&[0o000777]);
        assert_eq!(run(&mut cpu, &mut scheduler, Some(3)), 3);
        assert_eq!(cpu.run_state(), RunState::Run);
    }

    #[test]
    fn single_step_counts_instructions_through_halt() {
        // INC R0; INC R0; HALT
        let (mut cpu, mut scheduler) = booted(&[0o005200, 0o005200, 0]);
        assert_eq!(single_step(&mut cpu, &mut scheduler, None), 3);
        assert_eq!(cpu.regs.get(0), 2);
    }
}
