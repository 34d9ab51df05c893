#![no_main]

use libfuzzer_sys::fuzz_target;
use pdp11_core::{CoreConfig, Cpu, StepOutcome, MIN_MEMORY_BYTES};

const MAX_STEPS: usize = 512;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let Ok(mut cpu) = Cpu::new(CoreConfig {
        memory_bytes: MIN_MEMORY_BYTES,
        ..CoreConfig::default()
    }) else {
        return;
    };

    // The first word seeds the low vectors; the rest is the program.
    let seed = u16::from_le_bytes([data[0], data[1]]);
    for vector in (0..0o400).step_by(2) {
        cpu.memory.write_word(vector, seed.wrapping_add(vector as u16));
    }
    let words: Vec<u16> = data[2..]
        .chunks(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
        .collect();
    if cpu.boot_image(&words).is_err() {
        return;
    }

    for _ in 0..MAX_STEPS {
        match cpu.step() {
            StepOutcome::Halted | StepOutcome::Waiting | StepOutcome::Resetting => break,
            StepOutcome::Retired | StepOutcome::Faulted(_) => {}
        }
    }
});
