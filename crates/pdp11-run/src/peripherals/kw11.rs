//! KW11-L line clock.

use std::time::{Duration, Instant};

use pdp11_core::bus::apply_cycle;
use pdp11_core::{BusCycle, BusError, Device};

/// First address of the clock's dispatcher slot.
pub const CLOCK_BASE: u32 = 0o17777540;
/// Last address of the clock's dispatcher slot.
pub const CLOCK_END: u32 = 0o17777547;
/// Clock status register.
pub const LKS: u32 = 0o17777546;
/// Clock interrupt vector.
pub const CLOCK_VECTOR: u16 = 0o100;
/// Interval between line-clock ticks (50 Hz).
pub const TICK_PERIOD: Duration = Duration::from_millis(20);

const PRIORITY: u8 = 6;
const LKS_MONITOR: u16 = 0o200;
const LKS_INTERRUPT_ENABLE: u16 = 0o100;

/// Line clock raising a level-6 interrupt every tick while enabled.
#[derive(Debug, Default)]
pub struct Kw11L {
    lks: u16,
    request: bool,
    next_tick: Option<Instant>,
}

impl Kw11L {
    /// Creates a disabled clock; the first tick is one period after the
    /// first bus tick.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Device for Kw11L {
    fn name(&self) -> &str {
        "KW11-L"
    }

    fn access(&mut self, addr: u32, cycle: BusCycle) -> Result<u16, BusError> {
        if addr & !1 != LKS {
            return Err(BusError::NoResponse { addr });
        }
        if cycle.is_write() {
            let value = apply_cycle(self.lks, addr, cycle);
            // Software can clear the monitor bit but never set it.
            self.lks = (value & LKS_INTERRUPT_ENABLE) | (self.lks & value & LKS_MONITOR);
            if self.lks & LKS_INTERRUPT_ENABLE == 0 {
                self.request = false;
            }
        }
        Ok(self.lks)
    }

    fn interrupt_priority(&self) -> u8 {
        if self.request {
            PRIORITY
        } else {
            0
        }
    }

    fn take_interrupt(&mut self) -> Option<u16> {
        std::mem::take(&mut self.request).then_some(CLOCK_VECTOR)
    }

    fn reset(&mut self) {
        self.lks = 0;
        self.request = false;
    }

    fn tick(&mut self, now: Instant) -> bool {
        let due = *self.next_tick.get_or_insert(now + TICK_PERIOD);
        if now < due {
            return false;
        }
        // A stalled host drops the ticks it missed.
        let next = due + TICK_PERIOD;
        self.next_tick = Some(if next <= now { now + TICK_PERIOD } else { next });
        self.lks |= LKS_MONITOR;
        if self.lks & LKS_INTERRUPT_ENABLE != 0 {
            self.request = true;
        }
        self.request
    }
}
