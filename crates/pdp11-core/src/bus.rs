//! Peripheral device contract and the I/O page dispatch table.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::api::ConfigError;
use crate::memory::{IO_PAGE_BASE, IO_PAGE_END};

/// Register granularity of dispatcher slots in bytes.
pub const SLOT_BYTES: u32 = 8;
/// Number of dispatcher slots covering the I/O page.
pub const SLOT_COUNT: usize = ((IO_PAGE_END - IO_PAGE_BASE + 1) / SLOT_BYTES) as usize;

/// One bus transfer presented to a device register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusCycle {
    /// Word read.
    Read,
    /// Byte read; the device returns the whole word and the bus extracts the byte.
    ReadByte,
    /// Word write.
    Write(u16),
    /// Byte write into the half selected by the address.
    WriteByte(u8),
}

impl BusCycle {
    /// Returns `true` for write cycles.
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write(_) | Self::WriteByte(_))
    }
}

/// Device-side failure of a bus transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BusError {
    /// No register answers at this address.
    #[error("no device register at {addr:#o}")]
    NoResponse {
        /// Physical address of the failed transfer.
        addr: u32,
    },
    /// The register exists but rejects this kind of transfer.
    #[error("device register at {addr:#o} rejected the transfer")]
    Rejected {
        /// Physical address of the failed transfer.
        addr: u32,
    },
}

/// Merges a byte into the half of `word` selected by bit 0 of `addr`.
#[must_use]
pub const fn merge_byte(word: u16, addr: u32, byte: u8) -> u16 {
    if addr & 1 == 0 {
        (word & 0xff00) | byte as u16
    } else {
        (word & 0x00ff) | ((byte as u16) << 8)
    }
}

/// Applies a write cycle to a register value, returning the new value.
///
/// Read cycles return `current` unchanged.
#[must_use]
pub const fn apply_cycle(current: u16, addr: u32, cycle: BusCycle) -> u16 {
    match cycle {
        BusCycle::Read | BusCycle::ReadByte => current,
        BusCycle::Write(value) => value,
        BusCycle::WriteByte(byte) => merge_byte(current, addr, byte),
    }
}

/// A peripheral controller attached to the I/O page.
pub trait Device: Send {
    /// Short device name used in logs.
    fn name(&self) -> &str;

    /// Performs one register transfer and returns the register's (merged) value.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when no register answers; the processor reports it
    /// as a bus timeout.
    fn access(&mut self, addr: u32, cycle: BusCycle) -> Result<u16, BusError>;

    /// Priority level (`1..=7`) of the highest pending interrupt request, or 0.
    fn interrupt_priority(&self) -> u8 {
        0
    }

    /// Consumes the pending request that [`Device::interrupt_priority`]
    /// reported and returns its vector.
    fn take_interrupt(&mut self) -> Option<u16> {
        None
    }

    /// Reinitialises device latches (RESET instruction, console reset, power-up).
    fn reset(&mut self) {}

    /// Advances time-driven state; returns `true` when a new interrupt
    /// request may have been raised.
    fn tick(&mut self, _now: Instant) -> bool {
        false
    }
}

/// Shared flag peripherals raise from any thread to request an interrupt review.
#[derive(Debug, Clone, Default)]
pub struct InterruptSignal(Arc<AtomicBool>);

impl InterruptSignal {
    /// Creates a lowered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests an interrupt review at the next instruction boundary.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` while a review is requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Lowers the signal, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

/// Handle of a registered device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(usize);

impl DeviceId {
    /// Registration order index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Address-range dispatch table routing I/O page transfers to devices.
pub struct Dispatcher {
    devices: Vec<Box<dyn Device>>,
    slots: Vec<Option<DeviceId>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field(
                "devices",
                &self.devices.iter().map(|d| d.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            slots: vec![None; SLOT_COUNT],
        }
    }

    /// Registers `device` on the inclusive physical range `start..=end`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the range is empty, leaves the I/O page,
    /// is not aligned to an 8-byte slot, or overlaps a registered device.
    pub fn attach(
        &mut self,
        start: u32,
        end: u32,
        device: Box<dyn Device>,
    ) -> Result<DeviceId, ConfigError> {
        if start > end || start < IO_PAGE_BASE || end > IO_PAGE_END {
            return Err(ConfigError::DeviceOutsideIoPage { start, end });
        }
        if start % SLOT_BYTES != 0 {
            return Err(ConfigError::DeviceMisaligned { start });
        }

        let first = slot_index(start);
        let last = slot_index(end);
        if let Some(owner) = self.slots[first..=last].iter().flatten().next() {
            return Err(ConfigError::DeviceOverlap {
                start,
                end,
                existing: self.devices[owner.0].name().to_owned(),
            });
        }

        let id = DeviceId(self.devices.len());
        log::debug!("attach {} at {start:#o}..={end:#o}", device.name());
        self.devices.push(device);
        self.slots[first..=last].fill(Some(id));
        Ok(id)
    }

    /// Number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` when no device is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Routes one transfer to the device owning `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoResponse`] when no device owns the slot, or the
    /// owning device's error.
    pub fn access(&mut self, addr: u32, cycle: BusCycle) -> Result<u16, BusError> {
        if !(IO_PAGE_BASE..=IO_PAGE_END).contains(&addr) {
            return Err(BusError::NoResponse { addr });
        }
        match self.slots[slot_index(addr)] {
            Some(id) => self.devices[id.0].access(addr, cycle),
            None => Err(BusError::NoResponse { addr }),
        }
    }

    /// Highest pending device request as `(device, priority)`.
    ///
    /// Ties resolve to the earliest registered device.
    #[must_use]
    pub fn highest_request(&self) -> Option<(DeviceId, u8)> {
        let mut best: Option<(DeviceId, u8)> = None;
        for (index, device) in self.devices.iter().enumerate() {
            let priority = device.interrupt_priority();
            let better = match best {
                Some((_, level)) => priority > level,
                None => priority > 0,
            };
            if better {
                best = Some((DeviceId(index), priority));
            }
        }
        best
    }

    /// Consumes the pending request of `id`, returning its vector.
    pub fn take_interrupt(&mut self, id: DeviceId) -> Option<u16> {
        self.devices.get_mut(id.0).and_then(|device| device.take_interrupt())
    }

    /// Resets every registered device.
    pub fn reset(&mut self) {
        for device in &mut self.devices {
            device.reset();
        }
    }

    /// Ticks every device; returns `true` when any device may have raised a request.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut raised = false;
        for device in &mut self.devices {
            raised |= device.tick(now);
        }
        raised
    }
}

const fn slot_index(addr: u32) -> usize {
    ((addr - IO_PAGE_BASE) / SLOT_BYTES) as usize
}

#[cfg(test)]
mod tests {
    use super::{apply_cycle, merge_byte, BusCycle, BusError, Device, Dispatcher, InterruptSignal};
    use crate::api::ConfigError;

    struct Latch {
        name: &'static str,
        value: u16,
        priority: u8,
        vector: u16,
        resets: u32,
    }

    impl Latch {
        fn boxed(name: &'static str, priority: u8, vector: u16) -> Box<Self> {
            Box::new(Self {
                name,
                value: 0,
                priority,
                vector,
                resets: 0,
            })
        }
    }

    impl Device for Latch {
        fn name(&self) -> &str {
            self.name
        }

        fn access(&mut self, addr: u32, cycle: BusCycle) -> Result<u16, BusError> {
            self.value = apply_cycle(self.value, addr, cycle);
            Ok(self.value)
        }

        fn interrupt_priority(&self) -> u8 {
            self.priority
        }

        fn take_interrupt(&mut self) -> Option<u16> {
            (self.priority > 0).then(|| {
                self.priority = 0;
                self.vector
            })
        }

        fn reset(&mut self) {
            self.resets += 1;
            self.value = 0;
        }
    }

    #[test]
    fn byte_merge_selects_half_by_address_parity() {
        assert_eq!(merge_byte(0o177777, 0o100, 0), 0o177400);
        assert_eq!(merge_byte(0o177777, 0o101, 0), 0o000377);
        assert_eq!(apply_cycle(7, 0, BusCycle::Read), 7);
    }

    #[test]
    fn transfers_route_to_owning_device() {
        let mut bus = Dispatcher::new();
        bus.attach(0o17777560, 0o17777567, Latch::boxed("tty", 0, 0))
            .expect("attach must succeed");

        assert_eq!(bus.access(0o17777562, BusCycle::Write(0o123)), Ok(0o123));
        assert_eq!(bus.access(0o17777560, BusCycle::Read), Ok(0o123));
        assert_eq!(
            bus.access(0o17777570, BusCycle::Read),
            Err(BusError::NoResponse { addr: 0o17777570 })
        );
    }

    #[test]
    fn overlapping_and_misaligned_ranges_are_rejected() {
        let mut bus = Dispatcher::new();
        bus.attach(0o17777560, 0o17777567, Latch::boxed("tty", 0, 0))
            .expect("attach must succeed");

        assert!(matches!(
            bus.attach(0o17777550, 0o17777563, Latch::boxed("dup", 0, 0)),
            Err(ConfigError::DeviceOverlap { .. })
        ));
        assert!(matches!(
            bus.attach(0o17777502, 0o17777507, Latch::boxed("odd", 0, 0)),
            Err(ConfigError::DeviceMisaligned { .. })
        ));
        assert!(matches!(
            bus.attach(0o1000, 0o1007, Latch::boxed("ram", 0, 0)),
            Err(ConfigError::DeviceOutsideIoPage { .. })
        ));
        assert_eq!(bus.len(), 1);
    }

    #[test]
    fn arbitration_prefers_higher_level_then_registration_order() {
        let mut bus = Dispatcher::new();
        let low = bus
            .attach(0o17777500, 0o17777507, Latch::boxed("a", 4, 0o60))
            .expect("attach must succeed");
        let high = bus
            .attach(0o17777510, 0o17777517, Latch::boxed("b", 6, 0o100))
            .expect("attach must succeed");
        bus.attach(0o17777520, 0o17777527, Latch::boxed("c", 6, 0o104))
            .expect("attach must succeed");

        assert_eq!(bus.highest_request(), Some((high, 6)));
        assert_eq!(bus.take_interrupt(high), Some(0o100));
        assert_eq!(bus.highest_request().map(|(_, level)| level), Some(6));
        assert_ne!(bus.highest_request().map(|(id, _)| id), Some(low));
    }

    #[test]
    fn interrupt_signal_is_consumed_once() {
        let signal = InterruptSignal::new();
        let remote = signal.clone();
        remote.raise();
        assert!(signal.is_raised());
        assert!(signal.take());
        assert!(!signal.take());
    }
}
