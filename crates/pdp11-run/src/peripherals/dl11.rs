//! DL11 console terminal: receiver and transmitter register pairs.
//!
//! Characters typed on the host arrive through a reader thread and are
//! latched into the receiver buffer one at a time on each bus tick.
//! Transmitted characters are written straight through, so the
//! transmitter is always ready.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use pdp11_core::bus::apply_cycle;
use pdp11_core::{BusCycle, BusError, Device, InterruptSignal};

/// First register address (receiver status).
pub const CONSOLE_BASE: u32 = 0o17777560;
/// Last register address (transmitter buffer, high byte).
pub const CONSOLE_END: u32 = 0o17777567;
/// Receiver interrupt vector.
pub const RECEIVER_VECTOR: u16 = 0o60;
/// Transmitter interrupt vector.
pub const TRANSMITTER_VECTOR: u16 = 0o64;

const RCSR: u32 = 0o17777560;
const RBUF: u32 = 0o17777562;
const XCSR: u32 = 0o17777564;
const XBUF: u32 = 0o17777566;

const PRIORITY: u8 = 4;
/// Receiver done / transmitter ready.
const CSR_DONE: u16 = 0o200;
const CSR_INTERRUPT_ENABLE: u16 = 0o100;

/// Bytes typed on the host, waiting for the receiver.
pub type InputQueue = Arc<Mutex<VecDeque<u8>>>;

/// Starts a thread that copies stdin into a new input queue.
///
/// Host line feeds become carriage returns. The thread ends at end of input.
///
/// # Errors
///
/// Returns the error from spawning the thread.
pub fn spawn_stdin_reader(signal: InterruptSignal) -> io::Result<InputQueue> {
    let queue = InputQueue::default();
    let shared = Arc::clone(&queue);
    thread::Builder::new()
        .name("console-input".to_owned())
        .spawn(move || {
            for byte in io::stdin().lock().bytes() {
                let Ok(byte) = byte else { break };
                let byte = if byte == b'\n' { b'\r' } else { byte };
                match shared.lock() {
                    Ok(mut pending) => pending.push_back(byte),
                    Err(_) => break,
                }
                signal.raise();
            }
            log::debug!("console input closed");
        })?;
    Ok(queue)
}

/// Console terminal writing to `W`.
pub struct Dl11<W> {
    input: InputQueue,
    output: W,
    rcsr: u16,
    rbuf: u16,
    xcsr: u16,
    receive_request: bool,
    transmit_request: bool,
}

impl<W: Write + Send> Dl11<W> {
    /// Creates an idle terminal reading from `input`.
    pub fn new(input: InputQueue, output: W) -> Self {
        Self {
            input,
            output,
            rcsr: 0,
            rbuf: 0,
            xcsr: CSR_DONE,
            receive_request: false,
            transmit_request: false,
        }
    }

    /// Moves the next typed character into the receiver buffer once the
    /// previous one has been read.
    fn latch_input(&mut self) -> bool {
        if self.rcsr & CSR_DONE != 0 {
            return false;
        }
        let Some(byte) = self.input.lock().ok().and_then(|mut pending| pending.pop_front()) else {
            return false;
        };
        self.rbuf = u16::from(byte);
        self.rcsr |= CSR_DONE;
        self.receive_request = self.rcsr & CSR_INTERRUPT_ENABLE != 0;
        self.receive_request
    }

    fn transmit(&mut self, byte: u8) {
        let byte = byte & 0o177;
        if let Err(error) = self
            .output
            .write_all(&[byte])
            .and_then(|()| self.output.flush())
        {
            log::warn!("console output failed: {error}");
        }
        self.transmit_request = self.xcsr & CSR_INTERRUPT_ENABLE != 0;
    }
}

/// Applies a status write: only interrupt enable is writable. Enabling
/// while done requests an interrupt; disabling withdraws it.
fn write_status(csr: &mut u16, request: &mut bool, value: u16) {
    let was_enabled = *csr & CSR_INTERRUPT_ENABLE != 0;
    *csr = (*csr & CSR_DONE) | (value & CSR_INTERRUPT_ENABLE);
    if *csr & CSR_INTERRUPT_ENABLE == 0 {
        *request = false;
    } else if !was_enabled && *csr & CSR_DONE != 0 {
        *request = true;
    }
}

impl<W: Write + Send> Device for Dl11<W> {
    fn name(&self) -> &str {
        "DL11"
    }

    fn access(&mut self, addr: u32, cycle: BusCycle) -> Result<u16, BusError> {
        match addr & !1 {
            RCSR => {
                if cycle.is_write() {
                    let value = apply_cycle(self.rcsr, addr, cycle);
                    write_status(&mut self.rcsr, &mut self.receive_request, value);
                }
                Ok(self.rcsr)
            }
            RBUF => {
                if !cycle.is_write() {
                    self.rcsr &= !CSR_DONE;
                    self.receive_request = false;
                }
                Ok(self.rbuf)
            }
            XCSR => {
                if cycle.is_write() {
                    let value = apply_cycle(self.xcsr, addr, cycle);
                    write_status(&mut self.xcsr, &mut self.transmit_request, value);
                }
                Ok(self.xcsr)
            }
            XBUF => {
                match cycle {
                    BusCycle::Write(value) => self.transmit(value.to_le_bytes()[0]),
                    BusCycle::WriteByte(byte) if addr & 1 == 0 => self.transmit(byte),
                    _ => {}
                }
                Ok(0)
            }
            _ => Err(BusError::NoResponse { addr }),
        }
    }

    fn interrupt_priority(&self) -> u8 {
        if self.receive_request || self.transmit_request {
            PRIORITY
        } else {
            0
        }
    }

    fn take_interrupt(&mut self) -> Option<u16> {
        if self.receive_request {
            self.receive_request = false;
            Some(RECEIVER_VECTOR)
        } else if self.transmit_request {
            self.transmit_request = false;
            Some(TRANSMITTER_VECTOR)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.rcsr = 0;
        self.xcsr = CSR_DONE;
        self.receive_request = false;
        self.transmit_request = false;
    }

    fn tick(&mut self, _now: Instant) -> bool {
        self.latch_input()
    }
}

#[cfg(test)]
mod tests {
    use super::{Dl11, InputQueue, RBUF, RCSR, RECEIVER_VECTOR, TRANSMITTER_VECTOR, XBUF, XCSR};
    use pdp11_core::{BusCycle, BusError, Device};
    use rstest::rstest;
    use std::time::Instant;

    fn terminal(typed: &[u8]) -> Dl11<Vec<u8>> {
        let input = InputQueue::default();
        input
            .lock()
            .expect("fresh queue")
            .extend(typed.iter().copied());
        Dl11::new(input, Vec::new())
    }

    #[test]
    fn typed_character_is_latched_and_read_once() {
        let mut dl11 = terminal(b"ab");
        assert!(!dl11.tick(Instant::now()));
        assert_eq!(dl11.access(RCSR, BusCycle::Read), Ok(0o200));
        assert_eq!(dl11.access(RBUF, BusCycle::Read), Ok(u16::from(b'a')));
        assert_eq!(dl11.access(RCSR, BusCycle::Read), Ok(0));

        dl11.tick(Instant::now());
        assert_eq!(dl11.access(RBUF, BusCycle::Read), Ok(u16::from(b'b')));
    }

    #[test]
    fn receiver_interrupt_follows_enable() {
        let mut dl11 = terminal(b"x");
        assert_eq!(dl11.access(RCSR, BusCycle::Write(0o100)), Ok(0o100));
        assert!(dl11.tick(Instant::now()));
        assert_eq!(dl11.interrupt_priority(), 4);
        assert_eq!(dl11.take_interrupt(), Some(RECEIVER_VECTOR));
        assert_eq!(dl11.interrupt_priority(), 0);
    }

    #[rstest]
    #[case::word(BusCycle::Write(0o110))]
    #[case::low_byte(BusCycle::WriteByte(0o110))]
    fn transmitted_characters_reach_the_output(#[case] cycle: BusCycle) {
        let mut dl11 = terminal(b"");
        dl11.access(XBUF, cycle).expect("transmitter buffer answers");
        assert_eq!(dl11.output, b"H");
        assert_eq!(dl11.access(XCSR, BusCycle::Read), Ok(0o200));
    }

    #[test]
    fn enabling_a_ready_transmitter_requests_an_interrupt() {
        let mut dl11 = terminal(b"");
        dl11.access(XCSR, BusCycle::Write(0o100)).expect("status answers");
        assert_eq!(dl11.take_interrupt(), Some(TRANSMITTER_VECTOR));
        dl11.access(XBUF, BusCycle::Write(u16::from(b'!')))
            .expect("transmitter buffer answers");
        assert_eq!(dl11.take_interrupt(), Some(TRANSMITTER_VECTOR));

        dl11.reset();
        assert_eq!(dl11.interrupt_priority(), 0);
        assert_eq!(dl11.access(XCSR, BusCycle::Read), Ok(0o200));
    }

    #[test]
    fn unknown_register_does_not_answer() {
        let mut dl11 = terminal(b"");
        assert_eq!(
            dl11.access(0o17777570, BusCycle::Read),
            Err(BusError::NoResponse { addr: 0o17777570 })
        );
    }
}
