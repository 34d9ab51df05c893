//! Reference peripherals attached by the runner.

/// Console terminal.
pub mod dl11;
pub use dl11::{spawn_stdin_reader, Dl11, CONSOLE_BASE, CONSOLE_END};

/// Line clock.
pub mod kw11;
pub use kw11::{Kw11L, CLOCK_BASE, CLOCK_END};
