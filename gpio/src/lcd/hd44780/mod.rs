//! HD44780 character LCD over an 8-bit parallel bus, bit-banged on GPIO lines.
//!
//! The layers, leaf first:
//! - [PinBinding] maps the 11 bus signals to GPIO lines.
//! - [Transmitter] puts a single byte on the bus and strobes it in.
//! - [HD44780Driver] composes instruction bytes for the higher level operations.
//! - [GpioHD44780Driver] ties it together and guards everything behind initialization.
//!
//! Nothing here is synchronized. A display is meant to have one owner; sharing it between
//! threads needs an external `Mutex`, since two interleaved transmissions would corrupt the
//! bus mid-pulse.

pub mod driver;
mod pins;
#[cfg(test)]
mod testing;
mod transmit;

use crate::GpioError;
pub use driver::*;
pub use pins::*;
pub use transmit::*;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum ScreenError {
    /// The GPIO subsystem couldn't be opened or closed.
    ///
    /// Nothing was driven if opening failed. A failed close comes after the transmission
    /// finished.
    #[error("GPIO subsystem unavailable: {0}")]
    DeviceUnavailable(GpioError),
    /// A command was issued before [HD44780Driver::init] completed.
    #[error("display is not initialized")]
    NotInitialized,
    /// A value can't be represented on the bus or addressed on the controller.
    #[error("invalid command {value:#x}: {reason}")]
    InvalidCommand { value: u32, reason: &'static str },
    #[error("GPIO {pin} is bound to both {first} and {second}")]
    DuplicatePin {
        pin: usize,
        first: PinRole,
        second: PinRole,
    },
    /// Claiming or driving a line failed while a session was open.
    ///
    /// The bus may be left in an indeterminate state; re-issue the whole command.
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),
}

pub type ScreenResult<T> = Result<T, ScreenError>;
