pub mod gpiod;
pub mod lcd;
pub mod mock;
pub mod raw;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// A GPIO subsystem that has to be opened before any pin can be used.
///
/// Opening yields a [GpioDriver] that stays valid until it's handed back to [Self::close]
/// (or dropped). Implementations decide what opening means: mapping registers, opening a
/// character device, or nothing at all.
pub trait GpioSubsystem: Debug {
    type Driver: GpioDriver;

    /// Opens the subsystem.
    fn open(&self) -> GpioResult<Self::Driver>;

    /// Closes a driver previously returned by [Self::open].
    ///
    /// The default implementation just drops it.
    fn close(&self, driver: Self::Driver) -> GpioResult<()> {
        drop(driver);
        Ok(())
    }
}

pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO pins available.
    fn count(&self) -> GpioResult<usize>;

    /// Gets the GPIO pin at the given index.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the index is out of range.
    /// - `GpioError::AlreadyInUse` if the pin is currently claimed.
    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>>;
}

pub trait GpioPin: Debug {
    /// Sets the GPIO pin function to output, allowing writing its state.
    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>>;
}

pub trait GpioOutput: Debug {
    /// Writes the state of the GPIO pin.
    fn write(&self, value: bool) -> GpioResult<()>;
}
