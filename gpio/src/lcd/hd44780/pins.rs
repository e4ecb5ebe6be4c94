use crate::lcd::hd44780::{ScreenError, ScreenResult};
use std::fmt::{Display, Formatter};

/// One of the 11 signals of the 8-bit HD44780 interface.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinRole {
    /// Data line D0..D7.
    Data(u8),
    /// Register select: low for instructions, high for character data.
    Rs,
    /// Read/write select. Always driven low, this driver only writes.
    Rw,
    /// Enable strobe; the controller latches the data lines on its falling edge.
    E,
}

impl Display for PinRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PinRole::Data(n) => write!(f, "D{}", n),
            PinRole::Rs => write!(f, "RS"),
            PinRole::Rw => write!(f, "RW"),
            PinRole::E => write!(f, "E"),
        }
    }
}

/// Maps every [PinRole] to a GPIO line number.
///
/// Immutable once built. All 11 lines are guaranteed to be distinct; whether they exist on
/// the chip is only known once a session claims them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinBinding {
    data: [usize; 8],
    rs: usize,
    rw: usize,
    e: usize,
}

impl PinBinding {
    /// Amount of lines in the binding.
    pub const LEN: usize = 11;

    /// Creates a binding from the data lines (D0 first) and the control lines.
    ///
    /// # Errors
    /// - `ScreenError::DuplicatePin` if two roles share a line.
    pub fn new(data: [usize; 8], rs: usize, rw: usize, e: usize) -> ScreenResult<Self> {
        let binding = PinBinding { data, rs, rw, e };

        let roles: Vec<_> = binding.iter().collect();
        for (i, &(first, pin)) in roles.iter().enumerate() {
            if let Some(&(second, _)) = roles[i + 1..].iter().find(|(_, other)| *other == pin) {
                return Err(ScreenError::DuplicatePin { pin, first, second });
            }
        }

        Ok(binding)
    }

    /// Gets the line of data bit `n` (0 is the least significant). `n` must be in `0..8`.
    pub(crate) fn data(&self, n: usize) -> usize {
        self.data[n]
    }

    pub fn rs(&self) -> usize {
        self.rs
    }

    pub fn rw(&self) -> usize {
        self.rw
    }

    pub fn e(&self) -> usize {
        self.e
    }

    /// Iterates over all roles and their lines, in the order D0..D7, RS, RW, E.
    pub fn iter(&self) -> impl Iterator<Item = (PinRole, usize)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(|(n, &pin)| (PinRole::Data(n as u8), pin))
            .chain([
                (PinRole::Rs, self.rs),
                (PinRole::Rw, self.rw),
                (PinRole::E, self.e),
            ])
    }
}
