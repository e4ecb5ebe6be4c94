mod gpio;

use crate::lcd::hd44780::{ScreenError, ScreenResult};
pub use gpio::*;
use std::fmt::Debug;

pub trait HD44780Driver: Debug {
    /// Configures the bus lines, clears the display and returns the cursor home.
    ///
    /// Every other command fails with `ScreenError::NotInitialized` until this succeeds.
    fn init(&mut self) -> ScreenResult<()>;

    /// Gets whether [Self::init] has completed.
    fn is_initialized(&self) -> bool;

    /// Fails with `ScreenError::NotInitialized` unless [Self::init] has completed.
    fn ensure_initialized(&self) -> ScreenResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ScreenError::NotInitialized)
        }
    }

    /// Clears the display and sets the cursor to the home position.
    fn clear_screen(&mut self) -> ScreenResult<()> {
        self.send_command(0b00000001)
    }

    /// Sets the cursor to the home position.
    fn home(&mut self) -> ScreenResult<()> {
        self.send_command(0b00000010)
    }

    /// Selects one or two display lines and the 5x8 or 5x11 font.
    ///
    /// The 8-bit data length is always selected.
    fn set_screen_format(&mut self, two_lines: bool, font_5x11: bool) -> ScreenResult<()> {
        let mut command: u8 = 0b00100000 | 0b00010000;
        if two_lines {
            command |= 0b00001000;
        }
        if font_5x11 {
            command |= 0b00000100;
        }
        self.send_command(command.into())
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display(&mut self, on: bool, cursor: bool, blink: bool) -> ScreenResult<()> {
        let mut command: u8 = 0b00001000;
        if on {
            command |= 0b00000100;
        }
        if cursor {
            command |= 0b00000010;
        }
        if blink {
            command |= 0b00000001;
        }
        self.send_command(command.into())
    }

    /// Moves the cursor `n` positions, one instruction per position.
    ///
    /// The controller has no instruction for moving by more than one.
    fn move_cursor(&mut self, direction: CursorDirection, n: u8) -> ScreenResult<()> {
        self.ensure_initialized()?;

        let mut command: u8 = 0b00010000;
        if direction == CursorDirection::Right {
            command |= 0b00000100;
        }
        for _ in 0..n {
            self.send_command(command.into())?;
        }
        Ok(())
    }

    fn cursor_right(&mut self, n: u8) -> ScreenResult<()> {
        self.move_cursor(CursorDirection::Right, n)
    }

    fn cursor_left(&mut self, n: u8) -> ScreenResult<()> {
        self.move_cursor(CursorDirection::Left, n)
    }

    /// Sets the cursor to column `col` of the first or second line.
    ///
    /// # Errors
    /// - `ScreenError::InvalidCommand` if `col` is above `0x3F`, where it would spill into
    ///   the line select bit.
    fn set_cursor_position(&mut self, col: u8, second_line: bool) -> ScreenResult<()> {
        self.ensure_initialized()?;

        if col > 0b00111111 {
            return Err(ScreenError::InvalidCommand {
                value: col.into(),
                reason: "column does not fit in a display line",
            });
        }

        let mut command: u8 = 0b10000000 | col;
        if second_line {
            command |= 0b01000000;
        }
        self.send_command(command.into())
    }

    /// Writes `s` at the cursor, one character per transmission.
    ///
    /// The whole string is checked first, so either all characters are sent or none.
    ///
    /// # Errors
    /// - `ScreenError::InvalidCommand` if a character is above `U+00FF`.
    fn write_str(&mut self, s: &str) -> ScreenResult<()> {
        self.ensure_initialized()?;

        let bytes = s
            .chars()
            .map(|c| {
                u8::try_from(c).map_err(|_| ScreenError::InvalidCommand {
                    value: c.into(),
                    reason: "character is not in the controller's 8-bit character set",
                })
            })
            .collect::<ScreenResult<Vec<_>>>()?;

        for byte in bytes {
            self.send_data(byte.into())?;
        }
        Ok(())
    }

    // Low-level commands
    // These raw commands are used by the high-level functions above.

    /// Sends an instruction to the HD44780 controller.
    /// Sets the RS pin to 0 (command).
    fn send_command(&mut self, command: u32) -> ScreenResult<()>;

    /// Sends character data to the HD44780 controller.
    /// Sets the RS pin to 1 (data).
    fn send_data(&mut self, data: u32) -> ScreenResult<()>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    Left,
    Right,
}
