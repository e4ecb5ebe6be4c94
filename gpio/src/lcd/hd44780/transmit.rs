use crate::lcd::hd44780::{PinBinding, ScreenError, ScreenResult};
use crate::{GpioDriver, GpioOutput, GpioResult, GpioSubsystem};
use log::{debug, trace, warn};
use std::thread::sleep;
use std::time::Duration;

/// Renders `value` as 8 binary digits, most significant bit first.
///
/// # Errors
/// - `ScreenError::InvalidCommand` if `value` doesn't fit in 8 bits.
pub fn encode(value: u32) -> ScreenResult<String> {
    let byte = u8::try_from(value).map_err(|_| ScreenError::InvalidCommand {
        value,
        reason: "does not fit in 8 bits",
    })?;
    Ok(format!("{:08b}", byte))
}

/// Minimum delays of a transmission.
///
/// These are lower bounds. `std::thread::sleep` may (and on most schedulers will) overshoot
/// them, especially the sub-microsecond enable pulse, which is fine for the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Timing {
    /// Hold time between driving RS, RW and the data lines and raising E.
    pub setup: Duration,
    /// Width of the E pulse.
    pub enable_pulse: Duration,
    /// Wait after a regular instruction or character so the controller can execute it.
    pub settle: Duration,
    /// Wait after Clear Display and Return Home, which take about 1.52 ms.
    pub long_settle: Duration,
}

impl Timing {
    /// No delays at all. Only useful with backends that aren't wired to a real controller.
    pub const NONE: Timing = Timing {
        setup: Duration::ZERO,
        enable_pulse: Duration::ZERO,
        settle: Duration::ZERO,
        long_settle: Duration::ZERO,
    };

    fn settle_after(&self, value: u32, data_mode: bool) -> Duration {
        if !data_mode && value <= 0b00000011 {
            self.long_settle
        } else {
            self.settle
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            setup: Duration::from_micros(500),
            enable_pulse: Duration::from_nanos(500),
            settle: Duration::from_micros(50),
            long_settle: Duration::from_millis(2),
        }
    }
}

/// When the GPIO subsystem is opened and closed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SessionPolicy {
    /// Open and close the subsystem around every single transmission.
    ///
    /// Slow, but a failure never outlives the transmission that caused it.
    #[default]
    PerTransmission,
    /// Open the subsystem once and keep it until the display is shut down or dropped.
    Persistent,
}

/// Puts bytes on the 8-bit HD44780 bus.
#[derive(Debug)]
pub struct Transmitter<S: GpioSubsystem> {
    subsystem: S,
    pins: PinBinding,
    timing: Timing,
    session: Option<S::Driver>,
}

impl<S: GpioSubsystem> Transmitter<S> {
    pub fn new(subsystem: S, pins: PinBinding) -> Self {
        Transmitter {
            subsystem,
            pins,
            timing: Timing::default(),
            session: None,
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn pins(&self) -> &PinBinding {
        &self.pins
    }

    /// Whether a persistent session is currently held.
    pub fn is_session_open(&self) -> bool {
        self.session.is_some()
    }

    /// Opens the subsystem and keeps it for all following transmissions.
    ///
    /// Does nothing if a session is already held.
    pub fn open_session(&mut self) -> ScreenResult<()> {
        if self.session.is_none() {
            let driver = self.subsystem.open().map_err(ScreenError::DeviceUnavailable)?;
            debug!("Holding GPIO session {:?}", driver);
            self.session = Some(driver);
        }
        Ok(())
    }

    /// Closes the session held since [Self::open_session], if any.
    pub fn close_session(&mut self) -> ScreenResult<()> {
        if let Some(driver) = self.session.take() {
            debug!("Releasing GPIO session {:?}", driver);
            self.subsystem.close(driver).map_err(ScreenError::DeviceUnavailable)?;
        }
        Ok(())
    }

    /// Configures every bound line as an output and drives it low.
    pub fn reset_lines(&self) -> ScreenResult<()> {
        self.with_session(|driver| Ok(with_bus(driver, &self.pins, |bus| bus.idle())?))
    }

    /// Sends a single byte, as an instruction or, with `data_mode`, as character data.
    ///
    /// The value is checked before anything is opened or driven. Once the byte is latched,
    /// every line is left low.
    pub fn transmit(&self, value: u32, data_mode: bool) -> ScreenResult<()> {
        let bits = encode(value)?;
        trace!("Sending data: {}, RS: {}", bits, data_mode);

        self.with_session(|driver| {
            Ok(with_bus(driver, &self.pins, |bus| {
                let sent = self.strobe(bus, &bits, data_mode);
                // Leave the bus idle even if the strobe failed halfway.
                let idle = bus.idle();
                sent.and(idle)
            })?)
        })?;

        sleep(self.timing.settle_after(value, data_mode));
        Ok(())
    }

    fn strobe(&self, bus: &Bus<'_>, bits: &str, data_mode: bool) -> GpioResult<()> {
        bus.rs().write(false)?;
        if data_mode {
            bus.rs().write(true)?;
        }
        bus.rw().write(false)?;

        // Bits are MSB first while the lines are numbered from the LSB:
        // d7 d6 d5 d4 d3 d2 d1 d0
        // 0  1  2  3  4  5  6  7
        for (i, bit) in bits.chars().enumerate() {
            bus.data(7 - i).write(bit == '1')?;
        }

        sleep(self.timing.setup);
        bus.e().write(true)?;
        sleep(self.timing.enable_pulse);
        bus.e().write(false)?;
        Ok(())
    }

    /// Runs `f` inside a session: the held one, or a fresh one that's closed right after,
    /// whatever `f` returns.
    fn with_session<T>(&self, f: impl FnOnce(&S::Driver) -> ScreenResult<T>) -> ScreenResult<T> {
        if let Some(driver) = &self.session {
            return f(driver);
        }

        let driver = self.subsystem.open().map_err(ScreenError::DeviceUnavailable)?;
        let result = f(&driver);
        let closed = self.subsystem.close(driver).map_err(ScreenError::DeviceUnavailable);

        match (result, closed) {
            (Ok(value), closed) => closed.map(|()| value),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                warn!("Couldn't close GPIO subsystem after a failed transmission: {}", close_err);
                Err(err)
            }
        }
    }
}

/// The claimed output lines of one session, ordered like [PinBinding::iter].
struct Bus<'a> {
    lines: Vec<Box<dyn GpioOutput + 'a>>,
}

impl Bus<'_> {
    const RS: usize = 8;
    const RW: usize = 9;
    const E: usize = 10;

    fn data(&self, n: usize) -> &dyn GpioOutput {
        &*self.lines[n]
    }

    fn rs(&self) -> &dyn GpioOutput {
        &*self.lines[Self::RS]
    }

    fn rw(&self) -> &dyn GpioOutput {
        &*self.lines[Self::RW]
    }

    fn e(&self) -> &dyn GpioOutput {
        &*self.lines[Self::E]
    }

    /// Drives E low first, then everything else.
    ///
    /// Every line is attempted even if an earlier one fails; the first error is returned.
    fn idle(&self) -> GpioResult<()> {
        let mut result = self.e().write(false);
        for line in &self.lines[..Self::E] {
            let written = line.write(false);
            if result.is_ok() {
                result = written;
            }
        }
        result
    }
}

/// Claims every bound line as an output for the duration of `f`.
fn with_bus<D: GpioDriver, T>(
    driver: &D,
    pins: &PinBinding,
    f: impl FnOnce(&Bus<'_>) -> GpioResult<T>,
) -> GpioResult<T> {
    let mut claimed = pins
        .iter()
        .map(|(_, pin)| driver.get_pin(pin))
        .collect::<GpioResult<Vec<_>>>()?;
    let lines = claimed
        .iter_mut()
        .map(|pin| pin.as_output())
        .collect::<GpioResult<Vec<_>>>()?;
    let bus = Bus { lines };
    f(&bus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpioError;
    use crate::lcd::hd44780::testing::{latched, test_pins, Latched};
    use crate::mock::{MockEvent, MockGpioSubsystem};

    fn transmitter() -> (MockGpioSubsystem, Transmitter<MockGpioSubsystem>) {
        let gpio = MockGpioSubsystem::new(28);
        let transmitter = Transmitter::new(gpio.clone(), test_pins()).with_timing(Timing::NONE);
        (gpio, transmitter)
    }

    #[test]
    fn encodes_every_byte_msb_first() {
        for n in 0..=255u32 {
            let bits = encode(n).unwrap();
            assert_eq!(bits.len(), 8);
            assert!(bits.chars().all(|c| c == '0' || c == '1'));
            assert_eq!(u32::from_str_radix(&bits, 2).unwrap(), n);
        }
        assert_eq!(encode(0x05).unwrap(), "00000101");
        assert_eq!(encode(0xC5).unwrap(), "11000101");
    }

    #[test]
    fn rejects_values_wider_than_a_byte() {
        assert_eq!(
            encode(256).unwrap_err(),
            ScreenError::InvalidCommand {
                value: 256,
                reason: "does not fit in 8 bits"
            }
        );

        let (gpio, transmitter) = transmitter();
        assert!(matches!(
            transmitter.transmit(0x1FF, false),
            Err(ScreenError::InvalidCommand { value: 0x1FF, .. })
        ));
        assert!(gpio.events().is_empty());
    }

    #[test]
    fn most_significant_bit_drives_d7() {
        let (gpio, transmitter) = transmitter();
        let pins = test_pins();
        transmitter.transmit(0b10000000, false).unwrap();

        let writes: Vec<_> = gpio
            .events()
            .into_iter()
            .filter_map(|event| match event {
                MockEvent::Write(pin, value) => Some((pin, value)),
                _ => None,
            })
            .collect();

        // RS low, RW low, then D7 down to D0.
        let data_writes = &writes[2..10];
        for (i, &(pin, value)) in data_writes.iter().enumerate() {
            assert_eq!(pin, pins.data(7 - i));
            assert_eq!(value, i == 0);
        }
    }

    #[test]
    fn latches_byte_and_leaves_bus_idle() {
        let (gpio, transmitter) = transmitter();
        transmitter.transmit(0x41, true).unwrap();

        assert_eq!(
            latched(&gpio.events(), &test_pins()),
            vec![Latched { byte: 0x41, rs: true, rw: false }]
        );

        let levels = gpio.levels();
        for (role, pin) in test_pins().iter() {
            assert_eq!(levels[pin], Some(false), "{} not idle", role);
        }
    }

    #[test]
    fn brackets_every_transmission_with_a_session() {
        let (gpio, transmitter) = transmitter();
        transmitter.transmit(0x01, false).unwrap();
        transmitter.transmit(0x02, false).unwrap();

        let sessions: Vec<_> = gpio
            .events()
            .into_iter()
            .filter(|event| matches!(event, MockEvent::Open | MockEvent::Close))
            .collect();
        assert_eq!(
            sessions,
            vec![MockEvent::Open, MockEvent::Close, MockEvent::Open, MockEvent::Close]
        );
    }

    #[test]
    fn held_session_is_reused() {
        let (gpio, mut transmitter) = transmitter();
        transmitter.open_session().unwrap();
        transmitter.transmit(0x0E, false).unwrap();
        transmitter.transmit(0x38, false).unwrap();
        assert!(transmitter.is_session_open());
        transmitter.close_session().unwrap();

        let events = gpio.events();
        assert_eq!(events.first(), Some(&MockEvent::Open));
        assert_eq!(events.last(), Some(&MockEvent::Close));
        assert_eq!(events.iter().filter(|e| **e == MockEvent::Open).count(), 1);
        assert_eq!(latched(&events, &test_pins()).len(), 2);
    }

    #[test]
    fn unavailable_subsystem_drives_nothing() {
        let (gpio, transmitter) = transmitter();
        gpio.set_fail_open(true);

        assert!(matches!(
            transmitter.transmit(0x01, false),
            Err(ScreenError::DeviceUnavailable(GpioError::Io(_)))
        ));
        assert!(gpio.events().is_empty());
    }

    #[test]
    fn failed_write_still_idles_and_closes() {
        let (gpio, transmitter) = transmitter();
        let pins = test_pins();
        gpio.set_fail_write(Some(pins.data(3)));

        assert!(matches!(
            transmitter.transmit(0xFF, false),
            Err(ScreenError::Gpio(GpioError::Other(_)))
        ));

        let events = gpio.events();
        assert_eq!(events.last(), Some(&MockEvent::Close));
        assert!(latched(&events, &pins).is_empty());
        // The idle pass keeps going past D3, so everything it could write ends low.
        let levels = gpio.levels();
        for (role, pin) in pins.iter() {
            if pin == pins.data(3) {
                assert_eq!(levels[pin], None);
            } else {
                assert_eq!(levels[pin], Some(false), "{} left high", role);
            }
        }
    }
}
