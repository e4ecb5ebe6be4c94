use crate::GpioSubsystem;
use crate::lcd::hd44780::driver::HD44780Driver;
use crate::lcd::hd44780::{PinBinding, ScreenResult, SessionPolicy, Timing, Transmitter};
use log::{debug, warn};

/// HD44780 display on an 8-bit bus of directly driven GPIO lines.
#[derive(Debug)]
pub struct GpioHD44780Driver<S: GpioSubsystem> {
    transmitter: Transmitter<S>,
    policy: SessionPolicy,
    initialized: bool,
}

impl<S: GpioSubsystem> GpioHD44780Driver<S> {
    pub fn new(subsystem: S, pins: PinBinding) -> Self {
        GpioHD44780Driver {
            transmitter: Transmitter::new(subsystem, pins),
            policy: SessionPolicy::default(),
            initialized: false,
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.transmitter = self.transmitter.with_timing(timing);
        self
    }

    pub fn with_session_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn pins(&self) -> &PinBinding {
        self.transmitter.pins()
    }

    pub fn session_policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn transmitter(&self) -> &Transmitter<S> {
        &self.transmitter
    }

    /// Leaves the bus idle and releases a held GPIO session.
    ///
    /// With [SessionPolicy::PerTransmission] there's nothing held, and the bus is already
    /// idle after every transmission.
    pub fn shutdown(mut self) -> ScreenResult<()> {
        if !self.transmitter.is_session_open() {
            return Ok(());
        }

        debug!("Shutting down {:?}", self.transmitter.pins());
        let idle = self.transmitter.reset_lines();
        let closed = self.transmitter.close_session();
        idle.and(closed)
    }

    fn power_on(&mut self) -> ScreenResult<()> {
        if self.policy == SessionPolicy::Persistent {
            self.transmitter.open_session()?;
        }

        debug!("Resetting bus lines...");
        self.transmitter.reset_lines()?;
        self.transmitter.transmit(0b00000001, false)?;
        self.transmitter.transmit(0b00000010, false)?;
        Ok(())
    }
}

impl<S: GpioSubsystem> HD44780Driver for GpioHD44780Driver<S> {
    fn init(&mut self) -> ScreenResult<()> {
        debug!("Initializing display on {:?}", self.transmitter.pins());

        if let Err(err) = self.power_on() {
            // A session opened by a failed first init would otherwise stay held by a display
            // that can't be used.
            if !self.initialized {
                if let Err(close_err) = self.transmitter.close_session() {
                    warn!("Couldn't release GPIO session after failed init: {}", close_err);
                }
            }
            return Err(err);
        }

        self.initialized = true;
        debug!("Display initialized.");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn send_command(&mut self, command: u32) -> ScreenResult<()> {
        self.ensure_initialized()?;
        self.transmitter.transmit(command, false)
    }

    fn send_data(&mut self, data: u32) -> ScreenResult<()> {
        self.ensure_initialized()?;
        self.transmitter.transmit(data, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::testing::{latched, test_pins, Latched};
    use crate::lcd::hd44780::ScreenError;
    use crate::mock::{MockEvent, MockGpioSubsystem};

    fn display() -> (MockGpioSubsystem, GpioHD44780Driver<MockGpioSubsystem>) {
        let gpio = MockGpioSubsystem::new(28);
        let display = GpioHD44780Driver::new(gpio.clone(), test_pins()).with_timing(Timing::NONE);
        (gpio, display)
    }

    fn initialized() -> (MockGpioSubsystem, GpioHD44780Driver<MockGpioSubsystem>) {
        let (gpio, mut display) = display();
        display.init().unwrap();
        gpio.clear_events();
        (gpio, display)
    }

    fn command(byte: u8) -> Latched {
        Latched { byte, rs: false, rw: false }
    }

    fn data(byte: u8) -> Latched {
        Latched { byte, rs: true, rw: false }
    }

    fn sent(gpio: &MockGpioSubsystem) -> Vec<Latched> {
        latched(&gpio.events(), &test_pins())
    }

    #[test]
    fn init_configures_lines_then_clears_and_homes() {
        let (gpio, mut display) = display();
        assert!(!display.is_initialized());

        display.init().unwrap();
        assert!(display.is_initialized());

        let events = gpio.events();
        let pins = test_pins();
        assert_eq!(events[0], MockEvent::Open);
        for (i, (_, pin)) in pins.iter().enumerate() {
            assert_eq!(events[1 + i], MockEvent::Output(pin));
        }
        // E goes low first, then the rest of the bus.
        assert_eq!(events[12], MockEvent::Write(pins.e(), false));
        assert_eq!(events[23], MockEvent::Close);

        assert_eq!(sent(&gpio), vec![command(0x01), command(0x02)]);
    }

    #[test]
    fn commands_before_init_touch_nothing() {
        let (gpio, mut display) = display();

        let results = [
            display.clear_screen(),
            display.home(),
            display.set_screen_format(true, false),
            display.set_display(true, true, false),
            display.cursor_right(3),
            display.cursor_left(0),
            display.set_cursor_position(5, true),
            display.write_str("A"),
            display.send_command(0x01),
            display.send_data(0x41),
        ];

        for result in results {
            assert_eq!(result, Err(ScreenError::NotInitialized));
        }
        assert!(gpio.events().is_empty());
    }

    #[test]
    fn encodes_instructions() {
        let (gpio, mut display) = initialized();

        display.clear_screen().unwrap();
        display.home().unwrap();
        display.set_screen_format(true, false).unwrap();
        display.set_screen_format(false, true).unwrap();
        display.set_display(true, true, false).unwrap();
        display.set_display(false, false, true).unwrap();
        display.set_cursor_position(5, true).unwrap();
        display.set_cursor_position(0, false).unwrap();

        assert_eq!(
            sent(&gpio),
            vec![
                command(0x01),
                command(0x02),
                command(0x38),
                command(0x34),
                command(0x0E),
                command(0x09),
                command(0xC5),
                command(0x80),
            ]
        );
    }

    #[test]
    fn cursor_moves_are_separate_transmissions() {
        let (gpio, mut display) = initialized();

        display.cursor_right(3).unwrap();
        assert_eq!(sent(&gpio), vec![command(0x14); 3]);
        assert_eq!(
            gpio.events().iter().filter(|e| **e == MockEvent::Open).count(),
            3
        );

        gpio.clear_events();
        display.cursor_left(2).unwrap();
        assert_eq!(sent(&gpio), vec![command(0x10); 2]);

        gpio.clear_events();
        display.cursor_right(0).unwrap();
        assert!(gpio.events().is_empty());
    }

    #[test]
    fn writes_characters_as_data() {
        let (gpio, mut display) = initialized();

        display.write_str("A").unwrap();
        assert_eq!(sent(&gpio), vec![data(0x41)]);

        gpio.clear_events();
        display.write_str("Hi°").unwrap();
        assert_eq!(sent(&gpio), vec![data(b'H'), data(b'i'), data(0xB0)]);
    }

    #[test]
    fn invalid_arguments_send_nothing() {
        let (gpio, mut display) = initialized();

        assert!(matches!(
            display.set_cursor_position(0x40, false),
            Err(ScreenError::InvalidCommand { value: 0x40, .. })
        ));
        assert!(matches!(
            display.write_str("ok→"),
            Err(ScreenError::InvalidCommand { value: 0x2192, .. })
        ));
        assert!(matches!(
            display.send_command(0x100),
            Err(ScreenError::InvalidCommand { value: 0x100, .. })
        ));
        assert!(gpio.events().is_empty());
    }

    #[test]
    fn bus_is_idle_after_every_transmission() {
        let (gpio, mut display) = initialized();
        let pins = test_pins();

        display.set_display(true, true, true).unwrap();
        display.write_str("\u{FF}").unwrap();
        display.set_cursor_position(0x3F, true).unwrap();

        let mut levels = vec![false; 28];
        let mut closes = 0;
        for event in gpio.events() {
            match event {
                MockEvent::Write(pin, value) => levels[pin] = value,
                MockEvent::Close => {
                    closes += 1;
                    for (role, pin) in pins.iter() {
                        assert!(!levels[pin], "{} left high", role);
                    }
                }
                _ => {}
            }
        }
        assert_eq!(closes, 3);
    }

    #[test]
    fn unavailable_subsystem_fails_init() {
        let (gpio, mut display) = display();
        gpio.set_fail_open(true);

        assert!(matches!(display.init(), Err(ScreenError::DeviceUnavailable(_))));
        assert!(!display.is_initialized());

        gpio.set_fail_open(false);
        display.init().unwrap();
        assert!(display.is_initialized());
    }

    #[test]
    fn persistent_session_spans_init_to_shutdown() {
        let (gpio, display) = display();
        let mut display = display.with_session_policy(SessionPolicy::Persistent);

        display.init().unwrap();
        display.write_str("ok").unwrap();
        assert!(display.transmitter().is_session_open());
        display.shutdown().unwrap();

        let events = gpio.events();
        assert_eq!(events.iter().filter(|e| **e == MockEvent::Open).count(), 1);
        assert_eq!(events.iter().filter(|e| **e == MockEvent::Close).count(), 1);
        assert_eq!(events.last(), Some(&MockEvent::Close));
        assert_eq!(
            sent(&gpio),
            vec![command(0x01), command(0x02), data(b'o'), data(b'k')]
        );
    }

    #[test]
    fn failed_persistent_init_releases_session() {
        let (gpio, display) = display();
        let mut display = display.with_session_policy(SessionPolicy::Persistent);
        gpio.set_fail_write(Some(test_pins().rs()));

        assert!(matches!(display.init(), Err(ScreenError::Gpio(_))));
        assert!(!display.transmitter().is_session_open());
        assert_eq!(gpio.events().last(), Some(&MockEvent::Close));
    }
}
