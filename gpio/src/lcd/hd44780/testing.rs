//! Helpers for decoding recorded bus traffic in tests.
use crate::lcd::hd44780::PinBinding;
use crate::mock::MockEvent;
use std::collections::HashMap;

/// Scattered line numbers, so a swapped data line can't go unnoticed.
pub(crate) fn test_pins() -> PinBinding {
    PinBinding::new([5, 6, 13, 19, 26, 12, 16, 20], 21, 22, 23).unwrap()
}

/// What the controller saw on the rising edge of E.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Latched {
    pub byte: u8,
    pub rs: bool,
    pub rw: bool,
}

/// Replays `events` and returns the bus state at every rising edge of E.
pub(crate) fn latched(events: &[MockEvent], pins: &PinBinding) -> Vec<Latched> {
    let mut levels = HashMap::new();
    let mut result = Vec::new();

    for event in events {
        let MockEvent::Write(pin, value) = *event else {
            continue;
        };

        let rising = pin == pins.e() && value && !levels.get(&pin).copied().unwrap_or(false);
        levels.insert(pin, value);

        if rising {
            let level = |pin: usize| levels.get(&pin).copied().unwrap_or(false);
            let byte = (0..8).fold(0u8, |byte, n| byte | (level(pins.data(n)) as u8) << n);
            result.push(Latched {
                byte,
                rs: level(pins.rs()),
                rw: level(pins.rw()),
            });
        }
    }

    result
}
