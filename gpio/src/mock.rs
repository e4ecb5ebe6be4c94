//! In-memory GPIO backend that records every operation instead of touching hardware.
//!
//! Clones of a [MockGpioSubsystem] share one event log, so a test (or a dry run) can hand one
//! clone to a driver and inspect the recorded traffic through another.
use crate::{GpioDriver, GpioError, GpioOutput, GpioPin, GpioResult, GpioSubsystem};
use bitvec::vec::BitVec;
use log::trace;
use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use std::sync::atomic::AtomicU8;

/// A single recorded GPIO operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MockEvent {
    /// The subsystem was opened.
    Open,
    /// A driver returned by [MockGpioSubsystem::open] was released.
    Close,
    /// The pin was configured as an output.
    Output(usize),
    /// The pin was driven to the given level.
    Write(usize, bool),
}

#[derive(Debug)]
struct MockState {
    pin_count: usize,
    events: RefCell<Vec<MockEvent>>,
    fail_open: Cell<bool>,
    fail_write: Cell<Option<usize>>,
}

impl MockState {
    fn record(&self, event: MockEvent) {
        trace!("mock gpio: {:?}", event);
        self.events.borrow_mut().push(event);
    }
}

#[derive(Clone, Debug)]
pub struct MockGpioSubsystem {
    state: Rc<MockState>,
}

impl MockGpioSubsystem {
    pub fn new(pin_count: usize) -> Self {
        MockGpioSubsystem {
            state: Rc::new(MockState {
                pin_count,
                events: RefCell::new(Vec::new()),
                fail_open: Cell::new(false),
                fail_write: Cell::new(None),
            }),
        }
    }

    /// Gets a copy of every event recorded so far.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.events.borrow().clone()
    }

    /// Forgets the recorded events.
    pub fn clear_events(&self) {
        self.state.events.borrow_mut().clear();
    }

    /// Makes every following [GpioSubsystem::open] fail with an IO error.
    pub fn set_fail_open(&self, fail: bool) {
        self.state.fail_open.set(fail);
    }

    /// Makes every following write to `pin` fail. `None` disables the failure.
    pub fn set_fail_write(&self, pin: Option<usize>) {
        self.state.fail_write.set(pin);
    }

    /// Gets the last level written to each pin, or `None` if it was never written.
    pub fn levels(&self) -> Vec<Option<bool>> {
        let mut levels = vec![None; self.state.pin_count];
        for event in self.state.events.borrow().iter() {
            if let MockEvent::Write(pin, value) = *event {
                levels[pin] = Some(value);
            }
        }
        levels
    }
}

impl GpioSubsystem for MockGpioSubsystem {
    type Driver = MockGpioDriver;

    fn open(&self) -> GpioResult<MockGpioDriver> {
        if self.state.fail_open.get() {
            return Err(GpioError::Io(std::io::ErrorKind::PermissionDenied));
        }

        self.state.record(MockEvent::Open);
        Ok(MockGpioDriver {
            state: Rc::clone(&self.state),
            used_pins: BitVec::repeat(false, self.state.pin_count),
        })
    }
}

pub struct MockGpioDriver {
    state: Rc<MockState>,
    used_pins: BitVec<AtomicU8>,
}

impl Debug for MockGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioDriver({})", self.state.pin_count)
    }
}

impl GpioDriver for MockGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.state.pin_count)
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.used_pins.set_aliased(index, true);

        Ok(Box::new(MockGpioPin {
            driver: self,
            pin_index: index,
        }))
    }
}

impl Drop for MockGpioDriver {
    fn drop(&mut self) {
        self.state.record(MockEvent::Close);
    }
}

struct MockGpioPin<'a> {
    driver: &'a MockGpioDriver,
    pin_index: usize,
}

impl Debug for MockGpioPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for MockGpioPin<'_> {
    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        self.driver.state.record(MockEvent::Output(self.pin_index));
        Ok(Box::new(MockGpioOutput { pin: self }))
    }
}

impl Drop for MockGpioPin<'_> {
    fn drop(&mut self) {
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}

struct MockGpioOutput<'a> {
    pin: &'a MockGpioPin<'a>,
}

impl Debug for MockGpioOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for MockGpioOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        let state = &self.pin.driver.state;
        if state.fail_write.get() == Some(self.pin.pin_index) {
            return Err(GpioError::Other(format!("write to pin {} failed", self.pin.pin_index)));
        }

        state.record(MockEvent::Write(self.pin.pin_index, value));
        Ok(())
    }
}
