//! Direct register access to the BCM283x/BCM2711 GPIO block.
//!
//! The registers are memory-mapped from `/dev/gpiomem` (no root needed, the block starts at
//! offset 0) or from `/dev/mem` (root only, mapped at the physical peripheral address).
use crate::{GpioDriver, GpioError, GpioOutput, GpioPin, GpioResult, GpioSubsystem};
use bitvec::vec::BitVec;
use log::debug;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU8;

pub struct RawGpioDriver {
    mmap: MmapRaw,
    used_pins: BitVec<AtomicU8>,
}

impl RawGpioDriver {
    // 0x7e200000 on the VideoCore bus
    // const GPIO_BASE: u64 = 0xFE200000; // BCM2711
    const GPIO_BASE: u64 = 0x3F200000;

    const PIN_COUNT: usize = 58;

    /// Function select value of an output pin (GPFSELn).
    const FUNCTION_OUTPUT: u8 = 0b001;

    fn create(path: &Path, offset: u64) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
            .offset(offset)
            .len(4096)
            .map_raw(&file)?;

        Ok(RawGpioDriver {
            mmap,
            used_pins: BitVec::repeat(false, Self::PIN_COUNT),
        })
    }

    pub fn raw_set_pin_function(&self, pin_index: usize, function: u8) -> GpioResult<()> {
        if function > 0b111 {
            return Err(GpioError::InvalidArgument);
        }

        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPFSELn register
        let register_ptr = unsafe { mmap.add(pin_index / 10) };
        let shift = (pin_index % 10) * 3;

        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b111 << shift); // Clear the bits for this pin
        register_value |= (function as u32) << shift;
        unsafe { register_ptr.write_volatile(register_value) };

        Ok(())
    }

    pub(crate) fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPSETn/GPCLRn register
        let register_ptr = unsafe { mmap.add(if high { 0x1c / 4 } else { 0x28 / 4 } + pin_index / 32) };
        let shift = pin_index % 32;

        unsafe { register_ptr.write_volatile(1 << shift) };

        Ok(())
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        // The pin keeps its current function and level until it's configured, so claiming it
        // again in a later session doesn't glitch the line.
        self.used_pins.set_aliased(index, true);

        Ok(Box::new(RawGpioPin {
            driver: self,
            pin_index: index,
        }))
    }
}

/// Opens a fresh [RawGpioDriver] mapping on every [GpioSubsystem::open].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawGpioSubsystem {
    path: PathBuf,
    offset: u64,
}

impl RawGpioSubsystem {
    pub fn gpiomem() -> Self {
        RawGpioSubsystem {
            path: PathBuf::from("/dev/gpiomem"),
            offset: 0,
        }
    }

    pub fn mem() -> Self {
        RawGpioSubsystem {
            path: PathBuf::from("/dev/mem"),
            offset: RawGpioDriver::GPIO_BASE,
        }
    }
}

impl GpioSubsystem for RawGpioSubsystem {
    type Driver = RawGpioDriver;

    fn open(&self) -> GpioResult<RawGpioDriver> {
        let driver = RawGpioDriver::create(&self.path, self.offset)?;
        debug!("Mapped {} as {:?}", self.path.display(), driver);
        Ok(driver)
    }
}

struct RawGpioPin<'a> {
    driver: &'a RawGpioDriver,
    pin_index: usize,
}

impl Debug for RawGpioPin<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for RawGpioPin<'_> {
    fn as_output(&mut self) -> GpioResult<Box<dyn GpioOutput + '_>> {
        self.driver.raw_set_pin_function(self.pin_index, RawGpioDriver::FUNCTION_OUTPUT)?;
        Ok(Box::new(RawGpioOutput { pin: self }))
    }
}

impl Drop for RawGpioPin<'_> {
    fn drop(&mut self) {
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}

struct RawGpioOutput<'a> {
    pin: &'a RawGpioPin<'a>,
}

impl Debug for RawGpioOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for RawGpioOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.pin.driver.raw_set_pin_output(self.pin.pin_index, value)
    }
}
