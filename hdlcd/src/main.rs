mod config;

use crate::config::{Backend, Config};
use dotenv::dotenv;
use hdlcd_gpio::GpioSubsystem;
use hdlcd_gpio::gpiod::GpiodSubsystem;
use hdlcd_gpio::lcd::hd44780::{GpioHD44780Driver, HD44780Driver, PinBinding, Timing};
use hdlcd_gpio::mock::MockGpioSubsystem;
use hdlcd_gpio::raw::RawGpioSubsystem;
use log::{debug, info, warn};
use sysinfo::System;

/// Replaces everything the controller can't show with `?`.
fn printable(s: &str) -> String {
    s.chars()
        .map(|c| {
            if u32::from(c) <= 0xFF {
                c
            } else {
                warn!("Unsupported character: {}", c);
                '?'
            }
        })
        .collect()
}

fn run<S: GpioSubsystem>(
    subsystem: S,
    config: &Config,
    pins: PinBinding,
    timing: Timing,
    lines: &[String],
) -> eyre::Result<()> {
    debug!("Initializing LCD driver on {:?}...", subsystem);
    let mut lcd = GpioHD44780Driver::new(subsystem, pins)
        .with_timing(timing)
        .with_session_policy(config.session.into());

    lcd.init()?;
    lcd.set_screen_format(config.two_lines, config.font_5x11)?;
    lcd.set_display(true, config.cursor, config.blink)?;
    debug!("{:?} initialized.", lcd);

    for (i, line) in lines.iter().take(2).enumerate() {
        lcd.set_cursor_position(0, i == 1)?;
        lcd.write_str(&printable(line))?;
    }

    lcd.shutdown()?;
    Ok(())
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!("hdlcd starting on {} ({})",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::cpu_arch());
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );

    let config = Config::load()?;
    let pins = config.pins.binding()?;

    info!("LCD @ D0-D7: {:?}, RS: {}, RW: {}, E: {}",
        config.pins.data, config.pins.rs, config.pins.rw, config.pins.e);

    let mut lines: Vec<String> = std::env::args().skip(1).collect();
    if lines.is_empty() {
        lines = vec!["Hello!".to_string(), concat!("v.", env!("CARGO_PKG_VERSION")).to_string()];
    }

    match config.backend {
        Backend::Gpiomem => run(RawGpioSubsystem::gpiomem(), &config, pins, Timing::default(), &lines)?,
        Backend::Mem => run(RawGpioSubsystem::mem(), &config, pins, Timing::default(), &lines)?,
        Backend::Gpiod => run(
            GpiodSubsystem::new(&config.gpio_chip),
            &config,
            pins,
            Timing::default(),
            &lines,
        )?,
        Backend::Mock => {
            let gpio = MockGpioSubsystem::new(64);
            run(gpio.clone(), &config, pins, Timing::NONE, &lines)?;
            info!("Dry run recorded {} GPIO operations.", gpio.events().len());
        }
    }

    info!("Done.");
    Ok(())
}
