use hdlcd_gpio::lcd::hd44780::{PinBinding, ScreenResult, SessionPolicy};
use serde::{Deserialize, Serialize};
use std::env::var_os;
use std::ffi::OsStr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("{key} needs {expected} pins, got {found}")]
    WrongPinCount {
        key: &'static str,
        expected: usize,
        found: usize,
    },
}

/// GPIO backend to drive the display with.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Registers mapped from `/dev/gpiomem`.
    #[default]
    Gpiomem,
    /// Registers mapped from `/dev/mem`. Needs root.
    Mem,
    /// Linux GPIO character device.
    Gpiod,
    /// Nothing is driven, all GPIO traffic is only logged.
    Mock,
}

impl FromStr for Backend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "gpiomem" => Ok(Backend::Gpiomem),
            "mem" => Ok(Backend::Mem),
            "gpiod" => Ok(Backend::Gpiod),
            "mock" => Ok(Backend::Mock),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Session {
    #[default]
    PerTransmission,
    Persistent,
}

impl FromStr for Session {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "per-transmission" => Ok(Session::PerTransmission),
            "persistent" => Ok(Session::Persistent),
            _ => Err(()),
        }
    }
}

impl From<Session> for SessionPolicy {
    fn from(session: Session) -> Self {
        match session {
            Session::PerTransmission => SessionPolicy::PerTransmission,
            Session::Persistent => SessionPolicy::Persistent,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PinConfig {
    /// D0 first.
    pub data: [usize; 8],
    pub rs: usize,
    pub rw: usize,
    pub e: usize,
}

impl PinConfig {
    pub fn binding(&self) -> ScreenResult<PinBinding> {
        PinBinding::new(self.data, self.rs, self.rw, self.e)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub pins: PinConfig,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_gpio_chip")]
    pub gpio_chip: String,
    #[serde(default)]
    pub session: Session,
    #[serde(default = "default_true")]
    pub two_lines: bool,
    #[serde(default)]
    pub font_5x11: bool,
    #[serde(default)]
    pub cursor: bool,
    #[serde(default)]
    pub blink: bool,
}

fn default_gpio_chip() -> String {
    "/dev/gpiochip0".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Loads the config file named by `HDLCD_CONFIG_FILE` (`hdlcd.json` by default), or the
    /// environment if there's no such file.
    pub fn load() -> eyre::Result<Self> {
        let config_str = var_os("HDLCD_CONFIG_FILE");
        let config_str: &OsStr = config_str.as_deref().unwrap_or(OsStr::new("hdlcd.json"));
        let config_path = Path::new(config_str);
        if config_path.exists() {
            let file = std::fs::File::open(config_path)?;
            let reader = std::io::BufReader::new(file);
            Ok(serde_json::from_reader(reader)?)
        } else {
            Ok(Self::from_lookup(|key| std::env::var(key).ok())?)
        }
    }

    /// Builds the config from `HDLCD_*` variables, looked up through `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| var(key).ok_or(ConfigError::Missing(key));

        fn parsed<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
            let parsed = value.trim().parse();
            parsed.map_err(|_| ConfigError::Invalid { key, value })
        }

        let flag = |key: &'static str, default: bool| match var(key) {
            None => Ok(default),
            Some(value) => parse_flag(&value).ok_or(ConfigError::Invalid { key, value }),
        };

        let pins = PinConfig {
            data: parse_pin_list("HDLCD_PINS_DATA", &required("HDLCD_PINS_DATA")?)?,
            rs: parsed("HDLCD_PIN_RS", required("HDLCD_PIN_RS")?)?,
            rw: parsed("HDLCD_PIN_RW", required("HDLCD_PIN_RW")?)?,
            e: parsed("HDLCD_PIN_E", required("HDLCD_PIN_E")?)?,
        };

        Ok(Config {
            pins,
            backend: match var("HDLCD_BACKEND") {
                Some(value) => parsed("HDLCD_BACKEND", value)?,
                None => Backend::default(),
            },
            gpio_chip: var("HDLCD_GPIO_CHIP").unwrap_or_else(default_gpio_chip),
            session: match var("HDLCD_SESSION") {
                Some(value) => parsed("HDLCD_SESSION", value)?,
                None => Session::default(),
            },
            two_lines: flag("HDLCD_TWO_LINES", true)?,
            font_5x11: flag("HDLCD_FONT_5X11", false)?,
            cursor: flag("HDLCD_CURSOR", false)?,
            blink: flag("HDLCD_BLINK", false)?,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses a list of pin numbers separated by commas, spaces or semicolons.
pub fn parse_pin_list<const N: usize>(key: &'static str, pin_str: &str) -> Result<[usize; N], ConfigError> {
    let pins = pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| ConfigError::Invalid {
                key,
                value: s.to_string(),
            })
        })
        .collect::<Result<Vec<usize>, _>>()?;

    let found = pins.len();
    pins.try_into().map_err(|_| ConfigError::WrongPinCount {
        key,
        expected: N,
        found,
    })
}
