//! Cabinet fleet configuration file parser
//!
//! cabinet.conf is INI-style: `[section]` headers, `key = value` lines and
//! `;` or `#` comments. Options that precede the first header belong to
//! `[global]`. Besides the listener tunables, the file describes the fleet
//! itself through numbered sections such as `[cabinet.1]` and `[shelf.7]`.
//!
//! # Example
//!
//! ```no_run
//! use cabinetconfig::FleetConfig;
//!
//! let config = FleetConfig::from_file("/etc/cabinet/cabinet.conf").unwrap();
//! for (id, section) in config.numbered_sections("cabinet").unwrap() {
//!     println!("cabinet {} at {:?}", id, config.get(&section, "host"));
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Missing required option: {0}")]
    MissingOption(String),

    #[error("Invalid value for {key} in [{section}]: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },
}

/// A value that can be read from cabinet.conf
pub trait ConfigValue: Sized + Clone {
    fn parse_config_value(s: &str) -> Result<Self, ConfigError>;

    /// Short name used in error messages
    fn type_name() -> &'static str;
}

/// Byte count, e.g. `1024`, `4K`, `1MB`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size(pub u64);

/// Time span, e.g. `10`, `500ms`, `2m`; a bare number is seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Duration(pub std::time::Duration);

/// Plain non-negative integer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Count(pub u64);

/// A single byte written in hex, with or without a `0x` prefix ("01", "0x0A")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexByte(pub u8);

const SIZE_UNITS: &[(&[&str], f64)] = &[
    (&["", "B"], 1.0),
    (&["K", "KB"], 1024.0),
    (&["M", "MB"], 1024.0 * 1024.0),
    (&["G", "GB"], 1024.0 * 1024.0 * 1024.0),
    (&["T", "TB"], 1024.0 * 1024.0 * 1024.0 * 1024.0),
];

const TIME_UNITS: &[(&[&str], f64)] = &[
    (&["", "s", "sec", "secs", "second", "seconds"], 1.0),
    (&["ms", "msec", "millisecond", "milliseconds"], 1e-3),
    (&["us", "usec", "microsecond", "microseconds"], 1e-6),
    (&["m", "min", "mins", "minute", "minutes"], 60.0),
    (&["h", "hr", "hour", "hours"], 3600.0),
    (&["d", "day", "days"], 86400.0),
];

/// Split "12.5ms" into 12.5 and "ms"
fn split_quantity(s: &str) -> Result<(f64, &str), ConfigError> {
    let s = s.trim();
    let boundary = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '_'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(boundary);
    let value = number
        .replace('_', "")
        .parse::<f64>()
        .map_err(|_| ConfigError::ParseError(format!("Invalid number: {:?}", number)))?;
    Ok((value, unit.trim()))
}

fn unit_scale(table: &[(&[&str], f64)], unit: &str, case_sensitive: bool) -> Option<f64> {
    table
        .iter()
        .find(|(names, _)| {
            names.iter().any(|name| {
                if case_sensitive {
                    *name == unit
                } else {
                    name.eq_ignore_ascii_case(unit)
                }
            })
        })
        .map(|(_, scale)| *scale)
}

fn parse_size(s: &str) -> Result<u64, ConfigError> {
    let (value, unit) = split_quantity(s)?;
    let scale = unit_scale(SIZE_UNITS, unit, false)
        .ok_or_else(|| ConfigError::ParseError(format!("Unknown size unit: {}", unit)))?;
    Ok((value * scale) as u64)
}

fn parse_duration(s: &str) -> Result<std::time::Duration, ConfigError> {
    let (value, unit) = split_quantity(s)?;
    // "m" is minutes and "M" would be ambiguous, so units are matched exactly
    let scale = unit_scale(TIME_UNITS, unit, true)
        .ok_or_else(|| ConfigError::ParseError(format!("Unknown time unit: {}", unit)))?;
    Ok(std::time::Duration::from_secs_f64(value * scale))
}

/// Strip an optional `0x`/`0X` prefix
fn hex_digits(s: &str) -> Option<&str> {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
}

impl ConfigValue for Size {
    fn parse_config_value(s: &str) -> Result<Self, ConfigError> {
        parse_size(s).map(Size)
    }

    fn type_name() -> &'static str {
        "size"
    }
}

impl ConfigValue for Duration {
    fn parse_config_value(s: &str) -> Result<Self, ConfigError> {
        parse_duration(s).map(Duration)
    }

    fn type_name() -> &'static str {
        "duration"
    }
}

impl ConfigValue for Count {
    fn parse_config_value(s: &str) -> Result<Self, ConfigError> {
        s.trim()
            .parse()
            .map(Count)
            .map_err(|_| ConfigError::ParseError(format!("Invalid count: {}", s)))
    }

    fn type_name() -> &'static str {
        "count"
    }
}

impl ConfigValue for HexByte {
    fn parse_config_value(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        u8::from_str_radix(hex_digits(s).unwrap_or(s), 16)
            .map(HexByte)
            .map_err(|_| ConfigError::ParseError(format!("Invalid hex byte: {}", s)))
    }

    fn type_name() -> &'static str {
        "hex byte"
    }
}

/// Decimal, or hex with a `0x` prefix
impl ConfigValue for i64 {
    fn parse_config_value(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        let parsed = match hex_digits(s) {
            Some(digits) => i64::from_str_radix(digits, 16),
            None => s.parse(),
        };
        parsed.map_err(|_| ConfigError::ParseError(format!("Invalid integer: {}", s)))
    }

    fn type_name() -> &'static str {
        "integer"
    }
}

impl ConfigValue for bool {
    fn parse_config_value(s: &str) -> Result<Self, ConfigError> {
        const TRUE: [&str; 4] = ["true", "yes", "on", "1"];
        const FALSE: [&str; 4] = ["false", "no", "off", "0"];
        let s = s.trim();
        if TRUE.iter().any(|t| t.eq_ignore_ascii_case(s)) {
            Ok(true)
        } else if FALSE.iter().any(|f| f.eq_ignore_ascii_case(s)) {
            Ok(false)
        } else {
            Err(ConfigError::ParseError(format!("Invalid bool: {}", s)))
        }
    }

    fn type_name() -> &'static str {
        "bool"
    }
}

impl ConfigValue for String {
    fn parse_config_value(s: &str) -> Result<Self, ConfigError> {
        Ok(s.to_string())
    }

    fn type_name() -> &'static str {
        "string"
    }
}

/// A named option with a default, looked up across a list of sections
pub struct ConfigOption<T: ConfigValue> {
    name: &'static str,
    default: T,
}

impl<T: ConfigValue> ConfigOption<T> {
    pub const fn new(name: &'static str, default: T) -> Self {
        Self { name, default }
    }

    /// Value from the first section that sets it
    ///
    /// Unset and malformed values both yield the default; a malformed one is
    /// logged.
    pub fn get(&self, config: &FleetConfig, sections: &[&str]) -> T {
        let Some(raw) = config.get_with_fallback(sections, self.name) else {
            return self.default.clone();
        };
        T::parse_config_value(raw).unwrap_or_else(|e| {
            tracing::warn!(
                option = self.name,
                value = raw,
                "Ignoring malformed {} option, using the default: {}",
                T::type_name(),
                e
            );
            self.default.clone()
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }
}

/// A parsed cabinet.conf
#[derive(Debug, Clone, Default)]
pub struct FleetConfig {
    sections: HashMap<String, HashMap<String, String>>,
}

impl FleetConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut section = String::from("global");

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = header.trim();
                if name.is_empty() {
                    return Err(ConfigError::ParseError(format!(
                        "Empty section name on line {}",
                        index + 1
                    )));
                }
                section = name.to_string();
                sections.entry(section.clone()).or_default();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::ParseError(format!(
                    "Expected 'key = value' on line {}: {}",
                    index + 1,
                    line
                )));
            };
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self { sections })
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections.get(section)?.get(key).map(String::as_str)
    }

    /// First value of `key` found walking `sections` in order
    pub fn get_with_fallback(&self, sections: &[&str], key: &str) -> Option<&str> {
        sections.iter().find_map(|section| self.get(section, key))
    }

    /// Get and parse a typed value from one section
    ///
    /// Returns `Ok(None)` when the key is absent and an error when it is
    /// present but malformed.
    pub fn get_parsed<T: ConfigValue>(
        &self,
        section: &str,
        key: &str,
    ) -> Result<Option<T>, ConfigError> {
        let Some(raw) = self.get(section, key) else {
            return Ok(None);
        };
        T::parse_config_value(raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("expected {} ({})", T::type_name(), e),
            })
    }

    pub fn require<T: ConfigValue>(&self, section: &str, key: &str) -> Result<T, ConfigError> {
        self.get_parsed(section, key)?
            .ok_or_else(|| ConfigError::MissingOption(format!("{} in [{}]", key, section)))
    }

    /// All sections named `<prefix>.<id>`, sorted by id
    ///
    /// `[cabinet.3]` yields `(3, "cabinet.3")` for prefix "cabinet".
    pub fn numbered_sections(&self, prefix: &str) -> Result<Vec<(u64, String)>, ConfigError> {
        let mut found = self
            .sections
            .keys()
            .filter_map(|name| {
                let id = name.strip_prefix(prefix)?.strip_prefix('.')?;
                Some((name, id))
            })
            .map(|(name, id)| {
                id.trim()
                    .parse::<u64>()
                    .map(|id| (id, name.clone()))
                    .map_err(|_| {
                        ConfigError::ParseError(format!("Invalid id in section name [{}]", name))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        found.sort_unstable_by_key(|(id, _)| *id);
        Ok(found)
    }

    pub fn sections(&self) -> Vec<&str> {
        self.sections.keys().map(String::as_str).collect()
    }

    pub fn keys(&self, section: &str) -> Vec<&str> {
        self.sections
            .get(section)
            .map(|keys| keys.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Declare a struct of typed options with defaults
///
/// Each field becomes a public member; `from_fleet_config` reads every field
/// by name from the given sections, first match wins.
///
/// ```
/// use cabinetconfig::{define_options, Count, Duration, FleetConfig, Size};
///
/// define_options! {
///     pub struct PollOptions {
///         cabinet_poll_timeout: Duration = Duration(std::time::Duration::from_secs(1)),
///         cabinet_reconnect_every: Count = Count(10),
///         cabinet_read_chunk: Size = Size(1024),
///         cabinet_revive_closed: bool = true,
///     }
/// }
///
/// let fleet = FleetConfig::parse("[listener]\ncabinet_read_chunk = 4K\n").unwrap();
/// let options = PollOptions::from_fleet_config(&fleet, &["listener", "global"]);
/// assert_eq!(options.cabinet_read_chunk.0, 4 * 1024);
/// assert_eq!(options.cabinet_reconnect_every.0, 10);
/// ```
#[macro_export]
macro_rules! define_options {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident: $ty:ty = $default:expr
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    $( $field: $default, )*
                }
            }

            pub fn from_fleet_config(config: &$crate::FleetConfig, sections: &[&str]) -> Self {
                Self {
                    $(
                        $field: $crate::ConfigOption::new(stringify!($field), $default)
                            .get(config, sections),
                    )*
                }
            }

            pub fn option_names() -> &'static [&'static str] {
                &[ $( stringify!($field), )* ]
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}
