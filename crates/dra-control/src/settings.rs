//! Module settings store
//!
//! Holds every parameter the controller can push to the module, plus the
//! serial device and baud rate. Values are addressed by the short key names
//! used in configuration files (`tx`, `rx`, `sq`, `gwb`, ...). Each key can be
//! read back in its wire/text form and updated from text with validation.

use std::fmt;
use std::str::FromStr;

use dra_protocol::params::{flag_digit, parse_flag};
use dra_protocol::{Bandwidth, FilterConfig, Frequency, GroupConfig, Squelch, Tone, Volume};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Default serial device
pub const DEFAULT_DEVICE: &str = "/dev/ttyS0";

/// Default baud rate (the module's fixed UART speed)
pub const DEFAULT_BAUD: u32 = 9600;

/// Addressable settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Tx,
    Rx,
    TxCtcss,
    RxCtcss,
    Gwb,
    Sq,
    Device,
    Baud,
    Vol,
    PreDeEmph,
    Highpass,
    Lowpass,
}

/// Which module command must be resent after a key changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
    /// `AT+DMOSETGROUP`
    Group,
    /// `AT+DMOSETVOLUME`
    Volume,
    /// `AT+SETFILTER`
    Filter,
    /// Store only; takes effect when the port is next opened
    Reopen,
}

impl SettingKey {
    pub const ALL: [SettingKey; 12] = [
        SettingKey::Tx,
        SettingKey::Rx,
        SettingKey::TxCtcss,
        SettingKey::RxCtcss,
        SettingKey::Gwb,
        SettingKey::Sq,
        SettingKey::Device,
        SettingKey::Baud,
        SettingKey::Vol,
        SettingKey::PreDeEmph,
        SettingKey::Highpass,
        SettingKey::Lowpass,
    ];

    /// Key name as used in config files
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::Tx => "tx",
            SettingKey::Rx => "rx",
            SettingKey::TxCtcss => "tx_ctcss",
            SettingKey::RxCtcss => "rx_ctcss",
            SettingKey::Gwb => "gwb",
            SettingKey::Sq => "sq",
            SettingKey::Device => "device",
            SettingKey::Baud => "baud",
            SettingKey::Vol => "vol",
            SettingKey::PreDeEmph => "pre_de_emph",
            SettingKey::Highpass => "highpass",
            SettingKey::Lowpass => "lowpass",
        }
    }

    pub fn sync_target(&self) -> SyncTarget {
        match self {
            SettingKey::Tx
            | SettingKey::Rx
            | SettingKey::TxCtcss
            | SettingKey::RxCtcss
            | SettingKey::Gwb
            | SettingKey::Sq => SyncTarget::Group,
            SettingKey::Vol => SyncTarget::Volume,
            SettingKey::PreDeEmph | SettingKey::Highpass | SettingKey::Lowpass => {
                SyncTarget::Filter
            }
            SettingKey::Device | SettingKey::Baud => SyncTarget::Reopen,
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettingKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ControlError::UnknownSetting(s.to_string()))
    }
}

/// Serialize a parameter through its `Display`/`FromStr` text form
mod text {
    use std::fmt::Display;
    use std::str::FromStr;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Filter switches serialized as their wire digit (`"0"` engaged, `"1"` bypassed)
mod flag {
    use dra_protocol::params::{flag_digit, parse_flag};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(engaged: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&flag_digit(*engaged))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_flag(&s).map_err(de::Error::custom)
    }
}

/// Full module configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Transmit frequency
    #[serde(with = "text")]
    pub tx: Frequency,
    /// Receive frequency
    #[serde(with = "text")]
    pub rx: Frequency,
    /// Transmit CTCSS/CDCSS
    #[serde(with = "text")]
    pub tx_ctcss: Tone,
    /// Receive CTCSS/CDCSS
    #[serde(with = "text")]
    pub rx_ctcss: Tone,
    /// Channel spacing
    #[serde(with = "text")]
    pub gwb: Bandwidth,
    /// Squelch level
    #[serde(with = "text")]
    pub sq: Squelch,
    /// Serial device path
    pub device: String,
    /// Serial baud rate
    pub baud: u32,
    /// Volume level
    #[serde(with = "text")]
    pub vol: Volume,
    /// Pre/de-emphasis engaged
    #[serde(with = "flag")]
    pub pre_de_emph: bool,
    /// High-pass filter engaged
    #[serde(with = "flag")]
    pub highpass: bool,
    /// Low-pass filter engaged
    #[serde(with = "flag")]
    pub lowpass: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let filter = FilterConfig::default();
        Self {
            tx: Frequency::default(),
            rx: Frequency::default(),
            tx_ctcss: Tone::None,
            rx_ctcss: Tone::None,
            gwb: Bandwidth::Narrow,
            sq: Squelch::default(),
            device: DEFAULT_DEVICE.to_string(),
            baud: DEFAULT_BAUD,
            vol: Volume::default(),
            pre_de_emph: filter.emphasis,
            highpass: filter.high_pass,
            lowpass: filter.low_pass,
        }
    }
}

fn parse_value<T>(key: SettingKey, value: &str) -> Result<T, ControlError>
where
    T: FromStr<Err = dra_protocol::ParseError>,
{
    value
        .parse()
        .map_err(|source| ControlError::InvalidSetting { key, source })
}

impl Settings {
    /// Defaults updated with `(key, value)` pairs; stops at the first bad pair
    pub fn with_overrides<'a, I>(overrides: I) -> Result<Self, ControlError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut settings = Self::default();
        for (key, value) in overrides {
            settings.set_by_name(key, value)?;
        }
        Ok(settings)
    }

    /// Read a value in its text form
    pub fn get(&self, key: SettingKey) -> String {
        match key {
            SettingKey::Tx => self.tx.to_string(),
            SettingKey::Rx => self.rx.to_string(),
            SettingKey::TxCtcss => self.tx_ctcss.to_string(),
            SettingKey::RxCtcss => self.rx_ctcss.to_string(),
            SettingKey::Gwb => self.gwb.to_string(),
            SettingKey::Sq => self.sq.to_string(),
            SettingKey::Device => self.device.clone(),
            SettingKey::Baud => self.baud.to_string(),
            SettingKey::Vol => self.vol.to_string(),
            SettingKey::PreDeEmph => flag_digit(self.pre_de_emph).to_string(),
            SettingKey::Highpass => flag_digit(self.highpass).to_string(),
            SettingKey::Lowpass => flag_digit(self.lowpass).to_string(),
        }
    }

    /// Read a value by key name
    pub fn get_by_name(&self, name: &str) -> Result<String, ControlError> {
        Ok(self.get(name.parse()?))
    }

    /// Validate and store a value given in text form
    pub fn set(&mut self, key: SettingKey, value: &str) -> Result<(), ControlError> {
        match key {
            SettingKey::Tx => self.tx = parse_value(key, value)?,
            SettingKey::Rx => self.rx = parse_value(key, value)?,
            SettingKey::TxCtcss => self.tx_ctcss = parse_value(key, value)?,
            SettingKey::RxCtcss => self.rx_ctcss = parse_value(key, value)?,
            SettingKey::Gwb => self.gwb = parse_value(key, value)?,
            SettingKey::Sq => self.sq = parse_value(key, value)?,
            SettingKey::Vol => self.vol = parse_value(key, value)?,
            SettingKey::Device => {
                let device = value.trim();
                if device.is_empty() {
                    return Err(ControlError::InvalidPortSetting {
                        key,
                        reason: "empty device path".to_string(),
                    });
                }
                self.device = device.to_string();
            }
            SettingKey::Baud => {
                let invalid = || ControlError::InvalidPortSetting {
                    key,
                    reason: format!("invalid baud rate {:?}", value),
                };
                let baud: u32 = value.trim().parse().map_err(|_| invalid())?;
                if baud == 0 {
                    return Err(invalid());
                }
                self.baud = baud;
            }
            SettingKey::PreDeEmph => self.pre_de_emph = flag_value(key, value)?,
            SettingKey::Highpass => self.highpass = flag_value(key, value)?,
            SettingKey::Lowpass => self.lowpass = flag_value(key, value)?,
        }
        Ok(())
    }

    /// Validate and store a value by key name
    pub fn set_by_name(&mut self, name: &str, value: &str) -> Result<SettingKey, ControlError> {
        let key: SettingKey = name.parse()?;
        self.set(key, value)?;
        Ok(key)
    }

    /// Payload for `AT+DMOSETGROUP`
    pub fn group(&self) -> GroupConfig {
        GroupConfig {
            bandwidth: self.gwb,
            tx: self.tx,
            rx: self.rx,
            tx_tone: self.tx_ctcss,
            squelch: self.sq,
            rx_tone: self.rx_ctcss,
        }
    }

    /// Replace all group parameters at once
    pub fn set_group(&mut self, group: GroupConfig) {
        self.gwb = group.bandwidth;
        self.tx = group.tx;
        self.rx = group.rx;
        self.tx_ctcss = group.tx_tone;
        self.sq = group.squelch;
        self.rx_ctcss = group.rx_tone;
    }

    /// Payload for `AT+SETFILTER`
    pub fn filter(&self) -> FilterConfig {
        FilterConfig {
            emphasis: self.pre_de_emph,
            high_pass: self.highpass,
            low_pass: self.lowpass,
        }
    }

    /// Replace all filter switches at once
    pub fn set_filter(&mut self, filter: FilterConfig) {
        self.pre_de_emph = filter.emphasis;
        self.highpass = filter.high_pass;
        self.lowpass = filter.low_pass;
    }

    /// All keys with their current text values, in declaration order
    pub fn entries(&self) -> Vec<(SettingKey, String)> {
        SettingKey::ALL.iter().map(|k| (*k, self.get(*k))).collect()
    }
}

fn flag_value(key: SettingKey, value: &str) -> Result<bool, ControlError> {
    parse_flag(value).map_err(|source| ControlError::InvalidSetting { key, source })
}
