//! Typed module parameters
//!
//! Every value the DRA818 accepts over its AT interface has a fixed textual
//! form on the wire. The types here validate on construction and render that
//! form through `Display`, so a formatted command can never carry an
//! out-of-range field.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Hz per unit of the last decimal in `MMM.FFFF`
const WIRE_STEP_HZ: u64 = 100;

/// Largest frequency representable with three integer digits
const MAX_WIRE_HZ: u64 = 999_999_900;

/// Standard CTCSS tones in tenths of Hz, indexed from code `0001`
pub const CTCSS_TONES_DECI_HZ: [u16; 38] = [
    670, 719, 744, 770, 797, 825, 854, 885, 915, 948, 974, 1000, 1035, 1072, 1109, 1148, 1188,
    1230, 1273, 1318, 1365, 1413, 1462, 1514, 1567, 1622, 1679, 1738, 1799, 1862, 1928, 2035, 2107,
    2181, 2257, 2336, 2418, 2503,
];

/// Carrier frequency, stored in Hz with 100 Hz resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct Frequency {
    hz: u64,
}

impl Frequency {
    /// Create a frequency from Hz; must be a multiple of 100 Hz
    pub fn from_hz(hz: u64) -> Result<Self, ParseError> {
        if hz % WIRE_STEP_HZ != 0 || hz > MAX_WIRE_HZ {
            return Err(ParseError::InvalidFrequency(format!("{} Hz", hz)));
        }
        Ok(Self { hz })
    }

    /// Frequency in Hz
    pub fn hz(&self) -> u64 {
        self.hz
    }

    /// Frequency in MHz (for display and band checks)
    pub fn mhz(&self) -> f64 {
        self.hz as f64 / 1_000_000.0
    }
}

impl Default for Frequency {
    fn default() -> Self {
        Self { hz: 134_000_000 }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.hz / 1_000_000;
        let frac = (self.hz % 1_000_000) / WIRE_STEP_HZ;
        write!(f, "{:03}.{:04}", whole, frac)
    }
}

impl FromStr for Frequency {
    type Err = ParseError;

    /// Parse `MMM.FFFF` MHz notation; fewer decimals are zero-padded
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ParseError::InvalidFrequency(s.to_string());

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty()
            || whole.len() > 3
            || frac.len() > 4
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let mut frac_units: u64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| invalid())?
        };
        for _ in frac.len()..4 {
            frac_units *= 10;
        }

        Self::from_hz(whole * 1_000_000 + frac_units * WIRE_STEP_HZ)
    }
}

/// Channel spacing (`GBW` field of `DMOSETGROUP`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub enum Bandwidth {
    /// 12.5 kHz channel spacing
    #[default]
    Narrow,
    /// 25 kHz channel spacing
    Wide,
}

impl Bandwidth {
    /// Channel spacing in Hz
    pub fn spacing_hz(&self) -> u32 {
        match self {
            Bandwidth::Narrow => 12_500,
            Bandwidth::Wide => 25_000,
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bandwidth::Narrow => f.write_str("0"),
            Bandwidth::Wide => f.write_str("1"),
        }
    }
}

impl FromStr for Bandwidth {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" | "12500" | "12.5" => Ok(Bandwidth::Narrow),
            "1" | "25000" | "25" => Ok(Bandwidth::Wide),
            other => Err(ParseError::InvalidBandwidth(other.to_string())),
        }
    }
}

fn parse_level(name: &'static str, s: &str, min: u8, max: u8) -> Result<u8, ParseError> {
    let out_of_range = || ParseError::OutOfRange {
        name,
        min,
        max,
        value: s.to_string(),
    };
    let level: u8 = s.trim().parse().map_err(|_| out_of_range())?;
    if (min..=max).contains(&level) {
        Ok(level)
    } else {
        Err(out_of_range())
    }
}

/// Squelch level, 0 (open) to 8
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct Squelch(u8);

impl Squelch {
    pub const MAX: u8 = 8;

    pub fn new(level: u8) -> Result<Self, ParseError> {
        parse_level("squelch", &level.to_string(), 0, Self::MAX).map(Self)
    }

    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for Squelch {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for Squelch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Squelch {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_level("squelch", s, 0, Self::MAX).map(Self)
    }
}

/// Audio output volume, 1 to 8
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct Volume(u8);

impl Volume {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 8;

    pub fn new(level: u8) -> Result<Self, ParseError> {
        parse_level("volume", &level.to_string(), Self::MIN, Self::MAX).map(Self)
    }

    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Volume {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_level("volume", s, Self::MIN, Self::MAX).map(Self)
    }
}

/// Sub-audible squelch signalling
///
/// Wire form is always four characters: `0000` for none, `0001`..`0038` for a
/// CTCSS table index, or three octal digits plus `N`/`I` for CDCSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub enum Tone {
    /// No tone (carrier squelch)
    #[default]
    None,
    /// CTCSS tone by table index (1..=38)
    Ctcss(u8),
    /// CDCSS code, written as its three octal digits
    Dcs { code: u16, inverted: bool },
}

impl Tone {
    /// Build a CTCSS tone from its table index
    pub fn ctcss(index: u8) -> Result<Self, ParseError> {
        if (1..=CTCSS_TONES_DECI_HZ.len() as u8).contains(&index) {
            Ok(Tone::Ctcss(index))
        } else {
            Err(ParseError::InvalidTone(format!("CTCSS index {}", index)))
        }
    }

    /// Look up the CTCSS tone closest to `hz` (within 0.1 Hz)
    pub fn ctcss_from_hz(hz: f32) -> Result<Self, ParseError> {
        let deci = (hz * 10.0).round() as i32;
        CTCSS_TONES_DECI_HZ
            .iter()
            .position(|&t| (t as i32 - deci).abs() <= 1)
            .map(|i| Tone::Ctcss(i as u8 + 1))
            .ok_or_else(|| ParseError::InvalidTone(format!("{} Hz", hz)))
    }

    /// Build a CDCSS code; each digit must be octal
    pub fn dcs(code: u16, inverted: bool) -> Result<Self, ParseError> {
        let octal = code <= 777 && [code / 100, (code / 10) % 10, code % 10]
            .iter()
            .all(|d| *d <= 7);
        if octal {
            Ok(Tone::Dcs { code, inverted })
        } else {
            Err(ParseError::InvalidTone(format!("DCS {:03}", code)))
        }
    }

    /// CTCSS frequency in Hz, if this is a CTCSS tone
    pub fn ctcss_hz(&self) -> Option<f32> {
        match self {
            Tone::Ctcss(i) => (*i as usize)
                .checked_sub(1)
                .and_then(|idx| CTCSS_TONES_DECI_HZ.get(idx))
                .map(|d| *d as f32 / 10.0),
            _ => None,
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tone::None => f.write_str("0000"),
            Tone::Ctcss(i) => write!(f, "{:04}", i),
            Tone::Dcs { code, inverted } => {
                write!(f, "{:03}{}", code, if *inverted { 'I' } else { 'N' })
            }
        }
    }
}

impl FromStr for Tone {
    type Err = ParseError;

    /// Accepts the wire form, a bare table index, or a CTCSS frequency like `88.5`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ParseError::InvalidTone(s.to_string());

        if s.is_empty() {
            return Err(invalid());
        }

        if s.contains('.') {
            let hz: f32 = s.parse().map_err(|_| invalid())?;
            return Self::ctcss_from_hz(hz);
        }

        if let Some(last) = s.chars().last().filter(|c| matches!(c, 'N' | 'n' | 'I' | 'i')) {
            let digits = &s[..s.len() - 1];
            if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let code: u16 = digits.parse().map_err(|_| invalid())?;
            return Self::dcs(code, matches!(last, 'I' | 'i'));
        }

        if s.len() > 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        match s.parse::<u8>().map_err(|_| invalid())? {
            0 => Ok(Tone::None),
            i => Self::ctcss(i),
        }
    }
}

/// String conversions backing serde; values are parsed with `FromStr`
macro_rules! text_conversions {
    ($($ty:ty),+) => {$(
        impl TryFrom<String> for $ty {
            type Error = ParseError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> String {
                value.to_string()
            }
        }
    )+};
}

text_conversions!(Frequency, Bandwidth, Squelch, Volume, Tone);

/// Audio filter switches for `SETFILTER`
///
/// `true` engages a filter (wire `0`), `false` bypasses it (wire `1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterConfig {
    /// Pre-emphasis / de-emphasis
    pub emphasis: bool,
    /// 300 Hz high-pass
    pub high_pass: bool,
    /// 3 kHz low-pass
    pub low_pass: bool,
}

impl FilterConfig {
    /// All filters engaged
    pub fn all_engaged() -> Self {
        Self {
            emphasis: true,
            high_pass: true,
            low_pass: true,
        }
    }
}

/// Render a filter switch as its wire digit
pub fn flag_digit(engaged: bool) -> char {
    if engaged {
        '0'
    } else {
        '1'
    }
}

/// Parse a wire digit into a filter switch
pub fn parse_flag(s: &str) -> Result<bool, ParseError> {
    match s.trim() {
        "0" => Ok(true),
        "1" => Ok(false),
        other => Err(ParseError::InvalidFlag(other.to_string())),
    }
}

/// Parameters carried by a single `DMOSETGROUP` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupConfig {
    pub bandwidth: Bandwidth,
    pub tx: Frequency,
    pub rx: Frequency,
    pub tx_tone: Tone,
    pub squelch: Squelch,
    pub rx_tone: Tone,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_parse_and_display() {
        let f: Frequency = "134.0000".parse().unwrap();
        assert_eq!(f.hz(), 134_000_000);
        assert_eq!(f.to_string(), "134.0000");

        let f: Frequency = "146.52".parse().unwrap();
        assert_eq!(f.hz(), 146_520_000);
        assert_eq!(f.to_string(), "146.5200");

        let f: Frequency = "439.1125".parse().unwrap();
        assert_eq!(f.to_string(), "439.1125");
    }

    #[test]
    fn test_frequency_rejects_bad_input() {
        assert!("".parse::<Frequency>().is_err());
        assert!("abc".parse::<Frequency>().is_err());
        assert!("146.52001".parse::<Frequency>().is_err());
        assert!("1460.5".parse::<Frequency>().is_err());
        assert!("146.-5".parse::<Frequency>().is_err());
        assert!(Frequency::from_hz(146_520_050).is_err());
    }

    #[test]
    fn test_bandwidth() {
        assert_eq!("0".parse::<Bandwidth>().unwrap(), Bandwidth::Narrow);
        assert_eq!("25000".parse::<Bandwidth>().unwrap(), Bandwidth::Wide);
        assert_eq!(Bandwidth::Wide.to_string(), "1");
        assert!("2".parse::<Bandwidth>().is_err());
    }

    #[test]
    fn test_levels() {
        assert_eq!("0".parse::<Squelch>().unwrap().level(), 0);
        assert!("9".parse::<Squelch>().is_err());
        assert!("0".parse::<Volume>().is_err());
        assert_eq!("8".parse::<Volume>().unwrap().to_string(), "8");
        assert!(Volume::new(9).is_err());
        assert!("x".parse::<Volume>().is_err());
    }

    #[test]
    fn test_tone_forms() {
        assert_eq!("0000".parse::<Tone>().unwrap(), Tone::None);
        assert_eq!("0012".parse::<Tone>().unwrap(), Tone::Ctcss(12));
        assert_eq!("88.5".parse::<Tone>().unwrap(), Tone::Ctcss(8));
        assert_eq!(
            "023N".parse::<Tone>().unwrap(),
            Tone::Dcs {
                code: 23,
                inverted: false
            }
        );
        assert_eq!("754I".parse::<Tone>().unwrap().to_string(), "754I");
        assert_eq!(Tone::Ctcss(1).to_string(), "0001");
        assert_eq!(Tone::Ctcss(38).ctcss_hz(), Some(250.3));
    }

    #[test]
    fn test_tone_rejects() {
        assert!("0039".parse::<Tone>().is_err());
        assert!("089N".parse::<Tone>().is_err());
        assert!("23N".parse::<Tone>().is_err());
        assert!("60.0".parse::<Tone>().is_err());
        assert!("00001".parse::<Tone>().is_err());
    }

    #[test]
    fn test_string_conversions_validate() {
        assert_eq!(Volume::try_from("8".to_string()).unwrap().level(), 8);
        assert!(Volume::try_from("9".to_string()).is_err());
        assert!(Squelch::try_from("9".to_string()).is_err());
        assert!(Tone::try_from("0099".to_string()).is_err());
        assert!(Frequency::try_from("146.52001".to_string()).is_err());

        let freq = Frequency::try_from("145.5".to_string()).unwrap();
        assert_eq!(String::from(freq), "145.5000");
        assert_eq!(String::from(Bandwidth::Wide), "1");
    }

    #[test]
    fn test_flags() {
        assert_eq!(flag_digit(true), '0');
        assert_eq!(parse_flag("1"), Ok(false));
        assert!(parse_flag("2").is_err());
    }
}
