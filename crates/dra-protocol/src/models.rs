//! Module model database
//!
//! The DRA818 family shares one AT command set; variants differ in RF band.
//! SA818 modules from other vendors speak the same dialect.

use crate::error::ParseError;
use crate::params::Frequency;

/// Information about a module variant (static version for database)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleModelStatic {
    /// Manufacturer name
    pub manufacturer: &'static str,
    /// Model name
    pub model: &'static str,
    /// Lowest tunable frequency in Hz
    pub min_frequency_hz: u64,
    /// Highest tunable frequency in Hz
    pub max_frequency_hz: u64,
    /// Maximum TX power in watts
    pub max_power_watts: u8,
}

/// Information about a module variant (owned version)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleModel {
    pub manufacturer: String,
    pub model: String,
    pub min_frequency_hz: u64,
    pub max_frequency_hz: u64,
    pub max_power_watts: u8,
}

impl From<&ModuleModelStatic> for ModuleModel {
    fn from(s: &ModuleModelStatic) -> Self {
        Self {
            manufacturer: s.manufacturer.to_string(),
            model: s.model.to_string(),
            min_frequency_hz: s.min_frequency_hz,
            max_frequency_hz: s.max_frequency_hz,
            max_power_watts: s.max_power_watts,
        }
    }
}

impl ModuleModel {
    /// Whether `freq` lies inside this module's band
    pub fn covers(&self, freq: Frequency) -> bool {
        (self.min_frequency_hz..=self.max_frequency_hz).contains(&freq.hz())
    }

    /// Reject frequencies outside this module's band
    pub fn check_frequency(&self, freq: Frequency) -> Result<(), ParseError> {
        if self.covers(freq) {
            Ok(())
        } else {
            Err(ParseError::OutOfBand(freq.to_string()))
        }
    }
}

static MODULES: &[ModuleModelStatic] = &[
    ModuleModelStatic {
        manufacturer: "Dorji",
        model: "DRA818V",
        min_frequency_hz: 134_000_000,
        max_frequency_hz: 174_000_000,
        max_power_watts: 1,
    },
    ModuleModelStatic {
        manufacturer: "Dorji",
        model: "DRA818U",
        min_frequency_hz: 400_000_000,
        max_frequency_hz: 480_000_000,
        max_power_watts: 1,
    },
    ModuleModelStatic {
        manufacturer: "Dorji",
        model: "DRA818-220",
        min_frequency_hz: 220_000_000,
        max_frequency_hz: 225_000_000,
        max_power_watts: 1,
    },
    ModuleModelStatic {
        manufacturer: "NiceRF",
        model: "SA818-V",
        min_frequency_hz: 134_000_000,
        max_frequency_hz: 174_000_000,
        max_power_watts: 1,
    },
    ModuleModelStatic {
        manufacturer: "NiceRF",
        model: "SA818-U",
        min_frequency_hz: 400_000_000,
        max_frequency_hz: 480_000_000,
        max_power_watts: 1,
    },
];

/// Lookup table of known modules
pub struct ModuleDatabase;

impl ModuleDatabase {
    /// All known module variants
    pub fn all() -> Vec<ModuleModel> {
        MODULES.iter().map(ModuleModel::from).collect()
    }

    /// Find a module by model name (case-insensitive, `-` ignored)
    pub fn by_name(name: &str) -> Option<ModuleModel> {
        let wanted = normalize(name);
        MODULES
            .iter()
            .find(|m| normalize(m.model) == wanted)
            .map(ModuleModel::from)
    }

    /// First Dorji module whose band covers `freq`
    pub fn for_frequency(freq: Frequency) -> Option<ModuleModel> {
        MODULES
            .iter()
            .filter(|m| m.manufacturer == "Dorji")
            .map(ModuleModel::from)
            .find(|m| m.covers(freq))
    }

    /// Guess the module from a `+VERSION:` string such as `SA818_V4.2`
    pub fn by_version(version: &str) -> Option<ModuleModel> {
        let upper = version.to_ascii_uppercase();
        let family = upper.split(['_', ' ']).next()?;
        MODULES
            .iter()
            .find(|m| normalize(m.model).starts_with(&normalize(family)))
            .map(ModuleModel::from)
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
