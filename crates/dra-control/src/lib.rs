//! DRA818 Module Control
//!
//! This crate holds the configuration of a Dorji DRA818-family module and
//! pushes it over a serial link:
//!
//! - [`Settings`]: the parameter store, addressable by key name
//! - [`Dra818`]: one-command-one-reply controller over any async byte stream
//!
//! # Example
//!
//! ```rust,no_run
//! use dra_control::{Dra818, Settings};
//!
//! # async fn run() -> Result<(), dra_control::ControlError> {
//! let settings = Settings::with_overrides([("tx", "146.5200"), ("rx", "146.5200")])?;
//! let mut radio = Dra818::open(settings)?;
//!
//! radio.initialize().await?;
//! radio.set("sq", "3").await?;
//! let busy = radio.scan("146.5200".parse().unwrap()).await?;
//! println!("carrier present: {}", busy);
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod settings;

pub use controller::{Dra818, InitReport, DEFAULT_REPLY_TIMEOUT};
pub use error::ControlError;
pub use settings::{SettingKey, Settings, SyncTarget, DEFAULT_BAUD, DEFAULT_DEVICE};
