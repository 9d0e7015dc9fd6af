//! dorji: command-line control of a DRA818 module
//!
//! Usage:
//!   dorji init
//!   dorji set tx 146.5200
//!   dorji get sq
//!   dorji scan 145.5000
//!   dorji --device /dev/ttyUSB0 --baud 9600 probe
//!   dorji --simulate DRA818V init

mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dra_control::{Dra818, SettingKey, Settings, SyncTarget};
use dra_detect::{probe_port_bauds, PortScanner};
use dra_protocol::{Frequency, Volume};
use dra_sim::{run_virtual_module_task, VirtualModule, VirtualModuleCommand};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Baud rates tried by `probe` when none is given
const PROBE_BAUDS: &[u32] = &[9600, 19200, 4800];

/// Configure and query a Dorji DRA818 radio module over a serial port
#[derive(Parser)]
#[command(name = "dorji", version, about)]
struct Cli {
    /// Settings file (default: $XDG_CONFIG_HOME/dorji/settings.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial device, overrides the stored `device`
    #[arg(long, global = true)]
    device: Option<String>,

    /// Baud rate, overrides the stored `baud`
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Reply timeout in milliseconds
    #[arg(long, global = true, default_value_t = 2000)]
    timeout_ms: u64,

    /// Talk to a virtual module of this model instead of a serial port
    #[arg(long, global = true, value_name = "MODEL")]
    simulate: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handshake, then push group and filter settings
    Init,

    /// Store a setting and push it to the module
    Set {
        /// Key: tx, rx, tx_ctcss, rx_ctcss, gwb, sq, device, baud, vol,
        /// pre_de_emph, highpass, lowpass
        key: String,
        value: String,
    },

    /// Print a stored setting
    Get { key: String },

    /// Check a frequency (MMM.FFFF) for a carrier
    Scan { freq: Frequency },

    /// Set the audio volume (1-8)
    Volume { level: Volume },

    /// Enable or disable squelch tail elimination
    Tail {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Read the received signal strength
    Rssi,

    /// Look for a module on the configured device
    Probe,

    /// List serial ports
    Ports {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print all settings and the file they are stored in
    PrintConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dorji=info,dra_protocol=info,dra_control=info,dra_detect=info,dra_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_path().context("cannot determine the config directory")?,
    };
    let mut stored = config::load(&path)?;
    let settings = with_port_overrides(&stored, cli.device.as_deref(), cli.baud)?;

    match cli.command {
        // Commands that never touch the module
        Command::Get { key } => {
            println!("{}", settings.get_by_name(&key)?);
            Ok(())
        }
        Command::PrintConfig => {
            println!("# {}", path.display());
            for (key, value) in stored.entries() {
                println!("{} = {}", key, value);
            }
            Ok(())
        }
        Command::Ports { json } => list_ports(json),
        Command::Probe => probe(&settings).await,
        Command::Set { key, value } if is_store_only(&key) => {
            stored.set_by_name(&key, &value)?;
            config::save(&path, &stored)?;
            println!("{} = {} (applies on next open)", key, stored.get_by_name(&key)?);
            Ok(())
        }
        command => {
            let timeout = Duration::from_millis(cli.timeout_ms);
            let outcome = match &cli.simulate {
                Some(model) => {
                    let mut radio = simulated(model, settings)?.with_timeout(timeout);
                    run(&mut radio, command).await
                }
                None => {
                    let mut radio = Dra818::open(settings)
                        .context("failed to open the module's serial port")?
                        .with_timeout(timeout);
                    run(&mut radio, command).await
                }
            }?;

            if let Some((key, value)) = outcome {
                stored.set(key, &value)?;
                config::save(&path, &stored)?;
            }
            Ok(())
        }
    }
}

/// Settings for this run: the stored ones with `--device`/`--baud` applied
///
/// Overrides never reach the settings file.
fn with_port_overrides(
    stored: &Settings,
    device: Option<&str>,
    baud: Option<u32>,
) -> Result<Settings> {
    let mut settings = stored.clone();
    if let Some(device) = device {
        settings.set(SettingKey::Device, device)?;
    }
    if let Some(baud) = baud {
        settings.set(SettingKey::Baud, &baud.to_string())?;
    }
    Ok(settings)
}

fn is_store_only(key: &str) -> bool {
    key.parse::<SettingKey>()
        .map(|k| k.sync_target() == SyncTarget::Reopen)
        .unwrap_or(false)
}

/// Run a module command; returns the setting it changed, to persist
async fn run<T>(radio: &mut Dra818<T>, command: Command) -> Result<Option<(SettingKey, String)>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    match command {
        Command::Init => {
            let report = radio.initialize().await?;
            println!("handshake: ok");
            println!("group:     {}", ack_text(report.group));
            println!("filter:    {}", ack_text(report.filter));
            if !report.all_ok() {
                warn!("Module rejected part of the configuration");
            }
            Ok(None)
        }
        Command::Set { key, value } => {
            let ack = radio.set(&key, &value).await?;
            let key: SettingKey = key.parse()?;
            let value = radio.settings().get(key);
            println!("{} = {} ({})", key, value, ack.map(ack_text).unwrap_or("stored"));
            Ok(Some((key, value)))
        }
        Command::Scan { freq } => {
            let signal = radio.scan(freq).await?;
            println!("{}: {}", freq, if signal { "signal" } else { "no signal" });
            Ok(None)
        }
        Command::Volume { level } => {
            let ok = radio.set_volume(level).await?;
            println!("volume {}: {}", level, ack_text(ok));
            Ok(Some((SettingKey::Vol, level.to_string())))
        }
        Command::Tail { enabled } => {
            let ok = radio.set_tail(enabled).await?;
            println!("tail elimination {}: {}", if enabled { "on" } else { "off" }, ack_text(ok));
            Ok(None)
        }
        Command::Rssi => {
            println!("{}", radio.read_rssi().await?);
            Ok(None)
        }
        Command::Get { .. } | Command::PrintConfig | Command::Ports { .. } | Command::Probe => {
            bail!("command does not talk to the module")
        }
    }
}

fn ack_text(ok: bool) -> &'static str {
    if ok {
        "accepted"
    } else {
        "rejected"
    }
}

/// Controller wired to a virtual module running on this runtime
fn simulated(model: &str, settings: Settings) -> Result<Dra818<tokio::io::DuplexStream>> {
    let (radio_stream, module_stream) = tokio::io::duplex(1024);
    let module = VirtualModule::new(format!("Simulated {}", model), model);
    info!("Simulating {}", module.model().model);

    // The task holds the sender, so it runs until the controller drops the stream
    let (cmd_tx, cmd_rx) = mpsc::channel::<VirtualModuleCommand>(1);
    let (state_tx, _) = broadcast::channel(16);
    tokio::spawn(async move {
        let _keep_open = cmd_tx;
        if let Err(e) = run_virtual_module_task(module_stream, module, cmd_rx, state_tx).await {
            warn!("Virtual module stopped: {}", e);
        }
    });

    Ok(Dra818::new("virtual", radio_stream, settings))
}

async fn probe(settings: &Settings) -> Result<()> {
    // An explicit baud is tried alone; otherwise the common rates in turn
    let bauds: Vec<u32> = if settings.baud != dra_control::DEFAULT_BAUD {
        vec![settings.baud]
    } else {
        PROBE_BAUDS.to_vec()
    };

    match probe_port_bauds(&settings.device, &bauds).await? {
        Some(result) => {
            println!("port:     {}", settings.device);
            if let Some(baud) = result.baud {
                println!("baud:     {}", baud);
            }
            println!(
                "model:    {}",
                result.model.as_ref().map(|m| m.model.as_str()).unwrap_or("unknown")
            );
            println!("firmware: {}", result.version.as_deref().unwrap_or("unknown"));
            Ok(())
        }
        None => bail!("no module answered on {}", settings.device),
    }
}

fn list_ports(json: bool) -> Result<()> {
    let ports = PortScanner::new().enumerate_ports()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    for port in ports {
        let desc = port
            .hint
            .as_deref()
            .or(port.product.as_deref())
            .unwrap_or("");
        println!("{}\t{}", port.port, desc);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["dorji", "--device", "/dev/ttyUSB0", "set", "sq", "4"]);
        assert_eq!(cli.device.as_deref(), Some("/dev/ttyUSB0"));
        assert!(matches!(cli.command, Command::Set { ref key, ref value } if key == "sq" && value == "4"));

        let cli = Cli::parse_from(["dorji", "scan", "145.5000", "--timeout-ms", "500"]);
        assert_eq!(cli.timeout_ms, 500);
        assert!(matches!(cli.command, Command::Scan { freq } if freq.hz() == 145_500_000));
    }

    #[test]
    fn test_cli_rejects_bad_values() {
        assert!(Cli::try_parse_from(["dorji", "volume", "9"]).is_err());
        assert!(Cli::try_parse_from(["dorji", "scan", "145.5"]).is_ok());
        assert!(Cli::try_parse_from(["dorji", "scan", "fast"]).is_err());
    }

    #[test]
    fn test_store_only_keys() {
        assert!(is_store_only("device"));
        assert!(is_store_only("baud"));
        assert!(!is_store_only("tx"));
        assert!(!is_store_only("bogus"));
    }

    #[tokio::test]
    async fn test_run_against_simulated_module() {
        let settings =
            Settings::with_overrides([("tx", "146.5200"), ("rx", "146.5200")]).unwrap();
        let mut radio = simulated("DRA818V", settings)
            .unwrap()
            .with_timeout(Duration::from_millis(200));

        assert!(run(&mut radio, Command::Init).await.unwrap().is_none());

        let changed = run(
            &mut radio,
            Command::Set {
                key: "sq".to_string(),
                value: "6".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(changed, Some((SettingKey::Sq, "6".to_string())));

        assert!(run(&mut radio, Command::Rssi).await.is_ok());
    }

    #[test]
    fn test_port_overrides_leave_stored_settings_alone() {
        let stored = Settings::default();
        let settings =
            with_port_overrides(&stored, Some("/dev/ttyACM3"), Some(19200)).unwrap();
        assert_eq!(settings.device, "/dev/ttyACM3");
        assert_eq!(settings.baud, 19200);
        assert_eq!(stored, Settings::default());

        assert!(with_port_overrides(&stored, None, Some(0)).is_err());
        assert!(with_port_overrides(&stored, Some(" "), None).is_err());
    }

    #[tokio::test]
    async fn test_overrides_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        config::save(&path, &Settings::default()).unwrap();

        let mut stored = config::load(&path).unwrap();
        let settings = with_port_overrides(&stored, Some("/dev/ttyACM3"), Some(19200)).unwrap();
        let mut radio = simulated("DRA818V", settings)
            .unwrap()
            .with_timeout(Duration::from_millis(200));

        let (key, value) = run(
            &mut radio,
            Command::Set {
                key: "tx".to_string(),
                value: "145.5000".to_string(),
            },
        )
        .await
        .unwrap()
        .unwrap();
        stored.set(key, &value).unwrap();
        config::save(&path, &stored).unwrap();

        let saved = config::load(&path).unwrap();
        assert_eq!(saved.get_by_name("tx").unwrap(), "145.5000");
        assert_eq!(saved.device, Settings::default().device);
        assert_eq!(saved.baud, Settings::default().baud);
    }
}
