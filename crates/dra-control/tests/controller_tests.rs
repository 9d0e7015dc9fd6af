//! Integration tests for the DRA818 controller
//!
//! These tests drive a `Dra818` against a virtual module served over an
//! in-memory duplex stream:
//! - Initialization and the init report
//! - Key updates and the command each one resends
//! - Scan, RSSI and version queries
//! - Rejections, out-of-band groups and silent modules

use std::time::Duration;

use dra_control::{ControlError, Dra818, Settings};
use dra_protocol::{FilterConfig, Frequency, ProtocolError, Tone, Volume};
use dra_sim::{run_virtual_module_task, ModuleState, VirtualModule, VirtualModuleCommand};
use tokio::io::DuplexStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub struct Bench {
        pub radio: Dra818<DuplexStream>,
        pub control: mpsc::Sender<VirtualModuleCommand>,
        pub state: broadcast::Receiver<ModuleState>,
        pub task: JoinHandle<std::io::Result<()>>,
    }

    /// Controller wired to a freshly spawned virtual module
    pub fn bench(module: VirtualModule, settings: Settings) -> Bench {
        let (radio_stream, module_stream) = tokio::io::duplex(1024);
        let (control, cmd_rx) = mpsc::channel(32);
        let (state_tx, state) = broadcast::channel(64);

        let task = tokio::spawn(run_virtual_module_task(
            module_stream,
            module,
            cmd_rx,
            state_tx,
        ));

        let radio = Dra818::new("virtual", radio_stream, settings)
            .with_timeout(Duration::from_millis(200));

        Bench {
            radio,
            control,
            state,
            task,
        }
    }

    pub fn vhf_settings() -> Settings {
        Settings::with_overrides([("tx", "146.5200"), ("rx", "146.5200")]).unwrap()
    }

    /// Most recent state broadcast by the module
    pub fn latest_state(rx: &mut broadcast::Receiver<ModuleState>) -> Option<ModuleState> {
        let mut latest = None;
        while let Ok(state) = rx.try_recv() {
            latest = Some(state);
        }
        latest
    }

    pub fn freq(s: &str) -> Frequency {
        s.parse().unwrap()
    }

    pub async fn shutdown(bench: Bench) {
        let _ = bench.control.send(VirtualModuleCommand::Shutdown).await;
        let _ = bench.task.await;
    }
}

use helpers::*;

// ============================================================================
// Initialization
// ============================================================================

#[tokio::test]
async fn test_initialize_pushes_group_and_filter() {
    let mut settings = vhf_settings();
    settings.set_by_name("tx_ctcss", "0012").unwrap();
    settings.set_by_name("sq", "4").unwrap();
    settings.set_by_name("highpass", "0").unwrap();

    let mut bench = bench(VirtualModule::new("Bench", "DRA818V"), settings);

    let report = bench.radio.initialize().await.unwrap();
    assert!(report.all_ok());

    // Replies are written before state is broadcast
    tokio::time::sleep(Duration::from_millis(20)).await;
    let state = latest_state(&mut bench.state).unwrap();
    assert!(state.connected);

    let group = state.group.unwrap();
    assert_eq!(group.tx, freq("146.5200"));
    assert_eq!(group.tx_tone, Tone::ctcss(12).unwrap());
    assert_eq!(group.squelch.level(), 4);
    assert_eq!(
        state.filter,
        FilterConfig {
            emphasis: false,
            high_pass: true,
            low_pass: false,
        }
    );

    shutdown(bench).await;
}

#[tokio::test]
async fn test_initialize_reports_out_of_band_group() {
    // Default 134.0000 MHz is fine for V but not for a UHF module
    let mut bench = bench(VirtualModule::new("Bench", "DRA818U"), Settings::default());

    let report = bench.radio.initialize().await.unwrap();
    assert!(!report.group);
    assert!(report.filter);
    assert!(!report.all_ok());

    shutdown(bench).await;
}

#[tokio::test]
async fn test_initialize_fails_on_rejected_handshake() {
    let mut bench = bench(VirtualModule::new("Bench", "DRA818V"), vhf_settings());
    bench
        .control
        .send(VirtualModuleCommand::RejectNext)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = bench.radio.initialize().await.unwrap_err();
    assert!(matches!(err, ControlError::HandshakeFailed));

    shutdown(bench).await;
}

// ============================================================================
// Key updates
// ============================================================================

#[tokio::test]
async fn test_set_key_resends_covering_command() {
    let mut bench = bench(VirtualModule::new("Bench", "DRA818V"), vhf_settings());
    bench.radio.initialize().await.unwrap();

    assert_eq!(bench.radio.set("rx", "147.0000").await.unwrap(), Some(true));
    assert_eq!(bench.radio.set("vol", "7").await.unwrap(), Some(true));
    assert_eq!(bench.radio.set("lowpass", "0").await.unwrap(), Some(true));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let state = latest_state(&mut bench.state).unwrap();
    assert_eq!(state.group.unwrap().rx, freq("147.0000"));
    assert_eq!(state.volume, Volume::new(7).unwrap());
    assert!(state.filter.low_pass);

    assert_eq!(bench.radio.get("rx").unwrap(), "147.0000");
    assert_eq!(bench.radio.get("vol").unwrap(), "7");

    shutdown(bench).await;
}

#[tokio::test]
async fn test_set_device_only_updates_store() {
    let mut bench = bench(VirtualModule::new("Bench", "DRA818V"), vhf_settings());

    assert_eq!(bench.radio.set("baud", "19200").await.unwrap(), None);
    assert_eq!(bench.radio.get("baud").unwrap(), "19200");

    // Nothing reached the module, so it is still silent about a handshake
    assert!(latest_state(&mut bench.state).map_or(true, |s| !s.connected));

    shutdown(bench).await;
}

#[tokio::test]
async fn test_invalid_value_leaves_store_untouched() {
    let mut bench = bench(VirtualModule::new("Bench", "DRA818V"), vhf_settings());

    let err = bench.radio.set("sq", "9").await.unwrap_err();
    assert!(matches!(err, ControlError::InvalidSetting { .. }));
    assert_eq!(bench.radio.get("sq").unwrap(), "1");

    let err = bench.radio.set("colour", "blue").await.unwrap_err();
    assert!(matches!(err, ControlError::UnknownSetting(_)));

    shutdown(bench).await;
}

#[tokio::test]
async fn test_rejected_volume_returns_false() {
    let mut bench = bench(VirtualModule::new("Bench", "DRA818V"), vhf_settings());
    bench
        .control
        .send(VirtualModuleCommand::RejectNext)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!bench.radio.set_volume(Volume::new(3).unwrap()).await.unwrap());
    assert!(bench.radio.set_volume(Volume::new(3).unwrap()).await.unwrap());

    shutdown(bench).await;
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_scan_reports_carrier() {
    let mut bench = bench(VirtualModule::new("Bench", "DRA818V"), vhf_settings());

    assert!(!bench.radio.scan(freq("145.5000")).await.unwrap());

    bench
        .control
        .send(VirtualModuleCommand::SetSignal {
            freq: freq("145.5000"),
            present: true,
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(bench.radio.scan(freq("145.5000")).await.unwrap());
    assert!(!bench.radio.scan(freq("145.5125")).await.unwrap());

    shutdown(bench).await;
}

#[tokio::test]
async fn test_rssi_and_version() {
    let mut bench = bench(VirtualModule::new("Bench", "DRA818V"), vhf_settings());

    bench
        .control
        .send(VirtualModuleCommand::SetRssi(97))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(bench.radio.read_rssi().await.unwrap(), 97);
    assert_eq!(bench.radio.version().await.unwrap(), "DRA818V_V1.0");

    shutdown(bench).await;
}

#[tokio::test]
async fn test_silent_module_times_out() {
    let mut bench = bench(VirtualModule::new("Bench", "DRA818V"), vhf_settings());
    bench
        .control
        .send(VirtualModuleCommand::SetSilent(true))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    bench.radio.set_timeout(Duration::from_millis(50));
    let err = bench.radio.handshake().await.unwrap_err();
    assert!(matches!(
        err,
        ControlError::Protocol(ProtocolError::Timeout(50))
    ));

    // The module answers again once it is woken up
    bench
        .control
        .send(VirtualModuleCommand::SetSilent(false))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(bench.radio.handshake().await.unwrap());

    shutdown(bench).await;
}

#[tokio::test]
async fn test_module_shutdown_disconnects() {
    let mut bench = bench(VirtualModule::new("Bench", "DRA818V"), vhf_settings());
    bench
        .control
        .send(VirtualModuleCommand::Shutdown)
        .await
        .unwrap();
    let _ = (&mut bench.task).await;

    let err = bench.radio.handshake().await.unwrap_err();
    assert!(matches!(err, ControlError::Disconnected));
}
