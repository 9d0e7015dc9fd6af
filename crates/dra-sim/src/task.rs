//! Virtual module actor task
//!
//! Owns a [`VirtualModule`] behind an async byte stream. The select! loop:
//! - reads command lines from the stream and writes the replies back
//! - applies control commands from a channel (silence, rejection, signals)
//! - emits state snapshots on a broadcast channel when the configuration changes

use std::io;

use dra_protocol::{Frequency, LineCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::module::{ModuleState, VirtualModule};

/// Commands that can be sent to a virtual module actor
#[derive(Debug, Clone)]
pub enum VirtualModuleCommand {
    /// Stop or resume answering
    SetSilent(bool),
    /// Refuse the next acknowledged command
    RejectNext,
    /// Mark a carrier present or absent on a frequency
    SetSignal { freq: Frequency, present: bool },
    /// Change the reported signal strength
    SetRssi(u8),
    /// Shutdown the actor
    Shutdown,
}

/// Run the virtual module actor task
///
/// Ends when the stream closes, the command channel closes or
/// [`VirtualModuleCommand::Shutdown`] arrives.
pub async fn run_virtual_module_task<S>(
    mut stream: S,
    mut module: VirtualModule,
    mut cmd_rx: mpsc::Receiver<VirtualModuleCommand>,
    state_tx: broadcast::Sender<ModuleState>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = LineCodec::new();
    let mut buf = [0u8; 256];

    info!(
        "Starting virtual module task for {} ({})",
        module.id(),
        module.model().model
    );

    let _ = state_tx.send(module.state().clone());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual module stream closed for {}", module.id());
                        break;
                    }
                    Ok(n) => {
                        debug!(
                            "Virtual module {} received {} bytes: {:?}",
                            module.id(), n, String::from_utf8_lossy(&buf[..n])
                        );

                        let before = module.state().clone();
                        let replies = module.process_bytes(&mut codec, &buf[..n]);
                        for reply in replies {
                            stream.write_all(&reply).await?;
                        }
                        stream.flush().await?;

                        let after = module.state();
                        if config_changed(&before, after) {
                            debug!("Virtual module {} state changed: {:?}", module.id(), after);
                            let _ = state_tx.send(after.clone());
                        }
                    }
                    Err(e) => {
                        warn!("Virtual module {} stream error: {}", module.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualModuleCommand::SetSilent(silent)) => {
                        info!("Virtual module {} silent set to {}", module.id(), silent);
                        module.set_silent(silent);
                    }
                    Some(VirtualModuleCommand::RejectNext) => module.reject_next(),
                    Some(VirtualModuleCommand::SetSignal { freq, present }) => {
                        module.set_signal(freq, present);
                    }
                    Some(VirtualModuleCommand::SetRssi(rssi)) => module.set_rssi(rssi),
                    Some(VirtualModuleCommand::Shutdown) => {
                        info!("Shutdown requested for virtual module {}", module.id());
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual module {}", module.id());
                        break;
                    }
                }
            }
        }
    }

    info!("Virtual module task ended for {}", module.id());
    Ok(())
}

// The command counter moves on every line, so it is left out
fn config_changed(before: &ModuleState, after: &ModuleState) -> bool {
    before.connected != after.connected
        || before.group != after.group
        || before.volume != after.volume
        || before.filter != after.filter
        || before.tail != after.tail
}
