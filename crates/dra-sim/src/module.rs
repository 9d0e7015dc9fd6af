//! Virtual DRA818 module
//!
//! Answers AT command lines the way the hardware does and tracks the
//! configuration it has been given.

use std::collections::{HashSet, VecDeque};
use std::time::Instant;

use dra_protocol::{
    AckKind, Command, FilterConfig, Frequency, GroupConfig, LineCodec, ModuleDatabase,
    ModuleModel, ReplyCodec, Response, Volume,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Number of most recent command lines kept by [`VirtualModule::received`]
pub const RECEIVED_HISTORY: usize = 256;

/// Snapshot of the virtual module's configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleState {
    pub connected: bool,
    pub group: Option<GroupConfig>,
    pub volume: Volume,
    pub filter: FilterConfig,
    pub tail: bool,
    pub commands_received: usize,
}

/// Configuration for creating a virtual module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualModuleConfig {
    /// Display name/identifier
    pub id: String,
    /// Module model name, determines the accepted band
    pub model: String,
    /// String reported for `AT+VERSION`
    pub version: String,
    /// Value reported for `RSSI?`
    pub rssi: u8,
    /// Frequencies on which scans report a carrier
    #[serde(default)]
    pub active_frequencies: Vec<Frequency>,
}

impl Default for VirtualModuleConfig {
    fn default() -> Self {
        Self {
            id: "Virtual DRA818V".to_string(),
            model: "DRA818V".to_string(),
            version: "DRA818V_V1.0".to_string(),
            rssi: 0,
            active_frequencies: Vec::new(),
        }
    }
}

/// A simulated module that answers protocol-accurate replies
#[derive(Debug)]
pub struct VirtualModule {
    id: String,
    model: ModuleModel,
    version: String,
    rssi: u8,
    active: HashSet<Frequency>,
    state: ModuleState,
    reject_next: bool,
    silent: bool,
    received: VecDeque<String>,
    last_change: Instant,
}

impl VirtualModule {
    /// Create a module of the given model; unknown names fall back to DRA818V
    pub fn new(id: impl Into<String>, model: &str) -> Self {
        Self::from_config(VirtualModuleConfig {
            id: id.into(),
            model: model.to_string(),
            ..Default::default()
        })
    }

    /// Create a virtual module from configuration
    pub fn from_config(config: VirtualModuleConfig) -> Self {
        let model = ModuleDatabase::by_name(&config.model).unwrap_or_else(|| {
            warn!("Unknown module model {:?}, simulating DRA818V", config.model);
            ModuleModel {
                manufacturer: "Dorji".to_string(),
                model: "DRA818V".to_string(),
                min_frequency_hz: 134_000_000,
                max_frequency_hz: 174_000_000,
                max_power_watts: 1,
            }
        });

        Self {
            id: config.id,
            model,
            version: config.version,
            rssi: config.rssi,
            active: config.active_frequencies.into_iter().collect(),
            state: ModuleState {
                connected: false,
                group: None,
                volume: Volume::default(),
                filter: FilterConfig::default(),
                tail: false,
                commands_received: 0,
            },
            reject_next: false,
            silent: false,
            received: VecDeque::with_capacity(RECEIVED_HISTORY),
            last_change: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &ModuleModel {
        &self.model
    }

    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    /// Most recent command lines, oldest first (terminators stripped)
    pub fn received(&self) -> impl Iterator<Item = &str> + '_ {
        self.received.iter().map(String::as_str)
    }

    /// Time of the last accepted configuration change
    pub fn last_change(&self) -> Instant {
        self.last_change
    }

    /// Answer the next acknowledgement with a failure status
    pub fn reject_next(&mut self) {
        self.reject_next = true;
    }

    /// Stop (or resume) answering commands
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Mark a frequency as carrying (or not carrying) a signal
    pub fn set_signal(&mut self, freq: Frequency, present: bool) {
        if present {
            self.active.insert(freq);
        } else {
            self.active.remove(&freq);
        }
    }

    pub fn set_rssi(&mut self, rssi: u8) {
        self.rssi = rssi;
    }

    /// Process one command line and return the reply line, if any
    pub fn process_line(&mut self, line: &str) -> Option<Response> {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        if line.is_empty() {
            return None;
        }

        if self.received.len() == RECEIVED_HISTORY {
            self.received.pop_front();
        }
        self.received.push_back(line.to_string());
        self.state.commands_received += 1;

        if self.silent {
            debug!("Virtual module {} ignoring {:?}", self.id, line);
            return None;
        }

        let reply = match Command::from_line(line) {
            Ok(cmd) => self.execute(cmd),
            Err(e) => {
                debug!("Virtual module {} cannot parse {:?}: {}", self.id, line, e);
                // Malformed parameters on a known command are refused;
                // unknown commands get no answer at all
                AckKind::for_command_line(line).map(|kind| Response::Ack {
                    kind,
                    success: false,
                })
            }
        };

        reply.map(|r| self.apply_rejection(r))
    }

    fn apply_rejection(&mut self, reply: Response) -> Response {
        match reply {
            Response::Ack { kind, .. } if self.reject_next => {
                self.reject_next = false;
                Response::Ack {
                    kind,
                    success: false,
                }
            }
            other => other,
        }
    }

    fn execute(&mut self, cmd: Command) -> Option<Response> {
        let reply = match cmd {
            Command::Connect => {
                self.state.connected = true;
                Response::Ack {
                    kind: AckKind::Connect,
                    success: true,
                }
            }
            Command::SetGroup(group) => {
                let in_band = self.model.covers(group.tx) && self.model.covers(group.rx);
                if in_band && !self.reject_next {
                    self.state.group = Some(group);
                    self.last_change = Instant::now();
                }
                Response::Ack {
                    kind: AckKind::SetGroup,
                    success: in_band,
                }
            }
            Command::SetVolume(volume) => {
                if !self.reject_next {
                    self.state.volume = volume;
                    self.last_change = Instant::now();
                }
                Response::Ack {
                    kind: AckKind::SetVolume,
                    success: true,
                }
            }
            Command::SetFilter(filter) => {
                if !self.reject_next {
                    self.state.filter = filter;
                    self.last_change = Instant::now();
                }
                Response::Ack {
                    kind: AckKind::SetFilter,
                    success: true,
                }
            }
            Command::SetTail(on) => {
                if !self.reject_next {
                    self.state.tail = on;
                    self.last_change = Instant::now();
                }
                Response::Ack {
                    kind: AckKind::SetTail,
                    success: true,
                }
            }
            Command::Scan(freq) => Response::Scan {
                signal: self.model.covers(freq) && self.active.contains(&freq),
            },
            Command::ReadRssi => Response::Rssi(self.rssi),
            Command::Version => Response::Version(self.version.clone()),
        };
        Some(reply)
    }

    /// Feed raw bytes through `codec` and collect the encoded replies
    pub fn process_bytes(&mut self, codec: &mut LineCodec, data: &[u8]) -> Vec<Vec<u8>> {
        codec.push_bytes(data);
        let mut out = Vec::new();
        while let Some(line) = codec.next_line() {
            if let Some(reply) = self.process_line(&line) {
                out.push(format!("{}\r\n", reply).into_bytes());
            }
        }
        out
    }
}
