//! Connection state machine using statum.
//!
//! # State Machine
//!
//! ```text
//!              identify ok
//! Disconnected ───────────► Connected
//!      ▲                        │
//!      └────────────────────────┘
//!   read retries exhausted / setup lost
//! ```
//!
//! `Disconnected` re-runs the whole initialization and identification sequence on every
//! attempt. `Connected` polls the report block, feeds the emitter and periodically checks
//! that the controller has not silently reset itself.

use super::bus::{BusError, Delay, RegisterBus};
use super::emitter::{diff_and_emit, EmitOutcome};
use super::register_link::RegisterLink;
use super::report::{decode, Snapshot};
use crate::config::BridgeConfig;
use crate::output::InputSink;
use statum::{machine, state};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const INIT_SEQUENCE: [(u8, u8); 2] = [(0xF0, 0x55), (0xFB, 0x00)];
pub const DATA_FORMAT_REGISTER: u8 = 0xFE;
pub const ID_REGISTER: u8 = 0xFA;
pub const ID_LEN: usize = 6;
pub const LIVENESS_REGISTER: u8 = 0xFC;
/// Liveness value of a controller that lost its initialization
pub const SETUP_LOST: u8 = 0xFF;

/// Bytes 2 and 3 of the identification block for the extension family
pub const DEVICE_FAMILY: [u8; 2] = [0xA4, 0x20];
/// Byte 5 of the identification block for a Classic Controller
pub const DEVICE_TYPE_CLASSIC: u8 = 0x01;

/// Retries after the first failed report read
pub const READ_RETRIES: usize = 5;
pub const RETRY_DELAY: Duration = Duration::from_millis(1);
/// Wait before the next connection attempt
pub const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Link errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("Initialization failed: {0}")]
    Initialization(BusError),

    #[error("Identification read failed: {0}")]
    Identification(BusError),

    #[error("Unknown device id {0:02x}{1:02x}")]
    IdentificationMismatch(u8, u8),

    #[error("Wrong device type {0:02x}")]
    UnsupportedDeviceType(u8),

    #[error("Link down after {attempts} attempts: {source}")]
    LinkDown { attempts: usize, source: BusError },
}

/// Raw identification block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId(pub [u8; ID_LEN]);

impl DeviceId {
    pub fn validate(&self) -> Result<(), LinkError> {
        let [_, _, family_hi, family_lo, _, device_type] = self.0;
        if [family_hi, family_lo] != DEVICE_FAMILY {
            return Err(LinkError::IdentificationMismatch(family_hi, family_lo));
        }
        if device_type != DEVICE_TYPE_CLASSIC {
            return Err(LinkError::UnsupportedDeviceType(device_type));
        }
        Ok(())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Result of one poll tick in the connected state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    /// Failed read attempts absorbed before the report came through
    pub retries: usize,
    pub outcome: EmitOutcome,
    /// The sink rejected part of the batch; the baseline was kept
    pub sink_failed: bool,
    /// The liveness check ran this tick
    pub heartbeat: bool,
    /// The liveness register reported a lost setup
    pub setup_lost: bool,
}

#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Disconnected,
    Connected,
}

#[machine]
#[derive(Debug)]
pub struct ControllerLink<S: LinkState> {
    config: Arc<BridgeConfig>,

    /// Last accepted snapshot, diffed against the next read
    baseline: Snapshot,

    /// Successful report reads since the last connect. Reset by `into_connected`, so the first
    /// liveness check after a reconnect comes a full period later.
    heartbeat: u64,
}

impl<S: LinkState> ControllerLink<S> {
    pub fn baseline(&self) -> &Snapshot {
        &self.baseline
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

impl ControllerLink<Disconnected> {
    pub fn create(config: Arc<BridgeConfig>) -> Self {
        let baseline = Snapshot::released(config.mode);
        debug!("Creating controller link in {:?} mode", config.mode);
        Self::new(config, baseline, 0)
    }

    /// Sends the initialization writes and validates the identification block.
    pub fn identify<B: RegisterBus, D: Delay>(
        &self,
        link: &mut RegisterLink<B, D>,
    ) -> Result<DeviceId, LinkError> {
        for (register, value) in INIT_SEQUENCE {
            link.write_register(register, value)
                .map_err(LinkError::Initialization)?;
        }
        if let Some(format) = self.config.mode.data_format() {
            debug!("Selecting data format {:#04x}", format);
            link.write_register(DATA_FORMAT_REGISTER, format)
                .map_err(LinkError::Initialization)?;
        }

        let mut id = [0u8; ID_LEN];
        link.read_registers(ID_REGISTER, &mut id)
            .map_err(LinkError::Identification)?;
        let id = DeviceId(id);
        info!("Detected device: {}", id);

        id.validate()?;
        Ok(id)
    }

    pub fn into_connected(mut self) -> ControllerLink<Connected> {
        info!("Controller connected, polling at {} Hz", self.config.frequency_hz);
        self.heartbeat = 0;
        self.transition()
    }
}

impl ControllerLink<Connected> {
    /// Reads and decodes one report, retrying transient bus failures.
    pub fn read_report<B: RegisterBus, D: Delay>(
        &mut self,
        link: &mut RegisterLink<B, D>,
    ) -> Result<(Snapshot, usize), LinkError> {
        let mode = self.config.mode;
        let mut buf = [0u8; 8];
        let raw = &mut buf[..mode.report_len()];

        let mut retries = 0;
        loop {
            match link.read_registers(mode.report_offset(), raw) {
                Ok(()) => return Ok((decode(mode, raw), retries)),
                Err(e) if retries < READ_RETRIES => {
                    debug!("Report read failed (retry {}): {}", retries + 1, e);
                    retries += 1;
                    link.pause(RETRY_DELAY);
                }
                Err(e) => {
                    return Err(LinkError::LinkDown {
                        attempts: retries + 1,
                        source: e,
                    })
                }
            }
        }
    }

    /// Runs one poll tick: read, diff against the baseline, emit, heartbeat.
    pub fn poll<B: RegisterBus, D: Delay, K: InputSink + ?Sized>(
        &mut self,
        link: &mut RegisterLink<B, D>,
        sink: &mut K,
    ) -> Result<PollReport, LinkError> {
        let (current, retries) = self.read_report(link)?;

        if self.config.verbose && current.buttons() != self.baseline.buttons() {
            info!("rd {:04X}", current.buttons() ^ 0xFFFF);
        }

        let (outcome, sink_failed) =
            match diff_and_emit(&self.config.buttons, &current, &self.baseline, sink) {
                Ok(outcome) => (outcome, false),
                Err(e) => {
                    error!("Failed to forward controller state: {}", e);
                    (EmitOutcome::Emitted(e.written), true)
                }
            };
        // A partly rejected batch is diffed again on the next tick.
        if outcome.is_accepted() && !sink_failed {
            self.baseline = current;
        }

        self.heartbeat += 1;
        let heartbeat = self.heartbeat % self.config.heartbeat_period() == 0;
        let setup_lost = heartbeat && self.setup_lost(link);

        Ok(PollReport {
            retries,
            outcome,
            sink_failed,
            heartbeat,
            setup_lost,
        })
    }

    fn setup_lost<B: RegisterBus, D: Delay>(&self, link: &mut RegisterLink<B, D>) -> bool {
        match link.read_register(LIVENESS_REGISTER) {
            Ok(SETUP_LOST) => {
                warn!("Controller setup lost: {:02x}", SETUP_LOST);
                true
            }
            Ok(value) => {
                debug!("Liveness check ok ({:02x})", value);
                false
            }
            Err(e) => {
                warn!("Liveness check failed: {}", e);
                false
            }
        }
    }

    /// Drops back to `Disconnected` with a released, centered baseline.
    pub fn into_disconnected(mut self) -> ControllerLink<Disconnected> {
        self.baseline = Snapshot::released(self.config.mode);
        self.transition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classic_controller_id_is_accepted() {
        let id = DeviceId([0x00, 0x00, 0xA4, 0x20, 0x00, 0x01]);
        assert_eq!(id.validate(), Ok(()));
        assert_eq!(id.to_string(), "00 00 A4 20 00 01");
    }

    #[test]
    fn hi_res_format_byte_is_not_checked() {
        assert_eq!(DeviceId([0x01, 0x00, 0xA4, 0x20, 0x03, 0x01]).validate(), Ok(()));
    }

    #[test]
    fn nunchuk_type_is_rejected() {
        let id = DeviceId([0x00, 0x00, 0xA4, 0x20, 0x00, 0x00]);
        assert_eq!(id.validate(), Err(LinkError::UnsupportedDeviceType(0x00)));
    }

    #[test]
    fn foreign_family_is_rejected() {
        let id = DeviceId([0x00, 0x00, 0xA5, 0x20, 0x00, 0x01]);
        assert_eq!(
            id.validate(),
            Err(LinkError::IdentificationMismatch(0xA5, 0x20))
        );
    }

    #[test]
    fn disconnected_link_starts_from_released_baseline() {
        let config = Arc::new(BridgeConfig::for_mode(
            crate::controller::report::ReportMode::Analog6,
        ));
        let link = ControllerLink::create(config);
        assert_eq!(link.baseline().buttons(), 0xFFFF);
        assert_eq!(link.baseline().channels(), &[128; 6]);
    }
}
