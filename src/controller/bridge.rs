//! Poll loop driver.
//!
//! Owns the register link, the sink and the current link phase, and advances the state
//! machine one step at a time. Everything runs on a single thread; each step finishes its
//! bus I/O and its sleep before the next one starts.

use super::bus::{Delay, RegisterBus};
use super::connection::{
    Connected, ControllerLink, DeviceId, Disconnected, LinkError, PollReport, RECONNECT_DELAY,
};
use super::emitter::EmitOutcome;
use super::register_link::RegisterLink;
use crate::config::BridgeConfig;
use crate::output::InputSink;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Current phase of the link, holding the typed state machine
#[derive(Debug)]
pub enum LinkPhase {
    Disconnected(ControllerLink<Disconnected>),
    Connected(ControllerLink<Connected>),
}

/// What a single [`ControllerBridge::step`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Connected(DeviceId),
    ConnectFailed(LinkError),
    Polled(PollReport),
    LinkLost(LinkError),
    SetupLost,
}

/// Counters for the periodic status line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub polls: u64,
    pub transient_failures: u64,
    pub dropped_reports: u64,
    pub events: u64,
    pub connects: u64,
    pub disconnects: u64,
}

const STATS_INTERVAL_SECS: i64 = 30;

pub struct ControllerBridge<B, D, K> {
    config: Arc<BridgeConfig>,
    link: RegisterLink<B, D>,
    sink: K,
    phase: Option<LinkPhase>,
    stats: LinkStats,
}

impl<B: RegisterBus, D: Delay, K: InputSink> ControllerBridge<B, D, K> {
    pub fn new(config: Arc<BridgeConfig>, link: RegisterLink<B, D>, sink: K) -> Self {
        info!(
            "Bridge ready: {:?} mode, {} Hz",
            config.mode, config.frequency_hz
        );
        let phase = LinkPhase::Disconnected(ControllerLink::create(config.clone()));
        Self {
            config,
            link,
            sink,
            phase: Some(phase),
            stats: LinkStats::default(),
        }
    }

    /// Runs one iteration of the poll loop, including its sleep.
    pub fn step(&mut self) -> Option<StepOutcome> {
        let phase = self.phase.take()?;
        let (phase, outcome) = match phase {
            LinkPhase::Disconnected(machine) => self.try_connect(machine),
            LinkPhase::Connected(machine) => self.poll(machine),
        };
        self.phase = Some(phase);
        Some(outcome)
    }

    fn try_connect(&mut self, machine: ControllerLink<Disconnected>) -> (LinkPhase, StepOutcome) {
        match machine.identify(&mut self.link) {
            Ok(id) => {
                self.stats.connects += 1;
                (
                    LinkPhase::Connected(machine.into_connected()),
                    StepOutcome::Connected(id),
                )
            }
            Err(e) => {
                warn!("Controller not available: {}", e);
                self.link.pause(RECONNECT_DELAY);
                (
                    LinkPhase::Disconnected(machine),
                    StepOutcome::ConnectFailed(e),
                )
            }
        }
    }

    fn poll(&mut self, mut machine: ControllerLink<Connected>) -> (LinkPhase, StepOutcome) {
        match machine.poll(&mut self.link, &mut self.sink) {
            Ok(report) => {
                self.record(&report);
                if report.setup_lost {
                    self.stats.disconnects += 1;
                    return (
                        LinkPhase::Disconnected(machine.into_disconnected()),
                        StepOutcome::SetupLost,
                    );
                }
                self.link.pause(self.config.poll_interval());
                (LinkPhase::Connected(machine), StepOutcome::Polled(report))
            }
            Err(e) => {
                error!("Controller link lost: {}", e);
                self.stats.disconnects += 1;
                (
                    LinkPhase::Disconnected(machine.into_disconnected()),
                    StepOutcome::LinkLost(e),
                )
            }
        }
    }

    fn record(&mut self, report: &PollReport) {
        self.stats.polls += 1;
        self.stats.transient_failures += report.retries as u64;
        match report.outcome {
            EmitOutcome::Dropped => self.stats.dropped_reports += 1,
            EmitOutcome::Emitted(count) => self.stats.events += count as u64,
            EmitOutcome::Unchanged => {}
        }
    }

    /// Steps until `shutdown` is cancelled.
    pub fn run(&mut self, shutdown: &CancellationToken) {
        info!("Starting controller poll loop");
        let mut last_stats_time: DateTime<Local> = Local::now();
        let stats_interval = chrono::Duration::seconds(STATS_INTERVAL_SECS);

        while !shutdown.is_cancelled() {
            if self.step().is_none() {
                error!("Link phase missing, stopping poll loop");
                break;
            }

            let now = Local::now();
            if now - last_stats_time > stats_interval {
                self.log_stats(now - last_stats_time);
                last_stats_time = now;
            }
        }
        info!("Controller poll loop stopped");
    }

    fn log_stats(&mut self, elapsed: chrono::Duration) {
        let seconds = elapsed.num_seconds().max(1);
        info!(
            "Link stats: {} polls ({:.1}/sec), {} events, {} retries, {} dropped, {} connects, {} disconnects in {} seconds",
            self.stats.polls,
            self.stats.polls as f64 / seconds as f64,
            self.stats.events,
            self.stats.transient_failures,
            self.stats.dropped_reports,
            self.stats.connects,
            self.stats.disconnects,
            seconds
        );
        debug!("Resetting link stats");
        self.stats = LinkStats::default();
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.phase, Some(LinkPhase::Connected(_)))
    }

    pub fn phase(&self) -> Option<&LinkPhase> {
        self.phase.as_ref()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn link(&self) -> &RegisterLink<B, D> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut RegisterLink<B, D> {
        &mut self.link
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }
}
