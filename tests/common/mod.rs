//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use classicpad::config::BridgeConfig;
use classicpad::controller::{
    BusError, ControllerBridge, Delay, RegisterBus, RegisterLink, ReportMode,
};
use classicpad::output::{InputSink, PadEvent, SinkError};
use std::sync::Arc;
use std::time::Duration;

pub const CLASSIC_ID: [u8; 6] = [0x00, 0x00, 0xA4, 0x20, 0x00, 0x01];

/// Register file behaving like a Classic Controller behind an auto-incrementing pointer.
///
/// The liveness register 0xFC overlaps the identification block, so a controller that
/// lost its setup also fails identification until it is initialized again.
pub struct FakeController {
    pub registers: [u8; 256],
    pub pointer: u8,
    pub id: [u8; 6],
    pub register_writes: Vec<(u8, u8)>,
    pub fail_reads: usize,
    pub fail_writes: usize,
    pub bytes_read: usize,
}

impl FakeController {
    pub fn new(id: [u8; 6]) -> Self {
        let mut fake = Self {
            registers: [0u8; 256],
            pointer: 0,
            id,
            register_writes: Vec::new(),
            fail_reads: 0,
            fail_writes: 0,
            bytes_read: 0,
        };
        fake.registers[0xFA..].copy_from_slice(&id);
        // idle digital report, nothing pressed
        fake.set_bytes(0x04, &[0xFF, 0xFF]);
        fake
    }

    pub fn classic() -> Self {
        Self::new(CLASSIC_ID)
    }

    pub fn set_bytes(&mut self, offset: u8, bytes: &[u8]) {
        let start = usize::from(offset);
        self.registers[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Simulates the controller dropping its initialization.
    pub fn lose_setup(&mut self) {
        self.registers[0xFC] = 0xFF;
    }
}

impl RegisterBus for FakeController {
    fn write_byte(&mut self, value: u8) -> Result<(), BusError> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(BusError::Write("no ack".into()));
        }
        self.pointer = value;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, BusError> {
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(BusError::Read("no ack".into()));
        }
        let value = self.registers[usize::from(self.pointer)];
        self.pointer = self.pointer.wrapping_add(1);
        self.bytes_read += 1;
        Ok(value)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(BusError::Write("no ack".into()));
        }
        self.register_writes.push((register, value));
        if (register, value) == (0xF0, 0x55) {
            let id = self.id;
            self.registers[0xFA..].copy_from_slice(&id);
        }
        Ok(())
    }
}

/// Records requested delays instead of sleeping
#[derive(Debug, Default)]
pub struct RecordedDelay {
    pub delays: Vec<Duration>,
}

impl Delay for RecordedDelay {
    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkRecord {
    Event(PadEvent),
    Sync,
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub log: Vec<SinkRecord>,
    /// Events to refuse before accepting again
    pub fail_emits: usize,
}

impl RecordingSink {
    pub fn take(&mut self) -> Vec<SinkRecord> {
        std::mem::take(&mut self.log)
    }
}

impl InputSink for RecordingSink {
    fn emit(&mut self, event: PadEvent) -> Result<(), SinkError> {
        if self.fail_emits > 0 {
            self.fail_emits -= 1;
            return Err(SinkError::Write(std::io::Error::other("queue full")));
        }
        self.log.push(SinkRecord::Event(event));
        Ok(())
    }

    fn sync(&mut self) -> Result<(), SinkError> {
        self.log.push(SinkRecord::Sync);
        Ok(())
    }
}

pub type TestBridge = ControllerBridge<FakeController, RecordedDelay, RecordingSink>;

pub fn bridge(config: BridgeConfig, controller: FakeController) -> TestBridge {
    let link = RegisterLink::new(controller, RecordedDelay::default());
    ControllerBridge::new(Arc::new(config), link, RecordingSink::default())
}

pub fn config(mode: ReportMode, frequency_hz: u32) -> BridgeConfig {
    BridgeConfig {
        frequency_hz,
        ..BridgeConfig::for_mode(mode)
    }
}

pub fn last_delay(bridge: &TestBridge) -> Option<Duration> {
    bridge.link().delay_source().delays.last().copied()
}
