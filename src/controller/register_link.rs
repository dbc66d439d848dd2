//! Register-level access to the controller.
//!
//! A read is a pointer write followed by `N` sequential single-byte reads, each paced by a
//! short delay. The link never retries: any failure aborts the whole transfer and the caller
//! drops whatever was read so far. Retry policy belongs to the connection state machine.

use super::bus::{BusError, Delay, RegisterBus};
use super::report::REPORT_BASE_EXTENDED;
use std::time::Duration;
use tracing::trace;

/// Wait between the pointer write and the first read
pub const SETTLE_DELAY: Duration = Duration::from_micros(1);
/// The controller latches a fresh report when the pointer moves to the extended base.
pub const EXTENDED_SETTLE_DELAY: Duration = Duration::from_micros(100);
/// Wait after every byte read and every register write
pub const BYTE_DELAY: Duration = Duration::from_micros(1);

pub struct RegisterLink<B, D> {
    bus: B,
    delay: D,
}

impl<B: RegisterBus, D: Delay> RegisterLink<B, D> {
    pub fn new(bus: B, delay: D) -> Self {
        Self { bus, delay }
    }

    /// Fills `buf` from consecutive registers starting at `offset`.
    ///
    /// On error the contents of `buf` are unspecified and must be discarded.
    pub fn read_registers(&mut self, offset: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.bus.write_byte(offset)?;
        self.delay.delay(settle_delay(offset));
        for slot in buf.iter_mut() {
            *slot = self.bus.read_byte()?;
            self.delay.delay(BYTE_DELAY);
        }
        trace!("Read {:02x?} from {:#04x}", buf, offset);
        Ok(())
    }

    pub fn read_register(&mut self, offset: u8) -> Result<u8, BusError> {
        let mut value = [0u8; 1];
        self.read_registers(offset, &mut value)?;
        Ok(value[0])
    }

    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        self.bus.write_register(register, value)?;
        self.delay.delay(BYTE_DELAY);
        trace!("Wrote {:#04x} to {:#04x}", value, register);
        Ok(())
    }

    /// Blocks for `duration` on the link's delay source.
    pub fn pause(&mut self, duration: Duration) {
        self.delay.delay(duration);
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn delay_source(&self) -> &D {
        &self.delay
    }
}

fn settle_delay(offset: u8) -> Duration {
    if offset == REPORT_BASE_EXTENDED {
        EXTENDED_SETTLE_DELAY
    } else {
        SETTLE_DELAY
    }
}
