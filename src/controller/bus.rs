//! Raw I2C primitives the link is built on.

use rppal::i2c::I2c;
use std::time::Duration;
use tracing::{debug, info};

/// Bus errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("Failed to open I2C bus: {0}")]
    Open(String),

    #[error("I2C write failed: {0}")]
    Write(String),

    #[error("I2C read failed: {0}")]
    Read(String),
}

/// Single-byte access to one fixed peripheral
pub trait RegisterBus {
    /// Sends one byte without a register prefix; used to move the register pointer.
    fn write_byte(&mut self, value: u8) -> Result<(), BusError>;

    /// Reads the byte at the register pointer, which then advances by one.
    fn read_byte(&mut self) -> Result<u8, BusError>;

    /// Writes `value` into `register`.
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError>;
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    fn write_byte(&mut self, value: u8) -> Result<(), BusError> {
        (**self).write_byte(value)
    }

    fn read_byte(&mut self) -> Result<u8, BusError> {
        (**self).read_byte()
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        (**self).write_register(register, value)
    }
}

/// Blocking pause used for pacing, retries, backoff and the poll interval
pub trait Delay {
    fn delay(&mut self, duration: Duration);
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}

/// [`Delay`] backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Linux I2C adapter talking SMBus byte transfers to the controller
pub struct I2cBus {
    i2c: I2c,
}

impl I2cBus {
    /// Opens `/dev/i2c-{bus}` and selects the peripheral at `address`.
    pub fn open(bus: u8, address: u16) -> Result<Self, BusError> {
        debug!("Opening I2C bus {} for address {:#04x}", bus, address);
        let mut i2c = I2c::with_bus(bus).map_err(|e| BusError::Open(e.to_string()))?;
        i2c.set_slave_address(address)
            .map_err(|e| BusError::Open(e.to_string()))?;
        info!("Opened /dev/i2c-{} (address {:#04x})", bus, address);
        Ok(Self { i2c })
    }
}

impl RegisterBus for I2cBus {
    fn write_byte(&mut self, value: u8) -> Result<(), BusError> {
        self.i2c
            .smbus_send_byte(value)
            .map_err(|e| BusError::Write(e.to_string()))
    }

    fn read_byte(&mut self) -> Result<u8, BusError> {
        self.i2c
            .smbus_receive_byte()
            .map_err(|e| BusError::Read(e.to_string()))
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        self.i2c
            .smbus_write_byte(register, value)
            .map_err(|e| BusError::Write(e.to_string()))
    }
}
