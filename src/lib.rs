//! Nintendo Classic Controller to Linux gamepad bridge.
//!
//! Polls the controller over I2C, decodes its packed reports and forwards only the state
//! changes to a virtual input device.

pub mod config;
pub mod controller;
pub mod output;
