//! Controller link protocol
//!
//! Layered bottom-up:
//!
//! 1. [`bus`] - single-byte I2C primitives and the blocking delay source
//! 2. [`register_link`] - paced multi-byte register reads and register writes
//! 3. [`report`] - report modes, snapshots and the packet decoder
//! 4. [`emitter`] - snapshot diffing into pad events
//! 5. [`connection`] - the connect/poll state machine
//! 6. [`bridge`] - the single-threaded poll loop tying it all together
//!
//! # Architecture
//!
//! ```text
//! I2C ──► RegisterLink ──► decode ──► Snapshot ──► diff_and_emit ──► InputSink
//!              ▲                                        │
//!              └──────────── ControllerLink ◄───────────┘
//!                       (Disconnected / Connected)
//! ```

pub mod bridge;
pub mod bus;
pub mod connection;
pub mod emitter;
pub mod register_link;
pub mod report;

pub use bridge::{ControllerBridge, LinkPhase, LinkStats, StepOutcome};
pub use bus::{BusError, Delay, I2cBus, RegisterBus, ThreadDelay};
pub use connection::{ControllerLink, DeviceId, LinkError, PollReport};
pub use emitter::{diff_and_emit, EmitError, EmitOutcome};
pub use register_link::RegisterLink;
pub use report::{decode, ReportMode, Snapshot};
