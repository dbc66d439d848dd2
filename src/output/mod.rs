//! Output side of the bridge: logical gamepad events and the sinks that consume them.
//!
//! The controller core never talks to a device node directly. It pushes [`PadEvent`]s into an
//! [`InputSink`] and closes every non-empty batch with [`InputSink::sync`].
//!
//! ```text
//! Snapshot diff ──► PadEvent ──► InputSink ──► /dev/uinput (UinputSink)
//!                                         └──► tracing     (LogSink)
//! ```

pub mod log_sink;
#[cfg(feature = "uinput")]
pub mod uinput;

pub use log_sink::LogSink;
#[cfg(feature = "uinput")]
pub use uinput::UinputSink;

use serde::{Deserialize, Serialize};

/// Logical buttons a bit of the report can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadButton {
    South,
    East,
    North,
    West,
    LeftBumper,
    RightBumper,
    LeftTrigger,
    RightTrigger,
    Select,
    Start,
    Mode,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    LeftThumb,
    RightThumb,
}

/// Logical analog axes, in the channel order of the extended report formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadAxis {
    LeftX,
    RightX,
    LeftY,
    RightY,
    LeftTrigger,
    RightTrigger,
}

impl PadAxis {
    /// All axes indexed by report channel.
    pub const CHANNELS: [PadAxis; 6] = [
        PadAxis::LeftX,
        PadAxis::RightX,
        PadAxis::LeftY,
        PadAxis::RightY,
        PadAxis::LeftTrigger,
        PadAxis::RightTrigger,
    ];

    pub fn from_channel(channel: usize) -> Option<Self> {
        Self::CHANNELS.get(channel).copied()
    }

    /// Y axes grow downwards on the wire; pushing the stick up must decrease the output.
    pub fn is_inverted(self) -> bool {
        matches!(self, PadAxis::LeftY | PadAxis::RightY)
    }
}

/// Smallest and largest value an axis event can carry.
pub const AXIS_MIN: i32 = -127;
pub const AXIS_MAX: i32 = 127;

/// A single state transition sent to the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadEvent {
    Button { button: PadButton, pressed: bool },
    Axis { axis: PadAxis, value: i32 },
}

/// Sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to create virtual device: {0}")]
    DeviceCreation(String),

    #[error("Failed to write event: {0}")]
    Write(#[from] std::io::Error),
}

/// Consumer of pad events.
///
/// Implementations must treat [`sync`](InputSink::sync) as the end of one consistent batch.
pub trait InputSink {
    fn emit(&mut self, event: PadEvent) -> Result<(), SinkError>;

    fn sync(&mut self) -> Result<(), SinkError>;
}

impl<K: InputSink + ?Sized> InputSink for Box<K> {
    fn emit(&mut self, event: PadEvent) -> Result<(), SinkError> {
        (**self).emit(event)
    }

    fn sync(&mut self) -> Result<(), SinkError> {
        (**self).sync()
    }
}
