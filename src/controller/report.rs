//! Report formats and the packet decoder.
//!
//! The controller exposes three incompatible layouts. All of them end in the same 16-bit,
//! active-low button word; they differ in how many analog channels precede it and how those
//! channels are packed.
//!
//! Legacy 4-axis layout (bytes 0-3, bit 7 on the left):
//!
//! ```text
//!        7    6    5    4    3    2    1    0
//! b0   RX4  RX3  LX5  LX4  LX3  LX2  LX1  LX0
//! b1   RX2  RX1  LY5  LY4  LY3  LY2  LY1  LY0
//! b2   RX0  LT4  LT3  RY4  RY3  RY2  RY1  RY0
//! b3   LT2  LT1  LT0  RT4  RT3  RT2  RT1  RT0
//! ```
//!
//! The trigger fields are not exposed in this mode.

use serde::{Deserialize, Serialize};

pub const BUTTON_BITS: usize = 16;
pub const MAX_CHANNELS: usize = 6;
pub const AXIS_CENTER: u8 = 128;

/// Button word with every button released
pub const BUTTONS_RELEASED: u16 = 0xFFFF;

/// Report register base for the digital layout
pub const REPORT_BASE_LEGACY: u8 = 0x04;
/// Report register base for the extended analog layouts
pub const REPORT_BASE_EXTENDED: u8 = 0x00;

/// Wire layout negotiated with the controller at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// Buttons only
    Digital,
    /// Two sticks with reduced precision
    Analog4,
    /// Two full-precision sticks plus both analog triggers
    Analog6,
}

impl ReportMode {
    pub fn report_len(self) -> usize {
        match self {
            ReportMode::Digital => 2,
            ReportMode::Analog4 => 6,
            ReportMode::Analog6 => 8,
        }
    }

    pub fn report_offset(self) -> u8 {
        match self {
            ReportMode::Digital => REPORT_BASE_LEGACY,
            ReportMode::Analog4 | ReportMode::Analog6 => REPORT_BASE_EXTENDED,
        }
    }

    pub fn axis_count(self) -> usize {
        match self {
            ReportMode::Digital => 0,
            ReportMode::Analog4 => 4,
            ReportMode::Analog6 => 6,
        }
    }

    /// Value for the data format register, if the mode needs one.
    pub fn data_format(self) -> Option<u8> {
        match self {
            ReportMode::Digital => None,
            ReportMode::Analog4 => Some(0x01),
            ReportMode::Analog6 => Some(0x03),
        }
    }
}

/// One decoded instant of controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    buttons: u16,
    channels: [u8; MAX_CHANNELS],
    channel_count: usize,
}

impl Snapshot {
    /// Channels past the sixth are ignored.
    pub fn new(buttons: u16, channels: &[u8]) -> Self {
        let channel_count = channels.len().min(MAX_CHANNELS);
        let mut packed = [AXIS_CENTER; MAX_CHANNELS];
        packed[..channel_count].copy_from_slice(&channels[..channel_count]);
        Self {
            buttons,
            channels: packed,
            channel_count,
        }
    }

    /// Every button released and every channel of `mode` centered.
    pub fn released(mode: ReportMode) -> Self {
        Self {
            buttons: BUTTONS_RELEASED,
            channels: [AXIS_CENTER; MAX_CHANNELS],
            channel_count: mode.axis_count(),
        }
    }

    /// Raw active-low button word.
    pub fn buttons(&self) -> u16 {
        self.buttons
    }

    pub fn channels(&self) -> &[u8] {
        &self.channels[..self.channel_count]
    }

    pub fn is_pressed(&self, bit: usize) -> bool {
        bit < BUTTON_BITS && self.buttons & (1 << bit) == 0
    }

    /// A button byte reading all zeros is a bus glitch, not a real state.
    pub fn is_valid(&self) -> bool {
        let [low, high] = self.buttons.to_le_bytes();
        low != 0x00 && high != 0x00
    }
}

/// Decodes a raw report. Never fails; missing bytes read as zero and yield an invalid snapshot.
pub fn decode(mode: ReportMode, raw: &[u8]) -> Snapshot {
    let byte = |index: usize| raw.get(index).copied().unwrap_or(0);
    let buttons = |index: usize| u16::from_le_bytes([byte(index), byte(index + 1)]);

    match mode {
        ReportMode::Digital => Snapshot::new(buttons(0), &[]),
        ReportMode::Analog4 => {
            let (b0, b1, b2) = (byte(0), byte(1), byte(2));
            let left_x = six_bit(b0 & 0x3F);
            let left_y = six_bit(b1 & 0x3F);
            let right_x = five_bit(((b0 & 0xC0) >> 3) | ((b1 & 0xC0) >> 5) | ((b2 & 0x80) >> 7));
            let right_y = five_bit(b2 & 0x1F);
            Snapshot::new(buttons(4), &[left_x, right_x, left_y, right_y])
        }
        ReportMode::Analog6 => {
            let channels = [byte(0), byte(1), byte(2), byte(3), byte(4), byte(5)];
            Snapshot::new(buttons(6), &channels)
        }
    }
}

fn six_bit(value: u8) -> u8 {
    value << 2
}

// Replicate the top bits into the bottom so 31 reaches full scale.
fn five_bit(value: u8) -> u8 {
    (value << 3) | (value >> 2)
}
