//! Snapshot diffing.
//!
//! Turns two consecutive snapshots into the minimal set of [`PadEvent`]s. A batch is only
//! closed with a sync marker when it contains at least one event, so an idle controller
//! produces no sink traffic at all.

use super::report::{Snapshot, AXIS_CENTER, BUTTON_BITS};
use crate::config::ButtonMap;
use crate::output::{InputSink, PadAxis, PadEvent, SinkError, AXIS_MAX, AXIS_MIN};
use tracing::{debug, trace, warn};

/// What a diff pass did with the current snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// The snapshot was a bus glitch; nothing was sent and it must not become the baseline.
    Dropped,
    /// Nothing changed since the baseline.
    Unchanged,
    /// This many events were sent, followed by one sync marker.
    Emitted(usize),
}

impl EmitOutcome {
    /// Whether the snapshot may replace the baseline.
    pub fn is_accepted(self) -> bool {
        !matches!(self, EmitOutcome::Dropped)
    }
}

/// The sink rejected part of a batch. The rest of the batch and its sync marker were still sent.
#[derive(Debug, thiserror::Error)]
#[error("Sink rejected part of the batch ({written} events written): {source}")]
pub struct EmitError {
    /// Events the sink accepted
    pub written: usize,
    #[source]
    pub source: SinkError,
}

/// Emits one event per changed button or axis between `previous` and `current`.
///
/// A rejected event does not abort the batch. Every remaining event is still offered to the
/// sink and the batch is closed with a sync marker; the first failure is returned afterwards.
pub fn diff_and_emit<K: InputSink + ?Sized>(
    buttons: &ButtonMap,
    current: &Snapshot,
    previous: &Snapshot,
    sink: &mut K,
) -> Result<EmitOutcome, EmitError> {
    if !current.is_valid() {
        debug!(
            "Dropping glitched report (buttons {:#06x})",
            current.buttons()
        );
        return Ok(EmitOutcome::Dropped);
    }

    let mut batch = Batch::new(sink);

    for bit in 0..BUTTON_BITS {
        let Some(button) = buttons.get(bit) else {
            continue;
        };
        let pressed = current.is_pressed(bit);
        if pressed != previous.is_pressed(bit) {
            trace!("Bit {} -> {:?} pressed={}", bit, button, pressed);
            batch.emit(PadEvent::Button { button, pressed });
        }
    }

    let channels = current.channels().iter().zip(previous.channels());
    for (channel, (&now, &before)) in channels.enumerate() {
        if now == before {
            continue;
        }
        let Some(axis) = PadAxis::from_channel(channel) else {
            continue;
        };
        let value = axis_value(axis, now);
        trace!("Channel {} -> {:?} = {}", channel, axis, value);
        batch.emit(PadEvent::Axis { axis, value });
    }

    batch.finish()
}

struct Batch<'a, K: ?Sized> {
    sink: &'a mut K,
    attempted: usize,
    written: usize,
    error: Option<SinkError>,
}

impl<'a, K: InputSink + ?Sized> Batch<'a, K> {
    fn new(sink: &'a mut K) -> Self {
        Self {
            sink,
            attempted: 0,
            written: 0,
            error: None,
        }
    }

    fn emit(&mut self, event: PadEvent) {
        self.attempted += 1;
        match self.sink.emit(event) {
            Ok(()) => self.written += 1,
            Err(e) => {
                warn!("Sink rejected {:?}: {}", event, e);
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
    }

    fn finish(mut self) -> Result<EmitOutcome, EmitError> {
        if self.attempted == 0 {
            return Ok(EmitOutcome::Unchanged);
        }
        let synced = self.sink.sync();
        match (self.error, synced) {
            (None, Ok(())) => Ok(EmitOutcome::Emitted(self.written)),
            (Some(source), _) | (None, Err(source)) => Err(EmitError {
                written: self.written,
                source,
            }),
        }
    }
}

/// Centers a raw channel on zero, flipping the Y axes.
pub fn axis_value(axis: PadAxis, raw: u8) -> i32 {
    let centered = i32::from(raw) - i32::from(AXIS_CENTER);
    let value = if axis.is_inverted() {
        -centered
    } else {
        centered
    };
    value.clamp(AXIS_MIN, AXIS_MAX)
}
