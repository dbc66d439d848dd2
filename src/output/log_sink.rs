//! Sink that writes events to the log instead of a device node.

use super::{InputSink, PadEvent, SinkError};
use tracing::info;

/// Logs every event at info level; used for dry runs and builds without uinput support
#[derive(Debug, Default)]
pub struct LogSink {
    pending: usize,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputSink for LogSink {
    fn emit(&mut self, event: PadEvent) -> Result<(), SinkError> {
        match event {
            PadEvent::Button { button, pressed } => {
                info!("Button {:?} {}", button, if pressed { "pressed" } else { "released" });
            }
            PadEvent::Axis { axis, value } => info!("Axis {:?} = {}", axis, value),
        }
        self.pending += 1;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), SinkError> {
        info!("Sync ({} events)", self.pending);
        self.pending = 0;
        Ok(())
    }
}
