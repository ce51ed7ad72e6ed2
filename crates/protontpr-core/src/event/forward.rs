// ProtonTPR Event Forwarder
// Pump events from the real device into the virtual one, frame by frame

use super::batch::{FrameBuffer, FramePush};
use crate::backend::{EventSink, EventSource};
use crate::input::{event_triple, is_sync_dropped, ReadOutcome};

/// Why a pump stopped
#[derive(Debug)]
pub enum PumpOutcome {
    /// The source has nothing more to read for now
    Drained { forwarded: usize },
    /// The device went away
    Disconnected { forwarded: usize },
    /// Fatal read error on the device
    Failed {
        forwarded: usize,
        error: std::io::Error,
    },
}

impl PumpOutcome {
    /// Events handed to the sink during this pump, markers included
    pub fn forwarded(&self) -> usize {
        match self {
            PumpOutcome::Drained { forwarded }
            | PumpOutcome::Disconnected { forwarded }
            | PumpOutcome::Failed { forwarded, .. } => *forwarded,
        }
    }
}

/// Forwards events 1:1 and in order.
///
/// Events are buffered until their SYN_REPORT so that each frame reaches
/// the virtual device as one write. A frame left open when the source runs
/// dry stays buffered for the next pump. When the source is lost mid-frame
/// the open events are written as they are, with no marker added.
#[derive(Debug, Default)]
pub struct Forwarder {
    frame: FrameBuffer,
    total: u64,
}

impl Forwarder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read until the source would block or fails.
    pub fn pump<S, K>(&mut self, source: &mut S, sink: &mut K) -> PumpOutcome
    where
        S: EventSource + ?Sized,
        K: EventSink + ?Sized,
    {
        let mut forwarded = 0;
        loop {
            match source.next_event() {
                ReadOutcome::Event(event) => {
                    log::trace!("event {:?}", event_triple(&event));
                    if is_sync_dropped(&event) {
                        log::debug!(
                            "{} dropped events, forwarding resync state",
                            source.path().display()
                        );
                    }
                    if self.frame.push(event) == FramePush::Complete {
                        forwarded += self.flush(sink);
                    }
                }
                ReadOutcome::WouldBlock => return PumpOutcome::Drained { forwarded },
                ReadOutcome::Disconnected => {
                    forwarded += self.abandon(sink);
                    return PumpOutcome::Disconnected { forwarded };
                }
                ReadOutcome::Failed(error) => {
                    forwarded += self.abandon(sink);
                    return PumpOutcome::Failed { forwarded, error };
                }
            }
        }
    }

    /// Events forwarded since creation
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Events waiting for their SYN_REPORT
    pub fn pending(&self) -> usize {
        self.frame.len()
    }

    /// Forget an open frame (new session)
    pub fn reset(&mut self) {
        self.frame.clear();
    }

    /// Hand an unterminated frame to the sink once its source is gone.
    ///
    /// Returns events written.
    pub fn abandon<K: EventSink + ?Sized>(&mut self, sink: &mut K) -> usize {
        if self.frame.is_empty() {
            return 0;
        }
        let events = self.frame.take();
        match sink.emit_unterminated(&events) {
            Ok(()) => self.count(events.len()),
            Err(e) => {
                log::warn!("Failed to write {} events to virtual device: {}", events.len(), e);
                0
            }
        }
    }

    /// Write the completed frame plus its marker. Returns events written.
    fn flush<K: EventSink + ?Sized>(&mut self, sink: &mut K) -> usize {
        let events = self.frame.take();
        match sink.emit_frame(&events) {
            Ok(()) => self.count(events.len() + 1),
            Err(e) => {
                log::warn!("Failed to write {} events to virtual device: {}", events.len() + 1, e);
                0
            }
        }
    }

    fn count(&mut self, written: usize) -> usize {
        self.total += written as u64;
        written
    }
}
