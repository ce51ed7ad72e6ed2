// ProtonTPR Frame Buffering
// Collect events up to their SYN_REPORT so a frame is written in one go

use evdev::InputEvent;

use crate::input::is_sync_report;

/// What pushing an event did to the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePush {
    /// The event was buffered, the frame is still open
    Pending,
    /// The event was a SYN_REPORT; the frame is ready to be written
    Complete,
}

/// Events of the frame currently being read.
///
/// The closing SYN_REPORT is not stored: the uinput write appends it.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    events: Vec<InputEvent>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            events: Vec::with_capacity(16),
        }
    }

    /// Add an event to the open frame
    pub fn push(&mut self, event: InputEvent) -> FramePush {
        if is_sync_report(&event) {
            FramePush::Complete
        } else {
            self.events.push(event);
            FramePush::Pending
        }
    }

    /// Take the buffered events, leaving the buffer empty
    pub fn take(&mut self) -> Vec<InputEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
