// ProtonTPR Input Layer - Event Reads
// Outcome of a non-blocking read and synchronization marker checks

use evdev::{EventType, InputEvent};

use super::capability::EV_SYN;

/// SYN_REPORT code: closes a frame of events
pub const SYN_REPORT: u16 = 0x00;

/// SYN_DROPPED code: the kernel buffer overflowed and events were lost
pub const SYN_DROPPED: u16 = 0x03;

/// Result of one non-blocking read from a real device
#[derive(Debug)]
pub enum ReadOutcome {
    /// One event, in kernel order
    Event(InputEvent),
    /// Nothing to read right now
    WouldBlock,
    /// The device node is gone (ENODEV)
    Disconnected,
    /// Any other read failure; fatal for the handle
    Failed(std::io::Error),
}

impl ReadOutcome {
    /// Classify a read error.
    pub fn from_io_error(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::WouldBlock
            || err.kind() == std::io::ErrorKind::Interrupted
        {
            return ReadOutcome::WouldBlock;
        }
        if err.raw_os_error() == Some(libc::ENODEV) {
            return ReadOutcome::Disconnected;
        }
        ReadOutcome::Failed(err)
    }
}

/// Check if an event is a SYN_REPORT frame marker.
pub fn is_sync_report(event: &InputEvent) -> bool {
    event.event_type() == EventType::SYNCHRONIZATION && event.code() == SYN_REPORT
}

/// Check if an event signals dropped events.
pub fn is_sync_dropped(event: &InputEvent) -> bool {
    event.event_type().0 == EV_SYN && event.code() == SYN_DROPPED
}

/// Raw (type, code, value) triple of an event
pub fn event_triple(event: &InputEvent) -> (u16, u16, i32) {
    (event.event_type().0, event.code(), event.value())
}
