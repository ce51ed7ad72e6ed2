// ProtonTPR Event Handling
// Frame forwarding, shutdown signalling and the run loop

pub mod batch;
pub mod forward;
pub mod r#loop;
pub mod shutdown;

pub use batch::{FrameBuffer, FramePush};
pub use evdev::InputEvent;
pub use forward::{Forwarder, PumpOutcome};
pub use r#loop::{RunLoop, WaitStrategy, DEFAULT_POLL_INTERVAL};
pub use shutdown::{Shutdown, ShutdownHandle, TERM_SIGNALS};
