// ProtonTPR Device Backend
//
// This module defines the seams between the lifecycle logic and the kernel:
// a readable real device, a writable virtual device, and a backend that
// creates both.

use std::os::unix::io::RawFd;
use std::path::Path;

use evdev::InputEvent;

use crate::error::MirrorResult;
use crate::input::{CapabilitySet, DeviceIdentity, ReadOutcome, RealDevice};
use crate::output::{VirtualDevice, VirtualDeviceSpec};

/// A physical device the mirror reads from
pub trait EventSource {
    /// Device node the handle was opened from
    fn path(&self) -> &Path;

    fn identity(&self) -> &DeviceIdentity;

    /// Full capability set, parsed at open time
    fn capabilities(&self) -> &CapabilitySet;

    /// Read one event without blocking
    fn next_event(&mut self) -> ReadOutcome;

    /// Check the handle is still usable without consuming events
    fn health_check(&self) -> bool;

    /// Descriptor to wait on for readiness, if there is one
    fn raw_fd(&self) -> Option<RawFd>;
}

/// A registered virtual device the mirror writes to
pub trait EventSink {
    /// Device node of the virtual device, when it could be resolved
    fn devnode(&self) -> Option<&Path>;

    /// Capabilities the device was registered with
    fn capabilities(&self) -> &CapabilitySet;

    /// Write one frame of events. The sink terminates it with SYN_REPORT.
    fn emit_frame(&mut self, events: &[InputEvent]) -> std::io::Result<()>;

    /// Write events without closing the frame
    fn emit_unterminated(&mut self, events: &[InputEvent]) -> std::io::Result<()>;
}

/// Factory for real and virtual device handles
pub trait DeviceBackend {
    type Source: EventSource;
    type Sink: EventSink;

    /// Open a real device node
    fn open(&mut self, path: &Path) -> MirrorResult<Self::Source>;

    /// Register a virtual device
    fn create_virtual(&mut self, spec: &VirtualDeviceSpec) -> MirrorResult<Self::Sink>;
}

/// Backend for real hardware: evdev for reads, uinput for the virtual device
#[derive(Debug, Default, Clone, Copy)]
pub struct EvdevBackend;

impl DeviceBackend for EvdevBackend {
    type Source = RealDevice;
    type Sink = VirtualDevice;

    fn open(&mut self, path: &Path) -> MirrorResult<RealDevice> {
        RealDevice::open(path)
    }

    fn create_virtual(&mut self, spec: &VirtualDeviceSpec) -> MirrorResult<VirtualDevice> {
        VirtualDevice::create(spec)
    }
}
