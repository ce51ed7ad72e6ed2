// ProtonTPR Input Layer - Real Device Handle
// Open evdev device with its capabilities, read without blocking

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use evdev::{Device, InputEvent};

use super::capability::{
    AxisInfo, CapabilitySet, EV_ABS, EV_FF, EV_KEY, EV_LED, EV_MSC, EV_REL, EV_SND, EV_SW,
};
use super::event::ReadOutcome;
use super::identity::DeviceIdentity;
use crate::backend::EventSource;
use crate::error::{MirrorError, MirrorResult};

/// Physical input device opened for mirroring.
///
/// The evdev `Device` owns both the file descriptor and the parsed
/// descriptor state, so they are always released together on drop.
pub struct RealDevice {
    path: PathBuf,
    device: Device,
    identity: DeviceIdentity,
    capabilities: CapabilitySet,
    /// Events already read from the kernel but not yet handed out
    pending: VecDeque<InputEvent>,
}

impl RealDevice {
    /// Open a device node non-blocking and read its capabilities.
    ///
    /// Path and permission problems are reported as `Open`, failures to
    /// query the descriptor as `Context`.
    ///
    /// evdev 0.12 has no read-only constructor: `Device::open` tries
    /// read-write first and falls back to read-only. The handle is never
    /// written to, so the extra access mode is unused.
    pub fn open(path: &Path) -> MirrorResult<Self> {
        // Check read-only access first so permission errors are not
        // mistaken for a broken descriptor
        OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| MirrorError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let context_err = |source| MirrorError::Context {
            path: path.to_path_buf(),
            source,
        };

        // The node can vanish between the check and the real open
        let device = Device::open(path).map_err(|source| {
            if is_open_failure(&source) {
                MirrorError::Open {
                    path: path.to_path_buf(),
                    source,
                }
            } else {
                context_err(source)
            }
        })?;
        set_nonblocking(device.as_raw_fd()).map_err(context_err)?;

        let identity = identity_of(&device);
        let capabilities = read_capabilities(&device).map_err(context_err)?;

        log::debug!(
            "Opened {} as {} with {} capability codes",
            path.display(),
            identity,
            capabilities.code_count()
        );

        Ok(Self {
            path: path.to_path_buf(),
            device,
            identity,
            capabilities,
            pending: VecDeque::new(),
        })
    }
}

impl EventSource for RealDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    fn next_event(&mut self) -> ReadOutcome {
        if let Some(event) = self.pending.pop_front() {
            return ReadOutcome::Event(event);
        }

        // fetch_events resynchronizes after SYN_DROPPED and yields the
        // resync events inline, so they are queued like any other batch
        match self.device.fetch_events() {
            Ok(events) => self.pending.extend(events),
            Err(err) => return ReadOutcome::from_io_error(err),
        }

        match self.pending.pop_front() {
            Some(event) => ReadOutcome::Event(event),
            None => ReadOutcome::WouldBlock,
        }
    }

    fn health_check(&self) -> bool {
        let fd = self.device.as_raw_fd();
        // SAFETY: F_GETFD only inspects descriptor flags
        if unsafe { libc::fcntl(fd, libc::F_GETFD) } == -1 {
            return false;
        }
        // evdev ioctls fail with ENODEV once the device is gone; reading
        // the key state does not consume queued events
        self.device.get_key_state().is_ok()
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.device.as_raw_fd())
    }
}

/// Errors that mean the node is gone or not accessible
fn is_open_failure(err: &std::io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOENT | libc::ENODEV | libc::ENXIO | libc::ENOTDIR | libc::EACCES | libc::EPERM)
    )
}

fn set_nonblocking(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: plain fcntl flag manipulation on a descriptor we own
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn identity_of(device: &Device) -> DeviceIdentity {
    let id = device.input_id();
    DeviceIdentity::new(
        device.name().unwrap_or("Unknown"),
        id.bus_type().0,
        id.vendor(),
        id.product(),
        id.version(),
    )
}

/// Collect every type and code the device declares.
fn read_capabilities(device: &Device) -> std::io::Result<CapabilitySet> {
    let mut caps = CapabilitySet::new();

    for event_type in device.supported_events().iter() {
        caps.enable_type(event_type.0);
    }

    if let Some(keys) = device.supported_keys() {
        for key in keys.iter() {
            caps.enable_code(EV_KEY, key.code(), None);
        }
    }

    if let Some(axes) = device.supported_absolute_axes() {
        let state = device.get_abs_state()?;
        for axis in axes.iter() {
            let info = state.get(axis.0 as usize).map(AxisInfo::from);
            caps.enable_code(EV_ABS, axis.0, Some(info.unwrap_or_default()));
        }
    }

    if let Some(axes) = device.supported_relative_axes() {
        for axis in axes.iter() {
            caps.enable_code(EV_REL, axis.0, None);
        }
    }

    if let Some(switches) = device.supported_switches() {
        for switch in switches.iter() {
            caps.enable_code(EV_SW, switch.0, None);
        }
    }

    if let Some(misc) = device.misc_properties() {
        for code in misc.iter() {
            caps.enable_code(EV_MSC, code.0, None);
        }
    }

    if let Some(leds) = device.supported_leds() {
        for led in leds.iter() {
            caps.enable_code(EV_LED, led.0, None);
        }
    }

    if let Some(sounds) = device.supported_sounds() {
        for sound in sounds.iter() {
            caps.enable_code(EV_SND, sound.0, None);
        }
    }

    if let Some(effects) = device.supported_ff() {
        for effect in effects.iter() {
            caps.enable_code(EV_FF, effect.0, None);
        }
        caps.set_ff_effects_max(u32::try_from(device.max_ff_effects()).unwrap_or(u32::MAX));
    }

    for property in device.properties().iter() {
        caps.enable_property(property.0);
    }

    Ok(caps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_path_is_open_error() {
        let err = RealDevice::open(Path::new("/nonexistent/protontpr/event99"))
            .err()
            .expect("opening a missing node must fail");
        assert!(matches!(err, MirrorError::Open { .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_open_regular_file_is_context_error() {
        // A readable file that is not an evdev node passes the access check
        // but fails the descriptor ioctls
        let file = tempfile::NamedTempFile::new().unwrap();
        match RealDevice::open(file.path()) {
            Err(MirrorError::Context { .. }) => {}
            Err(e) => panic!("Unexpected error: {}", e),
            Ok(_) => panic!("a regular file must not open as an input device"),
        }
    }

    #[test]
    fn test_vanished_node_is_open_error() {
        for errno in [libc::ENOENT, libc::ENODEV, libc::EACCES] {
            assert!(is_open_failure(&std::io::Error::from_raw_os_error(errno)));
        }
        // A node that is not an evdev device rejects the ioctls
        assert!(!is_open_failure(&std::io::Error::from_raw_os_error(libc::ENOTTY)));
        assert!(!is_open_failure(&std::io::Error::from_raw_os_error(libc::EINVAL)));
    }

    #[test]
    fn test_set_nonblocking_on_pipe() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        set_nonblocking(fds[0]).unwrap();
        let flags = unsafe { libc::fcntl(fds[0], libc::F_GETFL) };
        assert_ne!(flags & libc::O_NONBLOCK, 0);
        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
