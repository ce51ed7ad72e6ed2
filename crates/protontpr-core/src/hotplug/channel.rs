// ProtonTPR udev Hotplug Channel
// Input subsystem notifications, annotated with USB ancestor ids

use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

use super::{is_event_node, HotplugAction, HotplugChannel, HotplugEvent};
use crate::error::{MirrorError, MirrorResult};
use crate::input::UsbIds;

/// Watches the udev `input` subsystem
pub struct UdevChannel {
    socket: udev::MonitorSocket,
}

impl UdevChannel {
    /// Open a non-blocking udev monitor for input devices
    pub fn new() -> MirrorResult<Self> {
        let socket = udev::MonitorBuilder::new()
            .and_then(|builder| builder.match_subsystem("input"))
            .and_then(|builder| builder.listen())
            .map_err(MirrorError::Hotplug)?;

        let fd = socket.as_raw_fd();
        // SAFETY: fd belongs to the socket we just opened
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL);
            if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
                return Err(MirrorError::Hotplug(std::io::Error::last_os_error()));
            }
        }

        Ok(Self { socket })
    }
}

/// idVendor/idProduct of the nearest USB device, starting at the device itself
fn usb_ids(device: &udev::Device) -> Option<UsbIds> {
    let is_usb_device = device.subsystem().map_or(false, |s| s == "usb")
        && device.devtype().map_or(false, |t| t == "usb_device");
    let owned;
    let usb = if is_usb_device {
        device
    } else {
        owned = device
            .parent_with_subsystem_devtype("usb", "usb_device")
            .ok()
            .flatten()?;
        &owned
    };

    let vendor = usb.attribute_value("idVendor")?.to_string_lossy().into_owned();
    let product = usb.attribute_value("idProduct")?.to_string_lossy().into_owned();
    Some(UsbIds::new(vendor, product))
}

/// /dev/input/event* nodes of a device's input children
fn child_event_nodes(device: &udev::Device) -> Vec<PathBuf> {
    let scan = || -> std::io::Result<Vec<PathBuf>> {
        let mut enumerator = udev::Enumerator::new()?;
        enumerator.match_parent(device)?;
        enumerator.match_subsystem("input")?;
        let mut nodes: Vec<PathBuf> = enumerator
            .scan_devices()?
            .filter_map(|child| child.devnode().map(PathBuf::from))
            .filter(|node| is_event_node(node))
            .collect();
        nodes.sort();
        Ok(nodes)
    };

    scan().unwrap_or_else(|e| {
        log::debug!("Could not scan children of {}: {}", device.syspath().display(), e);
        Vec::new()
    })
}

fn to_hotplug_event(action: HotplugAction, device: &udev::Device) -> HotplugEvent {
    let usb_ids = match action {
        HotplugAction::Add => usb_ids(device),
        HotplugAction::Remove => None,
    };
    // Children only matter for devices that can match
    let event_nodes = if usb_ids.is_some() {
        child_event_nodes(device)
    } else {
        Vec::new()
    };

    HotplugEvent {
        action,
        syspath: device.syspath().to_path_buf(),
        devnode: device.devnode().map(PathBuf::from),
        usb_ids,
        event_nodes,
    }
}

impl HotplugChannel for UdevChannel {
    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.socket.as_raw_fd())
    }

    fn existing(&mut self) -> MirrorResult<Vec<HotplugEvent>> {
        let scan = || -> std::io::Result<Vec<HotplugEvent>> {
            let mut enumerator = udev::Enumerator::new()?;
            enumerator.match_subsystem("input")?;
            Ok(enumerator
                .scan_devices()?
                .filter(|device| device.devnode().map_or(false, is_event_node))
                .map(|device| to_hotplug_event(HotplugAction::Add, &device))
                .collect())
        };
        scan().map_err(MirrorError::Hotplug)
    }

    fn receive(&mut self) -> Vec<HotplugEvent> {
        self.socket
            .iter()
            .filter_map(|event| {
                let action = match event.event_type() {
                    udev::EventType::Add => HotplugAction::Add,
                    udev::EventType::Remove => HotplugAction::Remove,
                    _ => return None,
                };
                Some(to_hotplug_event(action, &event.device()))
            })
            .collect()
    }
}
