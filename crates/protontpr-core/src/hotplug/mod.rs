// ProtonTPR Hotplug
// Device add/remove notifications and the session state machine

mod channel;
mod monitor;

use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use crate::error::MirrorResult;
use crate::input::UsbIds;

pub use channel::UdevChannel;
pub use monitor::{HotplugMonitor, MonitorOptions, MonitorState, ReconnectPolicy};

/// Kind of hotplug notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugAction {
    Add,
    Remove,
}

/// A device add/remove notification, detached from the channel it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugEvent {
    pub action: HotplugAction,
    /// sysfs path of the notified device
    pub syspath: PathBuf,
    /// Device node of the notified device itself, if it has one
    pub devnode: Option<PathBuf>,
    /// Ids of the nearest USB device ancestor (absent on removal)
    pub usb_ids: Option<UsbIds>,
    /// /dev/input/event* nodes among the notified device's children
    pub event_nodes: Vec<PathBuf>,
}

impl HotplugEvent {
    pub fn add(syspath: impl Into<PathBuf>, usb_ids: Option<UsbIds>) -> Self {
        Self {
            action: HotplugAction::Add,
            syspath: syspath.into(),
            devnode: None,
            usb_ids,
            event_nodes: Vec::new(),
        }
    }

    pub fn remove(syspath: impl Into<PathBuf>) -> Self {
        Self {
            action: HotplugAction::Remove,
            syspath: syspath.into(),
            devnode: None,
            usb_ids: None,
            event_nodes: Vec::new(),
        }
    }

    pub fn with_devnode(mut self, devnode: impl Into<PathBuf>) -> Self {
        self.devnode = Some(devnode.into());
        self
    }

    pub fn with_event_node(mut self, node: impl Into<PathBuf>) -> Self {
        self.event_nodes.push(node.into());
        self
    }

    /// The evdev node to open for this notification.
    ///
    /// The device's own node wins when it is an event node; otherwise the
    /// first event node found among its children.
    pub fn event_node(&self) -> Option<&Path> {
        self.devnode
            .as_deref()
            .filter(|node| is_event_node(node))
            .or_else(|| self.event_nodes.first().map(PathBuf::as_path))
    }
}

/// Check if a path names an evdev character device (/dev/input/eventN)
pub fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| name.starts_with("event"))
}

/// Source of hotplug notifications
pub trait HotplugChannel {
    /// Descriptor that becomes readable when notifications are pending
    fn raw_fd(&self) -> Option<RawFd>;

    /// Devices already present, reported as add notifications
    fn existing(&mut self) -> MirrorResult<Vec<HotplugEvent>>;

    /// Pending notifications, without blocking
    fn receive(&mut self) -> Vec<HotplugEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_node_prefers_own_devnode() {
        let event = HotplugEvent::add("/sys/devices/x/input/input9/event7", None)
            .with_devnode("/dev/input/event7")
            .with_event_node("/dev/input/event8");
        assert_eq!(event.event_node(), Some(Path::new("/dev/input/event7")));
    }

    #[test]
    fn test_event_node_falls_back_to_children() {
        let event = HotplugEvent::add("/sys/devices/x/input/input9", None)
            .with_devnode("/dev/input/js0")
            .with_event_node("/dev/input/event8");
        assert_eq!(event.event_node(), Some(Path::new("/dev/input/event8")));
    }

    #[test]
    fn test_event_node_missing() {
        let event = HotplugEvent::add("/sys/devices/x", None);
        assert_eq!(event.event_node(), None);
    }

    #[test]
    fn test_is_event_node() {
        assert!(is_event_node(Path::new("/dev/input/event12")));
        assert!(!is_event_node(Path::new("/dev/input/mouse0")));
        assert!(!is_event_node(Path::new("/")));
    }
}
