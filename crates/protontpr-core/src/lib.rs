// ProtonTPR Core Library
// Mirror a physical input device into a uinput device with an extra button

pub mod backend;
pub mod error;
pub mod event;
pub mod hotplug;
pub mod input;
pub mod locate;
pub mod output;
pub mod settings;

pub use backend::{DeviceBackend, EventSink, EventSource, EvdevBackend};
pub use error::{MirrorError, MirrorResult};
pub use event::{Forwarder, PumpOutcome, RunLoop, Shutdown, ShutdownHandle, WaitStrategy};
pub use hotplug::{
    HotplugAction, HotplugChannel, HotplugEvent, HotplugMonitor, MonitorOptions, MonitorState,
    ReconnectPolicy, UdevChannel,
};
pub use input::{
    AxisInfo, CapabilitySet, DeviceIdentity, ReadOutcome, RealDevice, UsbFilter, UsbIds,
    BTN_TRIGGER,
};
pub use locate::{DeviceLocator, DEFAULT_SEARCH_DIR, DEFAULT_SEARCH_PATTERN};
pub use output::{
    check_registrable, mirror_capabilities, VirtualDevice, VirtualDeviceSpec, DEFAULT_VIRTUAL_NAME,
};
pub use settings::{DiscoveryMode, Settings, SettingsError, WaitMode};
