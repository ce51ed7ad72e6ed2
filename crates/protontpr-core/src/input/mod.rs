// ProtonTPR Input Layer
// Real device access, capabilities and USB matching

mod capability;
mod device;
mod event;
mod filter;
mod identity;

pub use capability::{
    max_code, AxisInfo, CapabilitySet, BTN_TRIGGER, EV_ABS, EV_FF, EV_FF_STATUS, EV_KEY, EV_LED,
    EV_MAX, EV_MSC, EV_PWR, EV_REL, EV_REP, EV_SND, EV_SW, EV_SYN, INPUT_PROP_MAX,
};
pub use device::RealDevice;
pub use event::{event_triple, is_sync_dropped, is_sync_report, ReadOutcome, SYN_DROPPED, SYN_REPORT};
pub use filter::{UsbFilter, UsbIds};
pub use identity::DeviceIdentity;
