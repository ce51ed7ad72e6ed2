// ProtonTPR Output Layer - Capability Mirror
// Derive the virtual device description from a real device

use crate::input::{CapabilitySet, DeviceIdentity, BTN_TRIGGER, EV_ABS, EV_KEY};

/// Default name of the virtual device
pub const DEFAULT_VIRTUAL_NAME: &str = "virtual-T-Pendular-Rudder";

/// Everything needed to register a virtual device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDeviceSpec {
    pub identity: DeviceIdentity,
    pub capabilities: CapabilitySet,
}

impl VirtualDeviceSpec {
    /// Describe the virtual twin of a real device.
    pub fn mirror(real: &DeviceIdentity, capabilities: &CapabilitySet, name: &str) -> Self {
        Self {
            identity: real.virtual_counterpart(name),
            capabilities: mirror_capabilities(capabilities),
        }
    }
}

/// Copy a capability set and add the synthetic trigger button.
///
/// Every type, code and property bit is carried over unchanged, absolute
/// axes with their full parameters. Without at least one button SDL classifies axis-only
/// devices as accelerometers, hence BTN_TRIGGER.
pub fn mirror_capabilities(real: &CapabilitySet) -> CapabilitySet {
    let mut mirrored = CapabilitySet::new();

    for event_type in real.event_types() {
        mirrored.enable_type(event_type);
        for code in real.codes(event_type) {
            let axis = if event_type == EV_ABS {
                real.axis_info(code).copied()
            } else {
                None
            };
            mirrored.enable_code(event_type, code, axis);
        }
    }

    for property in real.properties() {
        mirrored.enable_property(property);
    }
    mirrored.set_ff_effects_max(real.ff_effects_max());

    mirrored.enable_code(EV_KEY, BTN_TRIGGER, None);
    mirrored
}
