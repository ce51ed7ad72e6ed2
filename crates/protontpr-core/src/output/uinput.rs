// ProtonTPR uinput Output Layer
// Virtual device registration and event emission

use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use evdev::uinput::VirtualDeviceBuilder;
use evdev::{
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, FFEffectType, InputEvent, InputId, Key,
    MiscType, PropType, RelativeAxisType, SwitchType, UinputAbsSetup,
};

use super::mirror::VirtualDeviceSpec;
use crate::backend::EventSink;
use crate::error::{MirrorError, MirrorResult};
use crate::input::{CapabilitySet, EV_ABS, EV_FF, EV_KEY, EV_MSC, EV_REL, EV_SW, EV_SYN};

/// Event types the uinput builder can register
pub const REGISTRABLE_TYPES: [u16; 7] = [EV_SYN, EV_KEY, EV_REL, EV_ABS, EV_MSC, EV_SW, EV_FF];

/// Virtual uinput device mirroring a real one.
///
/// Dropping it destroys the uinput node.
pub struct VirtualDevice {
    device: evdev::uinput::VirtualDevice,
    devnode: Option<PathBuf>,
    capabilities: CapabilitySet,
}

fn creation_error(err: std::io::Error) -> MirrorError {
    MirrorError::VirtualCreation(err.to_string())
}

/// Refuse capability sets that would be registered only in part.
///
/// LED and sound bits, EV_REP, EV_PWR and EV_FF_STATUS have no builder call
/// in evdev 0.12, so a device declaring them cannot be mirrored.
pub fn check_registrable(caps: &CapabilitySet) -> MirrorResult<()> {
    let unsupported: Vec<String> = caps
        .event_types()
        .filter(|event_type| !REGISTRABLE_TYPES.contains(event_type))
        .map(|event_type| format!("0x{:02x}", event_type))
        .collect();

    if unsupported.is_empty() {
        Ok(())
    } else {
        Err(MirrorError::VirtualCreation(format!(
            "event types {} cannot be registered through uinput",
            unsupported.join(", ")
        )))
    }
}

impl VirtualDevice {
    /// Register a virtual device with exactly the capabilities of a spec
    pub fn create(spec: &VirtualDeviceSpec) -> MirrorResult<Self> {
        let caps = &spec.capabilities;
        let id = &spec.identity;
        check_registrable(caps)?;

        // What has actually been handed to the kernel
        let mut registered = CapabilitySet::new();
        if caps.has_type(EV_SYN) {
            registered.enable_type(EV_SYN);
        }

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(creation_error)?
            .name(&id.name)
            .input_id(InputId::new(BusType(id.bus_type), id.vendor, id.product, id.version));

        if caps.has_type(EV_KEY) {
            let keys: AttributeSet<Key> = caps.codes(EV_KEY).map(Key::new).collect();
            builder = builder.with_keys(&keys).map_err(creation_error)?;
            register_codes(&mut registered, caps, EV_KEY);
        }

        if caps.has_type(EV_ABS) {
            registered.enable_type(EV_ABS);
        }
        for (code, info) in caps.axes() {
            let setup = UinputAbsSetup::new(
                AbsoluteAxisType(code),
                AbsInfo::new(
                    info.value,
                    info.minimum,
                    info.maximum,
                    info.fuzz,
                    info.flat,
                    info.resolution,
                ),
            );
            builder = builder.with_absolute_axis(&setup).map_err(creation_error)?;
            registered.enable_code(EV_ABS, code, caps.axis_info(code).copied());
        }

        if caps.has_type(EV_REL) {
            let axes: AttributeSet<RelativeAxisType> =
                caps.codes(EV_REL).map(RelativeAxisType).collect();
            builder = builder.with_relative_axes(&axes).map_err(creation_error)?;
            register_codes(&mut registered, caps, EV_REL);
        }

        if caps.has_type(EV_MSC) {
            let misc: AttributeSet<MiscType> = caps.codes(EV_MSC).map(MiscType).collect();
            builder = builder.with_msc(&misc).map_err(creation_error)?;
            register_codes(&mut registered, caps, EV_MSC);
        }

        if caps.has_type(EV_SW) {
            let switches: AttributeSet<SwitchType> = caps.codes(EV_SW).map(SwitchType).collect();
            builder = builder.with_switches(&switches).map_err(creation_error)?;
            register_codes(&mut registered, caps, EV_SW);
        }

        if caps.has_type(EV_FF) {
            let effects: AttributeSet<FFEffectType> = caps.codes(EV_FF).map(FFEffectType).collect();
            builder = builder
                .with_ff(&effects)
                .map_err(creation_error)?
                .with_ff_effects_max(caps.ff_effects_max());
            register_codes(&mut registered, caps, EV_FF);
            registered.set_ff_effects_max(caps.ff_effects_max());
        }

        let properties: AttributeSet<PropType> = caps.properties().map(PropType).collect();
        builder = builder.with_properties(&properties).map_err(creation_error)?;
        for property in caps.properties() {
            registered.enable_property(property);
        }

        if registered != *caps {
            return Err(MirrorError::VirtualCreation(
                "registered capabilities differ from the requested set".to_string(),
            ));
        }

        let mut device = builder.build().map_err(creation_error)?;
        let devnode = resolve_devnode(&mut device);

        Ok(Self {
            device,
            devnode,
            capabilities: registered,
        })
    }
}

fn register_codes(registered: &mut CapabilitySet, caps: &CapabilitySet, event_type: u16) {
    registered.enable_type(event_type);
    for code in caps.codes(event_type) {
        registered.enable_code(event_type, code, None);
    }
}

/// Find the /dev/input/event* node of a freshly built device
fn resolve_devnode(device: &mut evdev::uinput::VirtualDevice) -> Option<PathBuf> {
    let nodes = match device.enumerate_dev_nodes_blocking() {
        Ok(nodes) => nodes,
        Err(e) => {
            log::warn!("Could not enumerate virtual device nodes: {}", e);
            return None;
        }
    };

    nodes.filter_map(Result::ok).find(|path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.starts_with("event"))
    })
}

impl EventSink for VirtualDevice {
    fn devnode(&self) -> Option<&Path> {
        self.devnode.as_deref()
    }

    fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    fn emit_frame(&mut self, events: &[InputEvent]) -> std::io::Result<()> {
        // emit() appends the SYN_REPORT that closes the frame
        self.device.emit(events)
    }

    fn emit_unterminated(&mut self, events: &[InputEvent]) -> std::io::Result<()> {
        let raw: Vec<libc::input_event> = events.iter().map(|event| *event.as_ref()).collect();
        let len = std::mem::size_of_val(raw.as_slice());
        // SAFETY: raw is a live buffer of len bytes; uinput takes whole
        // input_event records
        let written = unsafe { libc::write(self.device.as_raw_fd(), raw.as_ptr().cast(), len) };
        if written < 0 {
            return Err(std::io::Error::last_os_error());
        }
        if written as usize != len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "short write to uinput",
            ));
        }
        Ok(())
    }
}
