// ProtonTPR Input Layer - Capabilities
// Event type/code declarations of a device, with absolute axis parameters

use std::collections::{BTreeMap, BTreeSet};

/// Event type codes from Linux input-event-codes.h
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
pub const EV_MSC: u16 = 0x04;
pub const EV_SW: u16 = 0x05;
pub const EV_LED: u16 = 0x11;
pub const EV_SND: u16 = 0x12;
pub const EV_REP: u16 = 0x14;
pub const EV_FF: u16 = 0x15;
pub const EV_PWR: u16 = 0x16;
pub const EV_FF_STATUS: u16 = 0x17;
pub const EV_MAX: u16 = 0x1f;

/// Highest INPUT_PROP_* bit
pub const INPUT_PROP_MAX: u16 = 0x1f;

/// First joystick button. Enough for SDL to classify a device as a joystick.
pub const BTN_TRIGGER: u16 = 0x120;

/// Highest valid code for an event type, or `None` for unknown types.
///
/// Each type has its own range; KEY_MAX does not bound ABS or REL codes.
pub fn max_code(event_type: u16) -> Option<u16> {
    match event_type {
        EV_SYN => Some(0x0f),
        EV_KEY => Some(0x2ff),
        EV_REL => Some(0x0f),
        EV_ABS => Some(0x3f),
        EV_MSC => Some(0x07),
        EV_SW => Some(0x10),
        EV_LED => Some(0x0f),
        EV_SND => Some(0x07),
        EV_REP => Some(0x01),
        EV_FF => Some(0x7f),
        EV_PWR => Some(0x00),
        EV_FF_STATUS => Some(0x01),
        _ => None,
    }
}

/// Absolute axis parameters (struct input_absinfo)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AxisInfo {
    /// Current axis value
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

impl AxisInfo {
    /// Create axis info with a range and zeroed noise parameters
    pub fn with_range(minimum: i32, maximum: i32) -> Self {
        Self {
            minimum,
            maximum,
            ..Self::default()
        }
    }
}

impl From<&libc::input_absinfo> for AxisInfo {
    fn from(info: &libc::input_absinfo) -> Self {
        Self {
            value: info.value,
            minimum: info.minimum,
            maximum: info.maximum,
            fuzz: info.fuzz,
            flat: info.flat,
            resolution: info.resolution,
        }
    }
}

/// Set of (event type, event code, optional axis info) a device declares.
///
/// Types may be enabled without codes (EV_SYN, EV_REP usually are).
/// INPUT_PROP_* bits travel along since they steer how userspace
/// classifies the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    types: BTreeMap<u16, BTreeMap<u16, Option<AxisInfo>>>,
    properties: BTreeSet<u16>,
    ff_effects_max: u32,
}

impl CapabilitySet {
    /// Create an empty capability set
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable an event type. Returns false for unknown types.
    pub fn enable_type(&mut self, event_type: u16) -> bool {
        if max_code(event_type).is_none() {
            return false;
        }
        self.types.entry(event_type).or_default();
        true
    }

    /// Enable a code under a type, enabling the type as well.
    ///
    /// Returns false (and changes nothing) when the code is outside the
    /// type's range.
    pub fn enable_code(&mut self, event_type: u16, code: u16, axis: Option<AxisInfo>) -> bool {
        match max_code(event_type) {
            Some(max) if code <= max => {
                self.types.entry(event_type).or_default().insert(code, axis);
                true
            }
            _ => false,
        }
    }

    /// Set an INPUT_PROP_* bit. Returns false for out of range bits.
    pub fn enable_property(&mut self, property: u16) -> bool {
        if property > INPUT_PROP_MAX {
            return false;
        }
        self.properties.insert(property);
        true
    }

    pub fn has_property(&self, property: u16) -> bool {
        self.properties.contains(&property)
    }

    /// INPUT_PROP_* bits in ascending order
    pub fn properties(&self) -> impl Iterator<Item = u16> + '_ {
        self.properties.iter().copied()
    }

    /// Number of force feedback effects the device can hold at once
    pub fn ff_effects_max(&self) -> u32 {
        self.ff_effects_max
    }

    pub fn set_ff_effects_max(&mut self, effects: u32) {
        self.ff_effects_max = effects;
    }

    pub fn has_type(&self, event_type: u16) -> bool {
        self.types.contains_key(&event_type)
    }

    pub fn has_code(&self, event_type: u16, code: u16) -> bool {
        self.types
            .get(&event_type)
            .map_or(false, |codes| codes.contains_key(&code))
    }

    /// Axis info recorded for an absolute axis
    pub fn axis_info(&self, code: u16) -> Option<&AxisInfo> {
        self.types.get(&EV_ABS)?.get(&code)?.as_ref()
    }

    /// Enabled event types in ascending order
    pub fn event_types(&self) -> impl Iterator<Item = u16> + '_ {
        self.types.keys().copied()
    }

    /// Enabled codes of one type in ascending order
    pub fn codes(&self, event_type: u16) -> impl Iterator<Item = u16> + '_ {
        self.types
            .get(&event_type)
            .into_iter()
            .flat_map(|codes| codes.keys().copied())
    }

    /// Absolute axes with their parameters
    pub fn axes(&self) -> impl Iterator<Item = (u16, AxisInfo)> + '_ {
        self.types
            .get(&EV_ABS)
            .into_iter()
            .flat_map(|codes| codes.iter())
            .map(|(code, info)| (*code, info.unwrap_or_default()))
    }

    /// All (type, code, axis) tuples
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16, Option<&AxisInfo>)> + '_ {
        self.types.iter().flat_map(|(event_type, codes)| {
            codes
                .iter()
                .map(move |(code, info)| (*event_type, *code, info.as_ref()))
        })
    }

    /// Number of declared codes across all types
    pub fn code_count(&self) -> usize {
        self.types.values().map(|codes| codes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.properties.is_empty()
    }
}
