// ProtonTPR Input Layer - Device Identity
// Name and input_id of a device

/// Device identification (name plus struct input_id)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Device name reported by the kernel
    pub name: String,
    /// Bus type (BUS_USB = 0x03)
    pub bus_type: u16,
    /// Vendor ID (USB VID)
    pub vendor: u16,
    /// Product ID (USB PID)
    pub product: u16,
    /// Device version
    pub version: u16,
}

impl DeviceIdentity {
    /// Create a new identity
    pub fn new(name: impl Into<String>, bus_type: u16, vendor: u16, product: u16, version: u16) -> Self {
        Self {
            name: name.into(),
            bus_type,
            vendor,
            product,
            version,
        }
    }

    /// Identity for the virtual counterpart of this device.
    ///
    /// Bus, vendor and product are kept; the version is bumped so the
    /// virtual device can be told apart from the real one.
    pub fn virtual_counterpart(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            bus_type: self.bus_type,
            vendor: self.vendor,
            product: self.product,
            version: self.version.wrapping_add(1),
        }
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({:04x}:{:04x} v{})",
            self.name, self.vendor, self.product, self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_counterpart_bumps_version() {
        let real = DeviceIdentity::new("Thrustmaster T-Pendular-Rudder", 0x03, 0x044f, 0xb68f, 0x0110);
        let virt = real.virtual_counterpart("virtual-T-Pendular-Rudder");

        assert_eq!(virt.name, "virtual-T-Pendular-Rudder");
        assert_eq!(virt.bus_type, 0x03);
        assert_eq!(virt.vendor, 0x044f);
        assert_eq!(virt.product, 0xb68f);
        assert_eq!(virt.version, 0x0111);
    }

    #[test]
    fn test_virtual_counterpart_version_wraps() {
        let real = DeviceIdentity::new("x", 0x03, 1, 2, u16::MAX);
        assert_eq!(real.virtual_counterpart("v").version, 0);
    }

    #[test]
    fn test_display() {
        let id = DeviceIdentity::new("Rudder", 0x03, 0x044f, 0xb68f, 1);
        assert_eq!(id.to_string(), "Rudder (044f:b68f v1)");
    }
}
