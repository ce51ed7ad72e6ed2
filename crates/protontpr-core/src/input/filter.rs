// ProtonTPR Input Layer - USB Device Filtering
// Vendor/product matching against the USB ancestor of an input device

use crate::error::{MirrorError, MirrorResult};

/// idVendor/idProduct attribute values of a USB device, as read from sysfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbIds {
    pub vendor: String,
    pub product: String,
}

impl UsbIds {
    pub fn new(vendor: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            product: product.into(),
        }
    }
}

/// Target vendor/product pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbFilter {
    pub vendor: u16,
    pub product: u16,
}

impl UsbFilter {
    pub fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }

    /// Parse hex ids as given on the command line ("044f", "0x044F").
    pub fn parse(vendor: &str, product: &str) -> MirrorResult<Self> {
        let vendor = parse_hex_id(vendor)
            .ok_or_else(|| MirrorError::Config(format!("Invalid vendor id: '{}'", vendor)))?;
        let product = parse_hex_id(product)
            .ok_or_else(|| MirrorError::Config(format!("Invalid product id: '{}'", product)))?;
        Ok(Self { vendor, product })
    }

    /// Check if USB ancestor attributes match this filter.
    ///
    /// Comparison is numeric, so hex case and leading zeros do not matter.
    /// Attributes that are not valid hex never match.
    pub fn matches(&self, ids: &UsbIds) -> bool {
        parse_hex_id(&ids.vendor) == Some(self.vendor)
            && parse_hex_id(&ids.product) == Some(self.product)
    }
}

impl std::fmt::Display for UsbFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.product)
    }
}

fn parse_hex_id(value: &str) -> Option<u16> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_case_insensitive() {
        let filter = UsbFilter::parse("044F", "B68F").unwrap();
        assert!(filter.matches(&UsbIds::new("044f", "b68f")));
        assert!(filter.matches(&UsbIds::new("044F", "B68F")));
    }

    #[test]
    fn test_no_match_on_other_product() {
        let filter = UsbFilter::new(0x044f, 0xb68f);
        assert!(!filter.matches(&UsbIds::new("044f", "b10a")));
        assert!(!filter.matches(&UsbIds::new("046d", "b68f")));
    }

    #[test]
    fn test_sysfs_trailing_newline() {
        let filter = UsbFilter::new(0x044f, 0xb68f);
        assert!(filter.matches(&UsbIds::new("044f\n", "b68f\n")));
    }

    #[test]
    fn test_invalid_attribute_never_matches() {
        let filter = UsbFilter::new(0, 0);
        assert!(!filter.matches(&UsbIds::new("", "")));
        assert!(!filter.matches(&UsbIds::new("zzzz", "0000")));
    }

    #[test]
    fn test_parse_prefixed() {
        assert_eq!(UsbFilter::parse("0x044f", "0XB68F").unwrap(), UsbFilter::new(0x044f, 0xb68f));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(UsbFilter::parse("rudder", "b68f"), Err(MirrorError::Config(_))));
        assert!(matches!(UsbFilter::parse("044f", "12345"), Err(MirrorError::Config(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(UsbFilter::new(0x44f, 0xb68f).to_string(), "044f:b68f");
    }
}
